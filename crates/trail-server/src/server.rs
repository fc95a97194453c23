use std::future::Future;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};
use trail_sync::{ReplicationEngine, TcpTransport};

use crate::config::NodeConfig;
use crate::error::{ServerError, ServerResult};
use crate::router::build_router;

/// A Trail node: one replication engine shared by the HTTP API and the
/// peer listener.
pub struct TrailNode {
    config: NodeConfig,
    engine: Arc<ReplicationEngine>,
}

impl TrailNode {
    pub fn new(config: NodeConfig) -> Self {
        let engine = ReplicationEngine::new(config.engine_config());
        Self { config, engine }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<ReplicationEngine> {
        &self.engine
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(Arc::clone(&self.engine))
    }

    /// Bind the peer and HTTP listeners.
    pub async fn bind(self) -> ServerResult<BoundNode> {
        let attempts = self.config.port_fallback_attempts;
        let p2p = bind_with_fallback(self.config.p2p_addr, attempts).await?;
        let http = bind_with_fallback(self.config.http_addr, attempts).await?;
        Ok(BoundNode { node: self, http, p2p })
    }

    /// Run until Ctrl-C.
    pub async fn run(self) -> ServerResult<()> {
        self.bind().await?.serve(shutdown_signal()).await
    }
}

/// A node whose listeners are bound but not yet serving.
pub struct BoundNode {
    node: TrailNode,
    http: TcpListener,
    p2p: TcpListener,
}

impl BoundNode {
    pub fn http_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.http.local_addr()?)
    }

    pub fn p2p_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.p2p.local_addr()?)
    }

    pub fn engine(&self) -> &Arc<ReplicationEngine> {
        self.node.engine()
    }

    /// Serve peers and HTTP until `shutdown` completes.
    ///
    /// The seed peer, if any, is dialed once the peer listener is up. HTTP
    /// drains in-flight requests on shutdown; peer links are dropped.
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send + 'static) -> ServerResult<()> {
        let BoundNode { node, http, p2p } = self;
        info!(http = %http.local_addr()?, p2p = %p2p.local_addr()?, "node started");

        let peers = tokio::spawn(Arc::clone(&node.engine).serve(p2p));
        node.engine
            .connect_seed(&TcpTransport, node.config.seed_peer.as_deref())
            .await;

        let served = axum::serve(http, node.router()).with_graceful_shutdown(shutdown).await;
        peers.abort();
        served?;
        info!("node stopped");
        Ok(())
    }
}

/// Bind `addr`, moving to the next port while the current one is taken.
///
/// At most `attempts` extra ports are tried.
pub async fn bind_with_fallback(addr: SocketAddr, attempts: u16) -> ServerResult<TcpListener> {
    let mut candidate = addr;
    let mut remaining = attempts;
    loop {
        match TcpListener::bind(candidate).await {
            Ok(listener) => return Ok(listener),
            Err(e) if e.kind() == ErrorKind::AddrInUse && remaining > 0 => {
                let Some(next) = candidate.port().checked_add(1) else {
                    return Err(ServerError::Bind { addr: candidate, source: e });
                };
                warn!(addr = %candidate, next, "port in use, trying another port");
                candidate.set_port(next);
                remaining -= 1;
            }
            Err(e) => return Err(ServerError::Bind { addr: candidate, source: e }),
        }
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(e) => {
            warn!(error = %e, "cannot listen for Ctrl-C; running until killed");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::oneshot;
    use trail_types::Payload;

    use super::*;

    fn local_config() -> NodeConfig {
        NodeConfig {
            http_addr: "127.0.0.1:0".parse().unwrap(),
            p2p_addr: "127.0.0.1:0".parse().unwrap(),
            ..NodeConfig::default()
        }
    }

    #[test]
    fn node_construction() {
        let node = TrailNode::new(NodeConfig::default());
        assert_eq!(node.config().http_addr.port(), 3001);
        assert_eq!(node.engine().ledger_len(), 1);
    }

    #[tokio::test]
    async fn fallback_moves_to_next_port() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();

        match bind_with_fallback(addr, 1).await {
            Ok(listener) => assert_eq!(listener.local_addr().unwrap().port(), addr.port() + 1),
            // The next port may itself be taken on a busy host.
            Err(ServerError::Bind { addr: tried, .. }) => assert_eq!(tried.port(), addr.port() + 1),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    #[tokio::test]
    async fn no_fallback_reports_bind_error() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();

        let err = bind_with_fallback(addr, 0).await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { addr: a, .. } if a == addr));
    }

    #[tokio::test]
    async fn seeded_node_syncs_and_stops_gracefully() {
        let first = TrailNode::new(local_config()).bind().await.unwrap();
        first.engine().mint(Payload::from("before the second node"));
        let first_engine = Arc::clone(first.engine());
        let seed = first.p2p_addr().unwrap().to_string();
        let (stop_first, first_stopped) = oneshot::channel::<()>();
        let first_task = tokio::spawn(first.serve(async {
            let _ = first_stopped.await;
        }));

        let second = TrailNode::new(NodeConfig {
            seed_peer: Some(seed),
            ..local_config()
        })
        .bind()
        .await
        .unwrap();
        let second_engine = Arc::clone(second.engine());
        let (stop_second, second_stopped) = oneshot::channel::<()>();
        let second_task = tokio::spawn(second.serve(async {
            let _ = second_stopped.await;
        }));

        let mut synced = false;
        for _ in 0..200 {
            if second_engine.ledger_len() == 2 {
                synced = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(synced, "second node never adopted the seed's chain");
        assert_eq!(second_engine.records(), first_engine.records());

        stop_first.send(()).unwrap();
        stop_second.send(()).unwrap();
        first_task.await.unwrap().unwrap();
        second_task.await.unwrap().unwrap();
    }
}
