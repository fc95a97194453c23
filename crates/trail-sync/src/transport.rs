use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{SyncError, SyncResult};

/// A bidirectional byte stream a peer link can run over.
pub trait LinkStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> LinkStream for T {}

/// Opens outbound streams to peers.
#[async_trait]
pub trait Transport: Send + Sync {
    type Stream: LinkStream;

    /// Connect to `addr` (`host:port`).
    async fn connect(&self, addr: &str) -> SyncResult<Self::Stream>;
}

/// Plain TCP transport.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpTransport;

#[async_trait]
impl Transport for TcpTransport {
    type Stream = TcpStream;

    async fn connect(&self, addr: &str) -> SyncResult<TcpStream> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| SyncError::Transport(format!("{addr}: {e}")))?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(addr, error = %e, "could not disable Nagle");
        }
        Ok(stream)
    }
}

/// Normalize a seed peer address to `host:port`.
///
/// Accepts `host:port` or `tcp://host:port`. The port must be non-zero.
pub fn parse_seed(raw: &str) -> SyncResult<String> {
    let trimmed = raw.trim();
    let bare = trimmed.strip_prefix("tcp://").unwrap_or(trimmed);
    let invalid = || SyncError::InvalidSeed(raw.to_string());

    if bare.contains('/') {
        return Err(invalid());
    }
    let (host, port) = bare.rsplit_once(':').ok_or_else(invalid)?;
    let port: u16 = port.parse().map_err(|_| invalid())?;
    if host.is_empty() || port == 0 {
        return Err(invalid());
    }
    Ok(format!("{host}:{port}"))
}
