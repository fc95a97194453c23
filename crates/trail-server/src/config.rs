use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;

use serde::{Deserialize, Serialize};
use trail_sync::EngineConfig;

use crate::error::{ServerError, ServerResult};

pub const ENV_HTTP_PORT: &str = "HTTP_PORT";
pub const ENV_P2P_PORT: &str = "P2P_PORT";
pub const ENV_INITIAL_PEER: &str = "INITIAL_PEER";

/// Settings for one node.
///
/// Layered as defaults, then an optional TOML file, then environment
/// variables, then command-line flags (applied by the binary).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub http_addr: SocketAddr,
    pub p2p_addr: SocketAddr,
    pub seed_peer: Option<String>,
    /// Extra ports to try, counting upward, when a listen port is taken.
    pub port_fallback_attempts: u16,
    pub recent_digest_capacity: usize,
    /// Messages queued per peer link before a stalled peer is dropped.
    pub outbox_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 3001)),
            p2p_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 6001)),
            seed_peer: None,
            port_fallback_attempts: 1,
            recent_digest_capacity: 1024,
            outbox_capacity: 64,
        }
    }
}

impl NodeConfig {
    /// Read a TOML config file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&text).map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml(text: &str) -> ServerResult<Self> {
        toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Apply `HTTP_PORT`, `P2P_PORT` and `INITIAL_PEER` from the process environment.
    pub fn apply_env(&mut self) -> ServerResult<()> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`. Empty values are ignored.
    pub fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) -> ServerResult<()> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(port) = var(ENV_HTTP_PORT) {
            self.http_addr.set_port(parse_port(ENV_HTTP_PORT, &port)?);
        }
        if let Some(port) = var(ENV_P2P_PORT) {
            self.p2p_addr.set_port(parse_port(ENV_P2P_PORT, &port)?);
        }
        if let Some(peer) = var(ENV_INITIAL_PEER) {
            self.seed_peer = Some(peer);
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            recent_digest_capacity: self.recent_digest_capacity,
            outbox_capacity: self.outbox_capacity,
        }
    }
}

fn parse_port(key: &str, value: &str) -> ServerResult<u16> {
    value
        .parse()
        .map_err(|_| ServerError::Config(format!("{key}: not a port number: {value:?}")))
}
