use serde::{Deserialize, Serialize};

/// HTTP endpoint paths served by a Trail node.
pub mod endpoints {
    pub const RECORDS: &str = "/records";
    pub const MINT: &str = "/mint";
    pub const HEALTH: &str = "/v1/health";
    pub const PEERS: &str = "/v1/peers";
}

/// Health check response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub protocol_version: u32,
    pub records: usize,
    pub peers: usize,
}

impl HealthResponse {
    pub fn new(records: usize, peers: usize) -> Self {
        Self {
            status: "ok".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            protocol_version: super::message::PROTOCOL_VERSION,
            records,
            peers,
        }
    }
}

/// Body of a mint request. `data` must be a non-empty string.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MintRequest {
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Error body returned by the HTTP API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}
