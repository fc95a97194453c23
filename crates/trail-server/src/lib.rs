//! Trail node.
//!
//! Serves the HTTP API (`/records`, `/mint`, health and peer listings) and
//! the peer listener from one shared replication engine.

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use config::NodeConfig;
pub use error::{ApiError, ServerError, ServerResult};
pub use router::build_router;
pub use server::{bind_with_fallback, BoundNode, TrailNode};
