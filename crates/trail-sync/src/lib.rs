//! Peer replication for Trail.
//!
//! Keeps the local chain in step with a set of peers over persistent
//! bidirectional links. New records are gossiped to every open link; on
//! each new link the peers exchange full snapshots and the longest valid
//! chain wins.

pub mod engine;
pub mod error;
pub mod link;
pub mod recent;
pub mod transport;


pub use engine::{EngineConfig, ReplicationEngine};
pub use error::{SyncError, SyncResult};
pub use link::{LinkDirection, LinkId, LinkState, PeerInfo};
pub use recent::RecentDigests;
pub use transport::{parse_seed, LinkStream, TcpTransport, Transport};
