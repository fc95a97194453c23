//! Wire protocol for Trail.
//!
//! Defines the message envelopes exchanged between peers, the
//! length-prefixed JSON framing they travel in, and the HTTP endpoint paths
//! served by a node.

pub mod codec;
pub mod endpoint;
pub mod error;
pub mod message;

pub use codec::TrailCodec;
pub use endpoint::{endpoints, ErrorResponse, HealthResponse, MintRequest};
pub use error::{ProtocolError, ProtocolResult};
pub use message::{Decoded, Message, MAX_FRAME_SIZE, PROTOCOL_VERSION};
