//! Foundation types for Trail.
//!
//! This crate provides the small value types every record on the chain is
//! built from. Every other Trail crate depends on `trail-types`.
//!
//! # Key Types
//!
//! - [`Digest`]: 32-byte BLAKE3 fingerprint, hex on the wire
//! - [`PreviousDigest`]: link to the predecessor record, or the genesis sentinel `"0"`
//! - [`Payload`]: opaque record contents supplied by the caller
//! - [`Timestamp`]: informational creation time in milliseconds since the UNIX epoch

pub mod digest;
pub mod error;
pub mod payload;
pub mod temporal;

pub use digest::{Digest, PreviousDigest, GENESIS_SENTINEL};
pub use error::TypeError;
pub use payload::Payload;
pub use temporal::Timestamp;
