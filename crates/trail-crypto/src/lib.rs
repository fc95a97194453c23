//! Cryptographic primitives for Trail.
//!
//! Provides domain-separated BLAKE3 hashing, the canonical byte encoding
//! every node hashes a record with, and hash chain verification.
//!
//! All crypto operations wrap established libraries; no custom cryptography.

pub mod chain;
pub mod hasher;

pub use chain::{ChainError, ChainLinked, HashChainVerifier};
pub use hasher::{ContentHasher, RecordFields};
