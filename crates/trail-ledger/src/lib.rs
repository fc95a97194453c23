//! Append-only record chain for Trail.
//!
//! This crate is the heart of Trail. It provides:
//! - [`Record`], the immutable hash-linked chain entry
//! - [`Ledger`], the locally held chain with append, validation, and the
//!   longest-valid-chain replacement rule
//! - [`validate_chain`] for checking any candidate chain from genesis

pub mod error;
pub mod ledger;
pub mod record;
pub mod validation;

pub use error::LedgerError;
pub use ledger::Ledger;
pub use record::{Record, GENESIS_PAYLOAD};
pub use validation::{validate_chain, ValidationFailure, ValidationReport};
