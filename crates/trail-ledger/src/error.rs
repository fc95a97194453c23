use trail_crypto::ChainError;
use trail_types::{Digest, PreviousDigest};

use crate::validation::ValidationFailure;

/// Errors produced by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("local chain failed validation: {0}")]
    Validation(#[from] ValidationFailure),

    #[error("record does not extend the tail: tail is {tail}, record links to {found}")]
    TailMismatch { tail: Digest, found: PreviousDigest },

    #[error("record is not a valid extension of the tail: {0}")]
    InvalidExtension(#[from] ChainError),
}
