use serde::Serialize;
use trail_crypto::{ChainError, HashChainVerifier};
use trail_types::Digest;

use crate::record::Record;

/// Why a chain failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationFailure {
    #[error("chain is empty")]
    Empty,

    #[error("first record is not the canonical genesis record")]
    GenesisMismatch,

    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl ValidationFailure {
    /// Index of the first offending record.
    pub fn index(&self) -> usize {
        match self {
            Self::Empty | Self::GenesisMismatch => 0,
            Self::Chain(e) => e.index(),
        }
    }
}

/// Validate a full chain from genesis.
///
/// Checks that the first record is the canonical genesis record, that
/// every record is numbered by its position, that every link points at
/// its predecessor's digest, and that every digest is recomputed and
/// matches. Runs in one pass.
pub fn validate_chain(records: &[Record]) -> Result<(), ValidationFailure> {
    let first = records.first().ok_or(ValidationFailure::Empty)?;
    if *first != Record::genesis() {
        return Err(ValidationFailure::GenesisMismatch);
    }
    HashChainVerifier::verify_chain(records)?;
    Ok(())
}

/// Summary of a chain validation, for operator-facing output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub record_count: usize,
    pub tail: Option<Digest>,
    pub valid: bool,
    pub failed_index: Option<usize>,
    pub reason: Option<String>,
}

impl ValidationReport {
    pub fn of(records: &[Record]) -> Self {
        let result = validate_chain(records);
        Self {
            record_count: records.len(),
            tail: records.last().map(Record::digest),
            valid: result.is_ok(),
            failed_index: result.as_ref().err().map(ValidationFailure::index),
            reason: result.err().map(|e| e.to_string()),
        }
    }

    /// Returns `true` if all checks passed.
    pub fn is_valid(&self) -> bool {
        self.valid
    }
}
