use trail_types::{Digest, PreviousDigest};

/// Trait for objects that participate in a hash chain.
pub trait ChainLinked {
    /// Position in the chain, starting at 0.
    fn sequence(&self) -> u64;
    /// The stored digest, as carried by the object.
    fn digest(&self) -> Digest;
    /// The link to the previous object (genesis sentinel for the first).
    fn previous_digest(&self) -> PreviousDigest;
    /// The digest recomputed from the object's fields.
    fn compute_digest(&self) -> Digest;
}

/// Hash chain integrity verifier.
///
/// Verifies that a sequence of records forms a valid hash chain: each
/// record's previous digest matches the previous record's digest, each
/// record is numbered by its position, and each stored digest is correctly
/// computed from the record's fields.
pub struct HashChainVerifier;

impl HashChainVerifier {
    /// Verify a chain of records.
    ///
    /// Checks, in order, for each index `i`:
    /// 1. `sequence == i`
    /// 2. index 0 carries the genesis sentinel; later indexes link to `i - 1`
    /// 3. the stored digest equals the recomputed digest
    pub fn verify_chain(records: &[impl ChainLinked]) -> Result<(), ChainError> {
        let mut expected_prev: Option<Digest> = None;

        for (index, record) in records.iter().enumerate() {
            if record.sequence() != index as u64 {
                return Err(ChainError::SequenceGap {
                    index,
                    found: record.sequence(),
                });
            }

            match (expected_prev, record.previous_digest()) {
                (None, PreviousDigest::Genesis) => {}
                (None, PreviousDigest::Digest(_)) => return Err(ChainError::GenesisHasPrevDigest),
                (Some(_), PreviousDigest::Genesis) => {
                    return Err(ChainError::MissingPrevDigest { index })
                }
                (Some(expected), PreviousDigest::Digest(prev)) if prev == expected => {}
                (Some(_), PreviousDigest::Digest(_)) => return Err(ChainError::BrokenLink { index }),
            }

            if record.compute_digest() != record.digest() {
                return Err(ChainError::DigestMismatch { index });
            }

            expected_prev = Some(record.digest());
        }

        Ok(())
    }

    /// Verify that `next` correctly extends `tail`.
    ///
    /// Used for single-record appends where the rest of the chain is
    /// already known to be valid.
    pub fn verify_extension(
        tail: &impl ChainLinked,
        next: &impl ChainLinked,
    ) -> Result<(), ChainError> {
        let index = usize::try_from(tail.sequence() + 1).unwrap_or(usize::MAX);
        if next.sequence() != tail.sequence() + 1 {
            return Err(ChainError::SequenceGap {
                index,
                found: next.sequence(),
            });
        }
        match next.previous_digest() {
            PreviousDigest::Genesis => return Err(ChainError::MissingPrevDigest { index }),
            PreviousDigest::Digest(prev) if prev != tail.digest() => {
                return Err(ChainError::BrokenLink { index })
            }
            PreviousDigest::Digest(_) => {}
        }
        if next.compute_digest() != next.digest() {
            return Err(ChainError::DigestMismatch { index });
        }
        Ok(())
    }
}

/// Errors from chain verification.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum ChainError {
    #[error("first record links to a previous digest (should be the genesis sentinel)")]
    GenesisHasPrevDigest,

    #[error("sequence gap at index {index}: found sequence {found}")]
    SequenceGap { index: usize, found: u64 },

    #[error("broken link at index {index}: previous digest does not match")]
    BrokenLink { index: usize },

    #[error("missing previous digest at index {index} (should reference previous record)")]
    MissingPrevDigest { index: usize },

    #[error("digest mismatch at index {index}: computed digest differs from stored")]
    DigestMismatch { index: usize },
}

impl ChainError {
    /// The index at which verification failed.
    pub fn index(&self) -> usize {
        match self {
            Self::GenesisHasPrevDigest => 0,
            Self::SequenceGap { index, .. }
            | Self::BrokenLink { index }
            | Self::MissingPrevDigest { index }
            | Self::DigestMismatch { index } => *index,
        }
    }
}
