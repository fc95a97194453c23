use tracing::debug;
use trail_crypto::HashChainVerifier;
use trail_types::{Payload, PreviousDigest, Timestamp};

use crate::error::LedgerError;
use crate::record::Record;
use crate::validation::{validate_chain, ValidationFailure};

/// The locally held chain of records.
///
/// A ledger starts with the canonical genesis record and only changes by
/// appending one record at the tail or by wholesale replacement with a
/// longer valid chain. It carries no lock of its own; the owner
/// serializes access.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ledger {
    records: Vec<Record>,
}

impl Ledger {
    /// A ledger holding only the genesis record.
    pub fn new() -> Self {
        Self {
            records: vec![Record::genesis()],
        }
    }

    /// Wrap an existing record sequence without validating it.
    ///
    /// Call [`Ledger::validate`] before trusting the result.
    pub fn from_records(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// The canonical genesis record.
    pub fn genesis() -> Record {
        Record::genesis()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// A copy of the records, for snapshot replies.
    pub fn snapshot(&self) -> Vec<Record> {
        self.records.clone()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The most recently appended record.
    pub fn tail(&self) -> Option<&Record> {
        self.records.last()
    }

    /// Append a new record carrying `payload`, stamped with the current time.
    pub fn append(&mut self, payload: Payload) -> Record {
        self.append_at(payload, Timestamp::now())
    }

    /// Append a new record with an explicit creation time.
    pub fn append_at(&mut self, payload: Payload, created_at: Timestamp) -> Record {
        let previous = self
            .tail()
            .map(|tail| PreviousDigest::Digest(tail.digest()))
            .unwrap_or(PreviousDigest::Genesis);
        let record = Record::create(self.records.len() as u64, created_at, payload, previous);
        self.records.push(record.clone());
        debug!(seq = record.sequence(), digest = %record.digest().short_hex(), "record appended");
        record
    }

    /// Returns `true` if the chain satisfies every integrity invariant.
    pub fn validate(&self) -> bool {
        self.check().is_ok()
    }

    /// Like [`Ledger::validate`], reporting the first failure.
    pub fn check(&self) -> Result<(), ValidationFailure> {
        validate_chain(&self.records)
    }

    /// Adopt `candidate` if it is strictly longer and fully valid.
    ///
    /// Longest valid chain wins. The replacement is all-or-nothing: on
    /// `false` the ledger is untouched.
    pub fn replace_if_better(&mut self, candidate: Vec<Record>) -> bool {
        if candidate.len() <= self.records.len() {
            debug!(
                local = self.records.len(),
                candidate = candidate.len(),
                "candidate chain is not longer"
            );
            return false;
        }
        if let Err(failure) = validate_chain(&candidate) {
            debug!(%failure, index = failure.index(), "candidate chain rejected");
            return false;
        }
        self.records = candidate;
        true
    }

    /// Link a record received from a peer onto the tail.
    ///
    /// Accepted only when the local chain is valid and the record extends
    /// the current tail exactly. The record's sequence and digest are
    /// checked too; its carried digest is kept as-is.
    pub fn accept_tail(&mut self, record: Record) -> Result<(), LedgerError> {
        self.check()?;
        let tail = self.tail().ok_or(ValidationFailure::Empty)?;
        if !record.previous_digest().links_to(&tail.digest()) {
            return Err(LedgerError::TailMismatch {
                tail: tail.digest(),
                found: *record.previous_digest(),
            });
        }
        HashChainVerifier::verify_extension(tail, &record)?;
        self.records.push(record);
        Ok(())
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}
