use serde::{Deserialize, Serialize};
use trail_crypto::{ChainLinked, RecordFields};
use trail_types::{Digest, Payload, PreviousDigest, Timestamp};

/// Payload of the canonical genesis record.
pub const GENESIS_PAYLOAD: &str = "Genesis Block";

/// A single immutable chain entry.
///
/// The digest is computed once, in [`Record::create`], over the canonical
/// encoding of the other four fields. Fields are only readable, so a
/// record can never drift away from its digest after construction. A
/// record decoded from the wire carries whatever digest the sender
/// claimed; use [`Record::is_intact`] to check it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    sequence: u64,
    created_at: Timestamp,
    payload: Payload,
    previous_digest: PreviousDigest,
    digest: Digest,
}

impl Record {
    pub fn create(
        sequence: u64,
        created_at: Timestamp,
        payload: Payload,
        previous_digest: PreviousDigest,
    ) -> Self {
        let digest = RecordFields {
            sequence,
            created_at,
            payload: &payload,
            previous: &previous_digest,
        }
        .digest();
        Self {
            sequence,
            created_at,
            payload,
            previous_digest,
            digest,
        }
    }

    /// The canonical genesis record shared by every node.
    ///
    /// Its timestamp is the fixed epoch rather than the wall clock, so
    /// independently started nodes agree on `records[0].digest`.
    pub fn genesis() -> Self {
        Self::create(
            0,
            Timestamp::zero(),
            Payload::from(GENESIS_PAYLOAD),
            PreviousDigest::Genesis,
        )
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn previous_digest(&self) -> &PreviousDigest {
        &self.previous_digest
    }

    /// The digest fixed at creation (or carried over the wire).
    pub fn digest(&self) -> Digest {
        self.digest
    }

    /// Recompute the digest from the record's fields.
    pub fn compute_digest(&self) -> Digest {
        RecordFields {
            sequence: self.sequence,
            created_at: self.created_at,
            payload: &self.payload,
            previous: &self.previous_digest,
        }
        .digest()
    }

    /// Returns `true` if the stored digest matches the fields.
    pub fn is_intact(&self) -> bool {
        self.compute_digest() == self.digest
    }

    pub fn is_genesis(&self) -> bool {
        self.sequence == 0 && self.previous_digest.is_genesis()
    }
}

impl ChainLinked for Record {
    fn sequence(&self) -> u64 {
        self.sequence
    }

    fn digest(&self) -> Digest {
        self.digest
    }

    fn previous_digest(&self) -> PreviousDigest {
        self.previous_digest
    }

    fn compute_digest(&self) -> Digest {
        Record::compute_digest(self)
    }
}
