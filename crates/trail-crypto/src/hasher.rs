use trail_types::{Digest, Payload, PreviousDigest, Timestamp};

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag (e.g., `"trail-record-v1"`) that is
/// prepended to every hash computation, so bytes hashed for one purpose can
/// never collide with bytes hashed for another.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for chain records.
    pub const RECORD: Self = Self::new("trail-record-v1");

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        Digest::from_hash(*hasher.finalize().as_bytes())
    }
}

/// The hashed fields of a record, borrowed for encoding.
///
/// Canonical encoding (all integers big-endian):
///
/// ```text
/// [8 bytes: sequence (u64)]
/// [8 bytes: created_at millis (u64)]
/// [8 bytes: payload length (u64)]
/// [N bytes: payload]
/// [1 byte : 0x00 = genesis sentinel, 0x01 = digest follows]
/// [32 bytes: previous digest, only when the marker is 0x01]
/// ```
///
/// The layout does not depend on any text formatting, so every node
/// derives byte-identical digests for the same record.
#[derive(Clone, Copy, Debug)]
pub struct RecordFields<'a> {
    pub sequence: u64,
    pub created_at: Timestamp,
    pub payload: &'a Payload,
    pub previous: &'a PreviousDigest,
}

const PREVIOUS_GENESIS: u8 = 0x00;
const PREVIOUS_DIGEST: u8 = 0x01;

impl RecordFields<'_> {
    /// The canonical byte encoding of these fields.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let payload = self.payload.as_bytes();
        let mut buf = Vec::with_capacity(8 * 3 + payload.len() + 1 + 32);
        buf.extend_from_slice(&self.sequence.to_be_bytes());
        buf.extend_from_slice(&self.created_at.as_millis().to_be_bytes());
        buf.extend_from_slice(&(payload.len() as u64).to_be_bytes());
        buf.extend_from_slice(payload);
        match self.previous {
            PreviousDigest::Genesis => buf.push(PREVIOUS_GENESIS),
            PreviousDigest::Digest(d) => {
                buf.push(PREVIOUS_DIGEST);
                buf.extend_from_slice(d.as_bytes());
            }
        }
        buf
    }

    /// Digest of the canonical encoding under [`ContentHasher::RECORD`].
    pub fn digest(&self) -> Digest {
        ContentHasher::RECORD.hash(&self.canonical_bytes())
    }
}
