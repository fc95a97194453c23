use serde::{Deserialize, Serialize};
use trail_ledger::Record;

use crate::error::{ProtocolError, ProtocolResult};

pub const PROTOCOL_VERSION: u32 = 1;

/// Largest frame payload sent or accepted.
///
/// Full snapshots travel in one frame, so this bounds the chain size two
/// nodes can reconcile.
pub const MAX_FRAME_SIZE: usize = 256 * 1024 * 1024;

/// All message types exchanged between peers.
///
/// JSON envelopes:
///
/// ```text
/// { "type": "GetLedger" }
/// { "type": "LedgerSnapshot", "data": [ <Record>, ... ] }
/// { "type": "NewRecord", "data": <Record> }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Message {
    /// Ask the peer for its full chain.
    GetLedger,
    /// The sender's full chain, in order.
    LedgerSnapshot(Vec<Record>),
    /// A single newly appended record.
    NewRecord(Record),
}

impl Message {
    pub const GET_LEDGER: &'static str = "GetLedger";
    pub const LEDGER_SNAPSHOT: &'static str = "LedgerSnapshot";
    pub const NEW_RECORD: &'static str = "NewRecord";

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::GetLedger => Self::GET_LEDGER,
            Self::LedgerSnapshot(_) => Self::LEDGER_SNAPSHOT,
            Self::NewRecord(_) => Self::NEW_RECORD,
        }
    }
}

/// Result of decoding one envelope.
///
/// A well-formed envelope whose `type` this node does not know is not an
/// error: it is surfaced as [`Decoded::Unknown`] so the receiver can log
/// it and keep the link open.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decoded {
    Message(Message),
    Unknown(String),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

impl Decoded {
    /// Decode one JSON envelope.
    pub fn from_json(bytes: &[u8]) -> ProtocolResult<Self> {
        let envelope: Envelope =
            serde_json::from_slice(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))?;

        let message = match envelope.kind.as_str() {
            Message::GET_LEDGER => Message::GetLedger,
            Message::LEDGER_SNAPSHOT => Message::LedgerSnapshot(body(envelope.data, Message::LEDGER_SNAPSHOT)?),
            Message::NEW_RECORD => Message::NewRecord(body(envelope.data, Message::NEW_RECORD)?),
            _ => return Ok(Self::Unknown(envelope.kind)),
        };
        Ok(Self::Message(message))
    }
}

fn body<T: serde::de::DeserializeOwned>(
    data: Option<serde_json::Value>,
    kind: &str,
) -> ProtocolResult<T> {
    let data = data.ok_or_else(|| ProtocolError::Decode(format!("{kind} without data")))?;
    serde_json::from_value(data).map_err(|e| ProtocolError::Decode(format!("{kind}: {e}")))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use trail_ledger::Ledger;

    use super::*;

    #[test]
    fn get_ledger_envelope_has_no_data() {
        let value = serde_json::to_value(Message::GetLedger).unwrap();
        assert_eq!(value, json!({ "type": "GetLedger" }));
    }

    #[test]
    fn snapshot_envelope_carries_records() {
        let ledger = Ledger::new();
        let value = serde_json::to_value(Message::LedgerSnapshot(ledger.snapshot())).unwrap();
        assert_eq!(value["type"], json!("LedgerSnapshot"));
        assert_eq!(value["data"][0]["previousDigest"], json!("0"));
    }

    #[test]
    fn decodes_known_types() {
        let mut ledger = Ledger::new();
        let record = ledger.append("hello".into());
        let bytes = serde_json::to_vec(&Message::NewRecord(record.clone())).unwrap();
        assert_eq!(
            Decoded::from_json(&bytes).unwrap(),
            Decoded::Message(Message::NewRecord(record))
        );
        assert_eq!(
            Decoded::from_json(br#"{"type":"GetLedger"}"#).unwrap(),
            Decoded::Message(Message::GetLedger)
        );
    }

    #[test]
    fn unknown_type_is_not_an_error() {
        let decoded = Decoded::from_json(br#"{"type":"PeerList","data":["a","b"]}"#).unwrap();
        assert_eq!(decoded, Decoded::Unknown("PeerList".into()));
    }

    #[test]
    fn malformed_json_is_an_error() {
        let err = Decoded::from_json(b"{not json").unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    #[test]
    fn missing_type_is_an_error() {
        assert!(Decoded::from_json(br#"{"data":1}"#).is_err());
    }

    #[test]
    fn known_type_with_bad_body_is_an_error() {
        let err = Decoded::from_json(br#"{"type":"NewRecord","data":{"sequence":"one"}}"#).unwrap_err();
        assert!(err.to_string().contains("NewRecord"));
        assert!(Decoded::from_json(br#"{"type":"LedgerSnapshot"}"#).is_err());
    }

    #[test]
    fn type_names() {
        assert_eq!(Message::GetLedger.type_name(), "GetLedger");
        assert_eq!(Message::LedgerSnapshot(vec![]).type_name(), "LedgerSnapshot");
    }
}
