use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Opaque record contents supplied by the caller.
///
/// The ledger treats a payload as raw bytes. In JSON a payload is written
/// as a string when the bytes are valid UTF-8 and as an array of byte
/// values otherwise; both forms are accepted when reading.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Payload(Vec<u8>);

#[derive(Deserialize)]
#[serde(untagged)]
enum PayloadRepr {
    Text(String),
    Bytes(Vec<u8>),
}

impl Payload {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Validate a caller-supplied JSON value as a payload.
    ///
    /// Only a non-empty JSON string is accepted; anything else (missing,
    /// null, numbers, objects, the empty string) is rejected.
    pub fn from_json(value: Option<&serde_json::Value>) -> Result<Self, TypeError> {
        match value {
            Some(serde_json::Value::String(s)) if !s.is_empty() => Ok(Self(s.clone().into_bytes())),
            Some(serde_json::Value::String(_)) => {
                Err(TypeError::InvalidInput("payload must not be empty".into()))
            }
            Some(other) => Err(TypeError::InvalidInput(format!(
                "payload must be a string, got {}",
                json_kind(other)
            ))),
            None => Err(TypeError::InvalidInput("payload is required".into())),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The payload as text, if it is valid UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(text) => write!(f, "Payload({text:?})"),
            None => write!(f, "Payload({} bytes)", self.0.len()),
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(text) => f.write_str(text),
            None => write!(f, "0x{}", hex::encode(&self.0)),
        }
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.as_text() {
            Some(text) => serializer.serialize_str(text),
            None => self.0.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match PayloadRepr::deserialize(deserializer)? {
            PayloadRepr::Text(s) => Self(s.into_bytes()),
            PayloadRepr::Bytes(b) => Self(b),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn text_payload_serializes_as_string() {
        let p = Payload::from("hello");
        assert_eq!(serde_json::to_value(&p).unwrap(), json!("hello"));
    }

    #[test]
    fn binary_payload_serializes_as_byte_array() {
        let p = Payload::new(vec![0xff, 0x00, 0x10]);
        assert_eq!(serde_json::to_value(&p).unwrap(), json!([255, 0, 16]));
    }

    #[test]
    fn from_json_accepts_non_empty_string() {
        let value = json!("block data");
        let p = Payload::from_json(Some(&value)).unwrap();
        assert_eq!(p.as_text(), Some("block data"));
    }

    #[test]
    fn from_json_rejects_missing_empty_and_non_string() {
        assert!(matches!(Payload::from_json(None), Err(TypeError::InvalidInput(_))));
        let empty = json!("");
        assert!(Payload::from_json(Some(&empty)).is_err());
        let number = json!(42);
        let err = Payload::from_json(Some(&number)).unwrap_err();
        assert!(err.to_string().contains("number"));
        assert!(Payload::from_json(Some(&serde_json::Value::Null)).is_err());
    }

    #[test]
    fn display_falls_back_to_hex() {
        let p = Payload::new(vec![0xc3, 0x28]);
        assert_eq!(format!("{p}"), "0xc328");
    }

    proptest! {
        #[test]
        fn any_bytes_survive_json(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let p = Payload::new(bytes.clone());
            let json = serde_json::to_string(&p).unwrap();
            let back: Payload = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(back.as_bytes(), &bytes[..]);
        }
    }
}
