//! Request and response payloads.
//!
//! Bodies are raw bytes internally. On the wire they serialize as a plain
//! string when the bytes are valid UTF-8, and as
//! `{"type": "BINARY", "base64Bytes": "..."}` otherwise. JSON objects are
//! accepted on input and stored as their compact string form.

use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Body(Bytes);

impl Body {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn empty() -> Self {
        Self(Bytes::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Cheap clone of the underlying buffer.
    pub fn bytes(&self) -> Bytes {
        self.0.clone()
    }

    /// The body as text, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

impl From<&str> for Body {
    fn from(value: &str) -> Self {
        Self(Bytes::copy_from_slice(value.as_bytes()))
    }
}

impl From<String> for Body {
    fn from(value: String) -> Self {
        Self(Bytes::from(value))
    }
}

impl From<Vec<u8>> for Body {
    fn from(value: Vec<u8>) -> Self {
        Self(Bytes::from(value))
    }
}

impl From<Bytes> for Body {
    fn from(value: Bytes) -> Self {
        Self(value)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BinaryBodyOut<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    base64_bytes: String,
}

/// Accepted input shapes for a body.
#[derive(Deserialize)]
#[serde(untagged)]
enum BodyRaw {
    Text(String),
    Binary {
        #[serde(rename = "base64Bytes")]
        base64_bytes: String,
    },
    Json(serde_json::Value),
}

impl Serialize for Body {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self.as_str() {
            Some(text) => serializer.serialize_str(text),
            None => BinaryBodyOut {
                kind: "BINARY",
                base64_bytes: base64::engine::general_purpose::STANDARD.encode(&self.0),
            }
            .serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Body {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;
        match BodyRaw::deserialize(deserializer)? {
            BodyRaw::Text(text) => Ok(Body::from(text)),
            BodyRaw::Binary { base64_bytes } => base64::engine::general_purpose::STANDARD
                .decode(base64_bytes.as_bytes())
                .map(Body::from)
                .map_err(|e| D::Error::custom(format!("invalid base64Bytes: {e}"))),
            BodyRaw::Json(serde_json::Value::Null) => Ok(Body::empty()),
            BodyRaw::Json(value) => Ok(Body::from(value.to_string())),
        }
    }
}
