//! Types for parsed event-stream records

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Payload of a record's `data:` field
///
/// Only JSON objects are decoded. Arrays, strings, numbers, `null` and
/// malformed JSON all stay as the original trimmed text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageData {
    /// The field decoded to a JSON object
    Json(Map<String, Value>),
    /// Raw text, verbatim
    Text(String),
}

impl MessageData {
    /// Decode `raw` as a JSON object, falling back to the text itself
    pub fn decode(raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Self::Json(map),
            _ => Self::Text(raw.to_string()),
        }
    }

    /// Get the decoded object, if any
    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Json(map) => Some(map),
            Self::Text(_) => None,
        }
    }

    /// Get the raw text, if the payload was not an object
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Json(_) => None,
            Self::Text(text) => Some(text),
        }
    }

    /// Look up a field of an object payload
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// Deserialize an object payload into a typed value
    pub fn parse<T: serde::de::DeserializeOwned>(&self) -> Option<T> {
        self.as_object()
            .and_then(|map| serde_json::from_value(Value::Object(map.clone())).ok())
    }
}

/// One completed event-stream record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Value of the record's `id:` line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Value of the record's `event:` line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,

    /// Value of the record's `data:` line
    pub data: MessageData,
}

impl Message {
    /// Get the `id:` value
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Get the `event:` value
    pub fn event(&self) -> Option<&str> {
        self.event.as_deref()
    }
}
