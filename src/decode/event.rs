//! Event payload decoding
//!
//! Event-hub messages carry their payload in one or more binary data
//! sections. The concatenated payload is decoded as JSON; anything that is
//! not a JSON object is wrapped rather than dropped.

use crate::types::JsonObject;
use bytes::Bytes;
use serde_json::Value;
use tracing::debug;

/// Key holding a non-object JSON payload
pub const JSON_WRAPPER_KEY: &str = "json";

/// Key holding a payload that is not JSON at all
pub const RAW_DATA_KEY: &str = "rawData";

/// How an event body was interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// JSON object, used as-is
    Object,
    /// Valid JSON that is not an object, wrapped under `json`
    Wrapped,
    /// Not JSON, kept as text under `rawData`
    Raw,
}

/// Decode the data sections of one event into a JSON object
pub fn decode_event_body(sections: &[Bytes]) -> (JsonObject, BodyKind) {
    let text: String = sections
        .iter()
        .map(|section| String::from_utf8_lossy(section))
        .collect();

    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(obj)) => (obj, BodyKind::Object),
        Ok(other) => {
            debug!("Event body is JSON but not an object, wrapping");
            let mut obj = JsonObject::new();
            obj.insert(JSON_WRAPPER_KEY.to_string(), other);
            (obj, BodyKind::Wrapped)
        }
        Err(e) => {
            debug!("Event body is not JSON ({e}), keeping raw text");
            let mut obj = JsonObject::new();
            obj.insert(RAW_DATA_KEY.to_string(), Value::String(text));
            (obj, BodyKind::Raw)
        }
    }
}
