//! Received event-hub messages

use super::filter::ENQUEUED_TIME_ANNOTATION;
use crate::decode::{decode_event_body, BodyKind};
use crate::types::{JsonObject, JsonValue};
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat};

/// Value of a message annotation or application property
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationValue {
    /// Binary value, decoded as UTF-8 text
    Binary(Bytes),
    /// String or symbol
    Text(String),
    /// Integer
    Long(i64),
    /// AMQP timestamp (epoch milliseconds)
    Timestamp(i64),
    /// Anything else, already converted
    Other(JsonValue),
}

impl AnnotationValue {
    fn into_json(self) -> JsonValue {
        match self {
            AnnotationValue::Binary(bytes) => {
                JsonValue::String(String::from_utf8_lossy(&bytes).into_owned())
            }
            AnnotationValue::Text(s) => JsonValue::String(s),
            AnnotationValue::Long(n) | AnnotationValue::Timestamp(n) => JsonValue::from(n),
            AnnotationValue::Other(v) => v,
        }
    }
}

/// One event as delivered by the link
#[derive(Debug, Clone, PartialEq)]
pub struct AmqpMessage {
    /// Data sections of the body
    pub data: Vec<Bytes>,
    /// Message annotations and application properties
    pub annotations: Vec<(String, AnnotationValue)>,
}

impl AmqpMessage {
    /// Create a message with a single data section
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            data: vec![body.into()],
            annotations: Vec::new(),
        }
    }

    /// Add an annotation
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: AnnotationValue) -> Self {
        self.annotations.push((key.into(), value));
        self
    }

    /// Decode the body and merge the annotations into one record.
    ///
    /// The enqueue time is converted from epoch milliseconds to an ISO-8601
    /// timestamp.
    pub fn into_record(self) -> (JsonObject, BodyKind) {
        let (mut record, kind) = decode_event_body(&self.data);

        for (key, value) in self.annotations {
            record.insert(key, value.into_json());
        }

        if let Some(enqueued) = record.get(ENQUEUED_TIME_ANNOTATION).and_then(epoch_millis) {
            if let Some(ts) = DateTime::from_timestamp_millis(enqueued) {
                record.insert(
                    ENQUEUED_TIME_ANNOTATION.to_string(),
                    JsonValue::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
                );
            }
        }

        (record, kind)
    }
}

fn epoch_millis(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
