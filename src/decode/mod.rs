//! Decoder module
//!
//! Supports: JSON, JSONL, CSV bodies and event-hub message payloads.
//!
//! # Overview
//!
//! The HTTP and CSV sources decode whole bodies into records using a
//! configured format and record path. The AMQP source decodes one event
//! body at a time with [`decode_event_body`], which never fails.

mod decoders;
mod event;
mod types;

pub use decoders::{CsvDecoder, JsonDecoder, JsonlDecoder};
pub use event::{decode_event_body, BodyKind, JSON_WRAPPER_KEY, RAW_DATA_KEY};
pub use types::{Decoded, DecoderConfig, DecoderFormat, RecordDecoder};

#[cfg(test)]
mod tests;
