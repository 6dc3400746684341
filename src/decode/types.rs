//! Decoder types and traits
//!
//! Defines the core decoder abstractions.

use super::decoders::{CsvDecoder, JsonDecoder, JsonlDecoder};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Format of a response body or file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecoderFormat {
    /// JSON format (default)
    #[default]
    Json,
    /// JSON Lines format (one JSON object per line)
    Jsonl,
    /// CSV format
    Csv,
}

/// Configuration for decoding bodies
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Body format
    #[serde(default)]
    pub format: DecoderFormat,
    /// Path to the records inside a JSON body
    #[serde(default)]
    pub record_path: Option<String>,
    /// CSV delimiter (default: comma)
    #[serde(default)]
    pub csv_delimiter: Option<char>,
    /// Whether CSV has a header row
    #[serde(default = "default_true")]
    pub csv_has_header: bool,
}

fn default_true() -> bool {
    true
}

impl DecoderConfig {
    /// Create a JSON decoder config
    pub fn json() -> Self {
        Self {
            format: DecoderFormat::Json,
            csv_has_header: true,
            ..Default::default()
        }
    }

    /// Create a CSV decoder config
    pub fn csv() -> Self {
        Self {
            format: DecoderFormat::Csv,
            csv_delimiter: Some(','),
            csv_has_header: true,
            ..Default::default()
        }
    }

    /// Set the record path
    #[must_use]
    pub fn with_record_path(mut self, path: impl Into<String>) -> Self {
        self.record_path = Some(path.into());
        self
    }

    /// Build the decoder described by this config
    pub fn build(&self) -> Box<dyn RecordDecoder> {
        match self.format {
            DecoderFormat::Json => match &self.record_path {
                Some(path) => Box::new(JsonDecoder::with_path(path.clone())),
                None => Box::new(JsonDecoder::new()),
            },
            DecoderFormat::Jsonl => Box::new(JsonlDecoder::new()),
            DecoderFormat::Csv => Box::new(CsvDecoder::with_options(
                self.csv_delimiter.unwrap_or(','),
                self.csv_has_header,
            )),
        }
    }
}

/// Records decoded from a body, with the count of records that were skipped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decoded {
    /// Successfully decoded records
    pub records: Vec<Value>,
    /// Records dropped because they could not be parsed
    pub malformed: usize,
}

/// Trait for decoding bodies into records
pub trait RecordDecoder: Send + Sync {
    /// Decode the body into a list of records
    fn decode(&self, body: &str) -> Result<Vec<Value>>;

    /// Decode, skipping records that cannot be parsed individually
    fn decode_lenient(&self, body: &str) -> Result<Decoded> {
        Ok(Decoded {
            records: self.decode(body)?,
            malformed: 0,
        })
    }
}
