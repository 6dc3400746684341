//! Source adapter types
//!
//! Every adapter returns [`RawRecord`]s. The rest of the pipeline only ever
//! looks at a record's timestamp, its device, and its attribute values; how to
//! find those in an event-style record is described by a [`RecordLayout`].

use crate::cursor::{Cursor, CursorKind};
use crate::error::Result;
use crate::types::{JsonObject, JsonValue};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Raw Records
// ============================================================================

/// One record as returned by a source
#[derive(Debug, Clone, PartialEq)]
pub enum RawRecord {
    /// Self-describing flat object (event-hub message, HTTP or CSV row)
    Event(JsonObject),

    /// One reading of a named signal whose device is not known yet
    Signal {
        /// Signal name (e.g. a PI point)
        name: String,
        /// Reading timestamp as returned by the source
        timestamp: JsonValue,
        /// Reading value
        value: JsonValue,
    },

    /// One reading of one attribute of a known device
    Attribute {
        /// Device the reading belongs to
        device: String,
        /// Attribute name as returned by the source
        attribute: String,
        /// Reading timestamp as returned by the source
        timestamp: JsonValue,
        /// Reading value
        value: JsonValue,
    },
}

impl RawRecord {
    /// Create a signal reading
    pub fn signal(name: impl Into<String>, timestamp: JsonValue, value: JsonValue) -> Self {
        Self::Signal {
            name: name.into(),
            timestamp,
            value,
        }
    }

    /// Create an attribute reading
    pub fn attribute(
        device: impl Into<String>,
        attribute: impl Into<String>,
        timestamp: JsonValue,
        value: JsonValue,
    ) -> Self {
        Self::Attribute {
            device: device.into(),
            attribute: attribute.into(),
            timestamp,
            value,
        }
    }
}

// ============================================================================
// Record Layout
// ============================================================================

/// Where the key fields of a source's records live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordLayout {
    /// Field holding the event timestamp
    pub timestamp_field: String,

    /// Field holding the device id (events only)
    #[serde(default)]
    pub device_field: Option<String>,

    /// Device id used when records carry none
    #[serde(default)]
    pub fixed_device: Option<String>,

    /// Field holding a sequence number (events only)
    #[serde(default)]
    pub sequence_field: Option<String>,

    /// Field renames applied to events before metadata is stripped
    #[serde(default)]
    pub renames: BTreeMap<String, String>,

    /// Fields starting with one of these prefixes are protocol metadata
    #[serde(default)]
    pub metadata_prefixes: Vec<String>,

    /// Fields a row must carry to be kept
    #[serde(default)]
    pub required_fields: Vec<String>,
}

impl RecordLayout {
    /// Layout with only a timestamp field
    pub fn new(timestamp_field: impl Into<String>) -> Self {
        Self {
            timestamp_field: timestamp_field.into(),
            device_field: None,
            fixed_device: None,
            sequence_field: None,
            renames: BTreeMap::new(),
            metadata_prefixes: Vec::new(),
            required_fields: Vec::new(),
        }
    }

    /// Read the device id from `field`
    #[must_use]
    pub fn with_device_field(mut self, field: impl Into<String>) -> Self {
        self.device_field = Some(field.into());
        self
    }

    /// Use `device` for every record
    #[must_use]
    pub fn with_fixed_device(mut self, device: impl Into<String>) -> Self {
        self.fixed_device = Some(device.into());
        self
    }

    /// Read a sequence number from `field`
    #[must_use]
    pub fn with_sequence_field(mut self, field: impl Into<String>) -> Self {
        self.sequence_field = Some(field.into());
        self
    }

    /// Rename `from` to `to`
    #[must_use]
    pub fn rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.renames.insert(from.into(), to.into());
        self
    }

    /// Strip fields starting with `prefix`
    #[must_use]
    pub fn strip_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.metadata_prefixes.push(prefix.into());
        self
    }

    /// Require the given fields; the timestamp field is always required
    #[must_use]
    pub fn require<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for field in fields {
            let field = field.into();
            let field = field.trim();
            if !field.is_empty() && !self.required_fields.iter().any(|f| f == field) {
                self.required_fields.push(field.to_string());
            }
        }
        let ts = self.timestamp_field.clone();
        if !self.required_fields.contains(&ts) {
            self.required_fields.push(ts);
        }
        self
    }

    /// Check whether a field is protocol metadata
    pub fn is_metadata(&self, field: &str) -> bool {
        self.metadata_prefixes
            .iter()
            .any(|prefix| field.starts_with(prefix.as_str()))
    }
}

// ============================================================================
// Fetch Results
// ============================================================================

/// Records returned by one fetch
#[derive(Debug, Clone, Default)]
pub struct Fetch {
    /// Records newer than the cursor
    pub records: Vec<RawRecord>,
    /// Records dropped because they could not be read
    pub malformed: usize,
}

impl Fetch {
    /// Create a fetch result
    pub fn new(records: Vec<RawRecord>, malformed: usize) -> Self {
        Self { records, malformed }
    }

    /// Check whether nothing new was returned
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Result of a reachability check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    /// Whether the source answered
    pub success: bool,

    /// What was checked, or why it failed
    pub message: Option<String>,
}

impl CheckResult {
    /// Create a successful check result
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }

    /// Create a failed check result
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

// ============================================================================
// Source Adapter Trait
// ============================================================================

/// Fetch-since-cursor capability implemented by every source
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Human-readable name used in logs and reports
    fn name(&self) -> &str;

    /// Source kind (`amqp`, `osipi_points`, ...)
    fn kind(&self) -> &'static str;

    /// Key of this source's cursor, lower-cased
    fn cursor_key(&self) -> String;

    /// Cursor representation used by this source
    fn cursor_kind(&self) -> CursorKind;

    /// Cursor registered for a key seen for the first time
    fn default_cursor(&self) -> Option<Cursor> {
        None
    }

    /// How to read this source's records
    fn layout(&self) -> &RecordLayout;

    /// Fetch records newer than `since`.
    ///
    /// "Nothing new" is an empty [`Fetch`], never an error. Transport and
    /// authentication failures are returned as `SourceUnavailable`.
    async fn fetch(&self, since: Option<&Cursor>) -> Result<Fetch>;

    /// Check that the source can be reached
    async fn check(&self) -> Result<CheckResult>;
}
