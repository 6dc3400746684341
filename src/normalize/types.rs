//! Normalizer types

use crate::cursor::Cursor;
use crate::types::JsonObject;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Target Schema
// ============================================================================

/// Column roles of the sink table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSchema {
    /// Row timestamp
    #[serde(default = "default_timestamp_column")]
    pub timestamp_column: String,

    /// Device id
    #[serde(default = "default_device_column")]
    pub device_column: String,

    /// Device type, filled with the source name when missing
    #[serde(default = "default_device_type_column")]
    pub device_type_column: String,

    /// Event type, filled with the event-type label when missing
    #[serde(default = "default_event_type_column")]
    pub event_type_column: String,

    /// Write time, filled with the cycle time
    #[serde(default = "default_updated_column")]
    pub updated_column: String,

    /// Columns whose names are written upper-case
    #[serde(default)]
    pub force_upper: Vec<String>,
}

fn default_timestamp_column() -> String {
    "evt_timestamp".to_string()
}

fn default_device_column() -> String {
    "deviceid".to_string()
}

fn default_device_type_column() -> String {
    "devicetype".to_string()
}

fn default_event_type_column() -> String {
    "eventtype".to_string()
}

fn default_updated_column() -> String {
    "updated_utc".to_string()
}

impl Default for TargetSchema {
    fn default() -> Self {
        Self {
            timestamp_column: default_timestamp_column(),
            device_column: default_device_column(),
            device_type_column: default_device_type_column(),
            event_type_column: default_event_type_column(),
            updated_column: default_updated_column(),
            force_upper: Vec::new(),
        }
    }
}

impl TargetSchema {
    /// Output name of `column`
    pub fn output_name(&self, column: &str) -> String {
        if self
            .force_upper
            .iter()
            .any(|c| c.eq_ignore_ascii_case(column))
        {
            column.to_uppercase()
        } else {
            column.to_string()
        }
    }
}

// ============================================================================
// Normalized Table
// ============================================================================

/// One output row
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    /// Sanitized device id
    pub device: String,
    /// Row timestamp
    pub timestamp: DateTime<Utc>,
    /// One value per output column
    pub values: JsonObject,
}

/// Counters of one normalize pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeStats {
    /// Rows dropped because the device id was empty after sanitizing
    pub dropped_devices: usize,
    /// Rows whose timestamp could not be parsed
    pub unparseable_timestamps: usize,
    /// Rows merged into another row with the same key
    pub merged: usize,
    /// Source columns not present in the sink
    pub dropped_columns: Vec<String>,
    /// Required columns no row carried
    pub filled_columns: Vec<String>,
}

/// Rows ready for a sink
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedTable {
    /// Output column names, in sink order
    pub columns: Vec<String>,
    /// Rows sorted by (device, timestamp)
    pub rows: Vec<NormalizedRow>,
    /// Output columns holding timestamps
    pub timestamp_columns: Vec<String>,
    /// Output column holding the device id
    pub device_column: String,
    /// Output column holding the row timestamp
    pub timestamp_column: String,
    /// Highest cursor value among the rows
    pub cursor_candidate: Option<Cursor>,
    /// Counters
    pub stats: NormalizeStats,
}

impl NormalizedTable {
    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check whether there is nothing to write
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Check whether `column` holds timestamps
    pub fn is_timestamp_column(&self, column: &str) -> bool {
        self.timestamp_columns.iter().any(|c| c == column)
    }
}
