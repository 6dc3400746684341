//! Table normalizer
//!
//! Reconciles flattened rows with the sink's required columns:
//!
//! 1. sanitize the device id, dropping rows whose id becomes empty
//! 2. parse the timestamp, dropping rows where it does not parse
//! 3. lower-case column names and drop those the sink does not have
//! 4. fill the remaining required columns with defaults
//! 5. upper-case forced column names
//! 6. take the highest timestamp or sequence as cursor candidate

use super::timestamp::{format_timestamp, parse_timestamp, sanitize_device};
use super::types::{NormalizeStats, NormalizedRow, NormalizedTable, TargetSchema};
use crate::cursor::{Cursor, CursorKind};
use crate::flatten::FlattenedRow;
use crate::types::{JsonObject, JsonValue};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Builds sink-shaped tables from flattened rows
#[derive(Debug, Clone, Default)]
pub struct TableNormalizer {
    schema: TargetSchema,
    device_type: Option<String>,
    event_type: Option<String>,
}

impl TableNormalizer {
    /// Create a normalizer for `schema`
    pub fn new(schema: TargetSchema) -> Self {
        Self {
            schema,
            device_type: None,
            event_type: None,
        }
    }

    /// Value of the device-type column when rows carry none
    #[must_use]
    pub fn with_device_type(mut self, label: impl Into<String>) -> Self {
        self.device_type = Some(label.into());
        self
    }

    /// Value of the event-type column when rows carry none
    #[must_use]
    pub fn with_event_type(mut self, label: impl Into<String>) -> Self {
        self.event_type = Some(label.into());
        self
    }

    /// Target schema in use
    pub fn schema(&self) -> &TargetSchema {
        &self.schema
    }

    /// Normalize `rows` to exactly the `required` columns
    pub fn normalize(
        &self,
        rows: Vec<FlattenedRow>,
        required: &[String],
        cursor_kind: CursorKind,
        now: DateTime<Utc>,
    ) -> NormalizedTable {
        let required = dedup_lowercase(required);
        let required_set: BTreeSet<&str> = required.iter().map(String::as_str).collect();

        let mut stats = NormalizeStats::default();
        let mut dropped_columns = BTreeSet::new();
        let mut merged: BTreeMap<(String, DateTime<Utc>), JsonObject> = BTreeMap::new();
        let mut max_ts: Option<DateTime<Utc>> = None;
        let mut max_seq: Option<i64> = None;

        for row in rows {
            let device = sanitize_device(&row.device);
            if device.is_empty() {
                stats.dropped_devices += 1;
                continue;
            }

            let Some(timestamp) = parse_timestamp(&row.timestamp) else {
                warn!(device = %device, timestamp = %row.timestamp, "Dropping row with unparseable timestamp");
                stats.unparseable_timestamps += 1;
                continue;
            };
            max_ts = max_ts.max(Some(timestamp));
            max_seq = max_seq.max(row.sequence);

            let key = (device, timestamp);
            if merged.contains_key(&key) {
                stats.merged += 1;
            }
            let values = merged.entry(key).or_default();
            for (column, value) in row.values {
                let column = column.to_lowercase();
                if !required_set.contains(column.as_str()) {
                    dropped_columns.insert(column);
                    continue;
                }
                if value.is_null() && values.contains_key(&column) {
                    continue;
                }
                values.insert(column, value);
            }
        }

        if !dropped_columns.is_empty() {
            debug!(columns = ?dropped_columns, "Dropping columns the sink does not have");
        }

        let carried: BTreeSet<&str> = merged
            .values()
            .flat_map(|values| values.keys().map(String::as_str))
            .collect();
        stats.filled_columns = required
            .iter()
            .filter(|c| !carried.contains(c.as_str()) && !self.is_key_column(c))
            .cloned()
            .collect();
        stats.dropped_columns = dropped_columns.into_iter().collect();

        let columns: Vec<String> = required
            .iter()
            .map(|c| self.schema.output_name(c))
            .collect();
        let timestamp_columns = [&self.schema.timestamp_column, &self.schema.updated_column]
            .into_iter()
            .filter(|c| required_set.contains(c.to_lowercase().as_str()))
            .map(|c| self.schema.output_name(&c.to_lowercase()))
            .collect();

        let rows = merged
            .into_iter()
            .map(|((device, timestamp), values)| {
                let values = required
                    .iter()
                    .map(|column| {
                        let value = self.cell(column, &device, &timestamp, &values, now);
                        (self.schema.output_name(column), value)
                    })
                    .collect();
                NormalizedRow {
                    device,
                    timestamp,
                    values,
                }
            })
            .collect::<Vec<_>>();

        let cursor_candidate = if rows.is_empty() {
            None
        } else {
            match cursor_kind {
                CursorKind::Sequence => max_seq.map(Cursor::Sequence),
                CursorKind::Timestamp => max_ts.map(Cursor::Timestamp),
            }
        };

        NormalizedTable {
            columns,
            rows,
            timestamp_columns,
            device_column: self.schema.output_name(&self.schema.device_column.to_lowercase()),
            timestamp_column: self
                .schema
                .output_name(&self.schema.timestamp_column.to_lowercase()),
            cursor_candidate,
            stats,
        }
    }

    fn is_key_column(&self, column: &str) -> bool {
        column.eq_ignore_ascii_case(&self.schema.timestamp_column)
            || column.eq_ignore_ascii_case(&self.schema.device_column)
    }

    /// Value of `column` in one output row
    fn cell(
        &self,
        column: &str,
        device: &str,
        timestamp: &DateTime<Utc>,
        values: &JsonObject,
        now: DateTime<Utc>,
    ) -> JsonValue {
        let schema = &self.schema;
        if column.eq_ignore_ascii_case(&schema.timestamp_column) {
            return JsonValue::String(format_timestamp(timestamp));
        }
        if column.eq_ignore_ascii_case(&schema.device_column) {
            return JsonValue::String(device.to_string());
        }

        match values.get(column) {
            Some(value) if !value.is_null() => value.clone(),
            _ if column.eq_ignore_ascii_case(&schema.updated_column) => {
                JsonValue::String(format_timestamp(&now))
            }
            _ if column.eq_ignore_ascii_case(&schema.device_type_column) => {
                label(self.device_type.as_deref())
            }
            _ if column.eq_ignore_ascii_case(&schema.event_type_column) => {
                label(self.event_type.as_deref())
            }
            _ => JsonValue::Null,
        }
    }
}

fn label(label: Option<&str>) -> JsonValue {
    label.map_or(JsonValue::Null, |l| JsonValue::String(l.to_string()))
}

fn dedup_lowercase(columns: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    columns
        .iter()
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty() && seen.insert(c.clone()))
        .collect()
}
