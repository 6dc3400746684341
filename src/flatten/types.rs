//! Flattener types

use crate::error::{Error, Result};
use crate::types::{JsonObject, JsonValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// ============================================================================
// Attribute Map
// ============================================================================

/// Where a source attribute lands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeTarget {
    /// Device the reading belongs to; `None` keeps the reading's own device
    #[serde(default)]
    pub device: Option<String>,
    /// Attribute (column) name
    pub attribute: String,
}

/// One entry of a map file: `["device", "attribute"]`, `"attribute"` or
/// `{device, attribute}`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum MapEntry {
    Pair(String, String),
    Name(String),
    Target(AttributeTarget),
}

impl From<MapEntry> for AttributeTarget {
    fn from(entry: MapEntry) -> Self {
        match entry {
            MapEntry::Pair(device, attribute) => Self {
                device: Some(device),
                attribute,
            },
            MapEntry::Name(attribute) => Self {
                device: None,
                attribute,
            },
            MapEntry::Target(target) => target,
        }
    }
}

/// Source attribute name → (device, attribute).
///
/// An empty map is the identity: every attribute keeps its name and device.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "BTreeMap<String, MapEntry>")]
pub struct AttributeMap {
    entries: BTreeMap<String, AttributeTarget>,
}

impl From<BTreeMap<String, MapEntry>> for AttributeMap {
    fn from(entries: BTreeMap<String, MapEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(name, entry)| (name, entry.into()))
                .collect(),
        }
    }
}

impl AttributeMap {
    /// Identity map
    pub fn identity() -> Self {
        Self::default()
    }

    /// Parse a JSON map, e.g. `{"Boiler.Temp": ["boiler1", "temperature"]}`
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON map file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                Error::Io(e)
            }
        })?;
        Self::from_json_str(&content)
            .map_err(|e| Error::config(format!("Invalid attribute map {}: {e}", path.display())))
    }

    /// Add an entry
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        device: Option<String>,
        attribute: impl Into<String>,
    ) -> &mut Self {
        self.entries.insert(
            name.into(),
            AttributeTarget {
                device,
                attribute: attribute.into(),
            },
        );
        self
    }

    /// Check whether this is the identity map
    pub fn is_identity(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the map has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry for `name`
    pub fn get(&self, name: &str) -> Option<&AttributeTarget> {
        self.entries.get(name)
    }

    /// Resolve `name`; `None` means the attribute is not mapped
    pub fn resolve(&self, name: &str) -> Option<AttributeTarget> {
        if self.is_identity() {
            return Some(AttributeTarget {
                device: None,
                attribute: name.to_string(),
            });
        }
        self.entries.get(name).cloned()
    }
}

// ============================================================================
// Flattened Rows
// ============================================================================

/// Readings of one device at one timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct FlattenedRow {
    /// Timestamp as returned by the source
    pub timestamp: JsonValue,
    /// Device id as returned by the source
    pub device: String,
    /// Highest sequence number merged into this row
    pub sequence: Option<i64>,
    /// Attribute values
    pub values: JsonObject,
}

impl FlattenedRow {
    /// Create an empty row
    pub fn new(timestamp: JsonValue, device: impl Into<String>) -> Self {
        Self {
            timestamp,
            device: device.into(),
            sequence: None,
            values: JsonObject::new(),
        }
    }

    /// Merge one attribute value. A null never replaces a value.
    pub fn set(&mut self, attribute: impl Into<String>, value: JsonValue) {
        let attribute = attribute.into();
        if value.is_null() && self.values.contains_key(&attribute) {
            return;
        }
        self.values.insert(attribute, value);
    }

    /// Merge a sequence number, keeping the highest
    pub fn merge_sequence(&mut self, sequence: Option<i64>) {
        self.sequence = self.sequence.max(sequence);
    }

    /// Check whether the row carries a non-null `field`
    pub fn has(&self, field: &str) -> bool {
        self.values
            .iter()
            .any(|(k, v)| k.eq_ignore_ascii_case(field) && !v.is_null())
    }
}

/// Counters of one flatten pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlattenStats {
    /// Raw records seen
    pub records: usize,
    /// Readings dropped because their attribute is not mapped
    pub unmapped: usize,
    /// Records without a timestamp or device
    pub missing_key: usize,
    /// Rows dropped for lacking a required field
    pub missing_required: usize,
}

/// Key of a flattened row: (timestamp text, device)
pub type RowKey = (String, String);

/// Rows keyed by (timestamp, device)
#[derive(Debug, Clone, Default)]
pub struct FlattenedRows {
    pub(crate) rows: BTreeMap<RowKey, FlattenedRow>,
    /// Counters
    pub stats: FlattenStats,
}

impl FlattenedRows {
    /// Row at `key`, created on first use
    pub(crate) fn entry(&mut self, timestamp: JsonValue, device: &str) -> &mut FlattenedRow {
        let key = (timestamp_key(&timestamp), device.to_string());
        self.rows
            .entry(key)
            .or_insert_with(|| FlattenedRow::new(timestamp, device))
    }

    /// Row for a timestamp and device
    pub fn get(&self, timestamp: &str, device: &str) -> Option<&FlattenedRow> {
        self.rows.get(&(timestamp.to_string(), device.to_string()))
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check whether there are no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterate rows in key order
    pub fn iter(&self) -> impl Iterator<Item = &FlattenedRow> {
        self.rows.values()
    }

    /// Take the rows in key order
    pub fn into_rows(self) -> Vec<FlattenedRow> {
        self.rows.into_values().collect()
    }
}

/// Text form of a timestamp used in row keys
pub(crate) fn timestamp_key(timestamp: &JsonValue) -> String {
    match timestamp {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
