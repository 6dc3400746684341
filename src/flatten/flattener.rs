//! Flattener
//!
//! Merges readings scattered over many records and attribute streams into one
//! row per (timestamp, device).

use super::types::{AttributeMap, FlattenedRows};
use crate::source::{RawRecord, RecordLayout};
use crate::types::{JsonObject, JsonValue};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Merges raw records into keyed rows
#[derive(Debug, Clone, Default)]
pub struct Flattener {
    map: AttributeMap,
}

impl Flattener {
    /// Create a flattener with an attribute map
    pub fn new(map: AttributeMap) -> Self {
        Self { map }
    }

    /// Attribute map in use
    pub fn map(&self) -> &AttributeMap {
        &self.map
    }

    /// Flatten `records` read with `layout`.
    ///
    /// Later readings for the same key add columns to the existing row. Rows
    /// lacking one of the layout's required fields are dropped at the end.
    pub fn flatten(&self, records: Vec<RawRecord>, layout: &RecordLayout) -> FlattenedRows {
        let mut out = FlattenedRows::default();
        let mut warned = HashSet::new();
        out.stats.records = records.len();

        for record in records {
            match record {
                RawRecord::Event(event) => self.flatten_event(event, layout, &mut out, &mut warned),
                RawRecord::Signal {
                    name,
                    timestamp,
                    value,
                } => {
                    let target = self.map.resolve(&name).and_then(|t| {
                        let device = t.device.or_else(|| layout.fixed_device.clone())?;
                        Some((device, t.attribute))
                    });
                    match target {
                        Some((device, attribute)) if !timestamp.is_null() => {
                            out.entry(timestamp, &device).set(attribute, value);
                        }
                        Some(_) => out.stats.missing_key += 1,
                        None => unmapped(&name, &mut out, &mut warned),
                    }
                }
                RawRecord::Attribute {
                    device,
                    attribute,
                    timestamp,
                    value,
                } => {
                    if timestamp.is_null() {
                        out.stats.missing_key += 1;
                        continue;
                    }
                    match self.map.resolve(&attribute) {
                        Some(target) => {
                            let device = target.device.unwrap_or(device);
                            out.entry(timestamp, &device).set(target.attribute, value);
                        }
                        None => unmapped(&attribute, &mut out, &mut warned),
                    }
                }
            }
        }

        self.drop_incomplete(&mut out, layout);
        debug!(
            rows = out.len(),
            unmapped = out.stats.unmapped,
            missing_required = out.stats.missing_required,
            "Flattened records"
        );
        out
    }

    fn flatten_event(
        &self,
        mut event: JsonObject,
        layout: &RecordLayout,
        out: &mut FlattenedRows,
        warned: &mut HashSet<String>,
    ) {
        let timestamp = event
            .remove(&layout.timestamp_field)
            .unwrap_or(JsonValue::Null);
        let device = match layout.device_field {
            Some(ref field) => event.remove(field).and_then(|v| scalar_text(&v)),
            None => None,
        }
        .or_else(|| layout.fixed_device.clone());
        let sequence = layout
            .sequence_field
            .as_ref()
            .and_then(|field| event.remove(field))
            .and_then(|v| sequence_number(&v));

        let (Some(device), false) = (device, timestamp.is_null()) else {
            out.stats.missing_key += 1;
            return;
        };

        for (from, to) in &layout.renames {
            if let Some(value) = event.remove(from) {
                event.insert(to.clone(), value);
            }
        }
        event.retain(|field, _| !layout.is_metadata(field));

        let mut readings = Vec::with_capacity(event.len());
        for (field, value) in event {
            match self.map.resolve(&field) {
                Some(target) => readings.push((target, value)),
                None => unmapped(&field, out, warned),
            }
        }

        // An event only yields rows for the devices its readings landed on
        for (target, value) in readings {
            let device = target.device.as_deref().unwrap_or(&device);
            let row = out.entry(timestamp.clone(), device);
            row.set(target.attribute, value);
            row.merge_sequence(sequence);
        }
    }

    fn drop_incomplete(&self, out: &mut FlattenedRows, layout: &RecordLayout) {
        let required: Vec<&str> = layout
            .required_fields
            .iter()
            .map(String::as_str)
            .filter(|f| *f != layout.timestamp_field)
            .collect();
        if required.is_empty() {
            return;
        }

        let before = out.rows.len();
        out.rows
            .retain(|_, row| required.iter().all(|field| row.has(field)));
        out.stats.missing_required += before - out.rows.len();

        if out.stats.missing_required > 0 {
            warn!(
                "Dropped {} rows lacking one of {:?}",
                out.stats.missing_required, required
            );
        }
    }
}

fn unmapped(name: &str, out: &mut FlattenedRows, warned: &mut HashSet<String>) {
    out.stats.unmapped += 1;
    if warned.insert(name.to_string()) {
        warn!(attribute = name, "Attribute is not in the attribute map, skipping");
    }
}

fn scalar_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn sequence_number(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
