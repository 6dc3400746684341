//! In-memory sink
//!
//! Upserts rows by (device, timestamp). Used by `run --dry-run` and tests.

use super::types::Sink;
use crate::error::{Error, Result};
use crate::normalize::{format_timestamp, NormalizedTable};
use crate::types::{JsonObject, JsonValue};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Sink keeping rows in memory
#[derive(Debug)]
pub struct MemorySink {
    name: String,
    columns: Vec<String>,
    rows: Mutex<BTreeMap<(String, String), JsonObject>>,
    writes: AtomicUsize,
    failing: AtomicBool,
}

impl MemorySink {
    /// Create a sink requiring `columns`
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Mutex::new(BTreeMap::new()),
            writes: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    /// Make every following write fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of successful writes
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Stored rows, sorted by (device, timestamp)
    pub fn rows(&self) -> Vec<JsonValue> {
        self.rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .map(JsonValue::Object)
            .collect()
    }

    /// Number of stored rows
    pub fn len(&self) -> usize {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Check whether no row is stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Sink for MemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn required_columns(&self) -> Result<Vec<String>> {
        Ok(self.columns.clone())
    }

    async fn write(&self, table: &NormalizedTable) -> Result<usize> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::write_failure(&self.name, "sink is set to fail"));
        }

        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        for row in &table.rows {
            let key = (row.device.clone(), format_timestamp(&row.timestamp));
            rows.insert(key, row.values.clone());
        }
        self.writes.fetch_add(1, Ordering::SeqCst);

        debug!(table = %self.name, rows = table.len(), total = rows.len(), "Stored rows");
        Ok(table.len())
    }
}
