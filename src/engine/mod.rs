//! Execution engine module
//!
//! One preload cycle, run as a small state machine.
//!
//! # Overview
//!
//! The engine module provides:
//! - `PreloadOrchestrator` - Fetch, flatten, normalize, write, advance cursor
//! - `CycleReport` - What a cycle did, serializable for the CLI
//! - `CycleOutcome` - Rows written, or why nothing was written
//!
//! ```text
//! FETCH → FLATTEN → NORMALIZE → WRITE → ADVANCE_CURSOR → DONE
//!   └──────────────────┴──→ EMPTY          (any) ──→ FAILED
//! ```
//!
//! The cursor is written only after the sink accepted the rows. A failed
//! cycle leaves it where it was, so the next cycle refetches the same range
//! and the sink's (device, timestamp) upsert absorbs the overlap.

mod types;

pub use types::{CycleOutcome, CycleReport, CycleState, CycleStats, EmptyReason};

use crate::cursor::{Cursor, CursorStore};
use crate::error::{Error, Result};
use crate::flatten::{AttributeMap, Flattener};
use crate::normalize::{TableNormalizer, TargetSchema};
use crate::sink::Sink;
use crate::source::SourceAdapter;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Runs preload cycles for one source and one sink
pub struct PreloadOrchestrator {
    source: Arc<dyn SourceAdapter>,
    sink: Arc<dyn Sink>,
    store: Arc<dyn CursorStore>,
    flattener: Flattener,
    schema: TargetSchema,
    device_type: Option<String>,
    event_type: Option<String>,
    dry_run: bool,
}

impl PreloadOrchestrator {
    /// Create an orchestrator with an identity attribute map and the
    /// default target schema
    pub fn new(
        source: Arc<dyn SourceAdapter>,
        sink: Arc<dyn Sink>,
        store: Arc<dyn CursorStore>,
    ) -> Self {
        Self {
            source,
            sink,
            store,
            flattener: Flattener::default(),
            schema: TargetSchema::default(),
            device_type: None,
            event_type: None,
            dry_run: false,
        }
    }

    /// Map source names to (device, attribute)
    #[must_use]
    pub fn with_attribute_map(mut self, map: AttributeMap) -> Self {
        self.flattener = Flattener::new(map);
        self
    }

    /// Set the target schema
    #[must_use]
    pub fn with_schema(mut self, schema: TargetSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Device-type label; defaults to the source name
    #[must_use]
    pub fn with_device_type(mut self, label: impl Into<String>) -> Self {
        self.device_type = Some(label.into());
        self
    }

    /// Event-type label for rows that carry none
    #[must_use]
    pub fn with_event_type(mut self, label: impl Into<String>) -> Self {
        self.event_type = Some(label.into());
        self
    }

    /// Never write the cursor
    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Get the source
    pub fn source(&self) -> &Arc<dyn SourceAdapter> {
        &self.source
    }

    /// Get the sink
    pub fn sink(&self) -> &Arc<dyn Sink> {
        &self.sink
    }

    /// Get the cursor store
    pub fn store(&self) -> &Arc<dyn CursorStore> {
        &self.store
    }

    /// Run one cycle now
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run one cycle with `now` as the cycle time
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        let start = Instant::now();
        let mut report = CycleReport {
            source: self.source.name().to_string(),
            states: Vec::new(),
            outcome: CycleOutcome::Empty {
                reason: EmptyReason::NoRecords,
            },
            stats: CycleStats::default(),
            cursor_before: None,
            cursor_after: None,
            dry_run: self.dry_run,
        };

        let result = self.drive(&mut report, now).await;
        report.stats.duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(()) => {
                info!(
                    source = %report.source,
                    outcome = ?report.outcome,
                    cursor = ?report.cursor_after,
                    duration_ms = report.stats.duration_ms,
                    "Cycle finished"
                );
                Ok(report)
            }
            Err(e) => {
                report.states.push(CycleState::Failed);
                let trail: Vec<String> = report.states.iter().map(ToString::to_string).collect();
                error!(
                    source = %report.source,
                    states = %trail.join(" → "),
                    error = %e,
                    "Cycle failed; cursor not advanced"
                );
                Err(e)
            }
        }
    }

    async fn drive(&self, report: &mut CycleReport, now: DateTime<Utc>) -> Result<()> {
        let key = self.source.cursor_key();

        // FETCH
        report.states.push(CycleState::Fetch);
        let before = self.store.get(&key, self.source.default_cursor()).await?;
        report.cursor_before = before.clone();
        report.cursor_after = before.clone();

        let fetch = self
            .source
            .fetch(before.as_ref())
            .await
            .map_err(|e| e.at_source(self.source.name()))?;
        report.stats.fetched = fetch.records.len();
        report.stats.malformed = fetch.malformed;
        if fetch.malformed > 0 {
            warn!(source = %report.source, malformed = fetch.malformed, "Dropped malformed records");
        }
        if fetch.is_empty() {
            debug!(source = %report.source, cursor = ?before, "No new records");
            report.states.push(CycleState::Empty);
            return Ok(());
        }

        // FLATTEN
        report.states.push(CycleState::Flatten);
        let flattened = self.flattener.flatten(fetch.records, self.source.layout());
        report.stats.add_flatten(&flattened.stats);

        // NORMALIZE
        report.states.push(CycleState::Normalize);
        let required = self.sink.required_columns().await?;
        if required.is_empty() {
            return Err(Error::schema_mismatch(format!(
                "Sink '{}' has no columns",
                self.sink.name()
            )));
        }
        let table = self.normalizer().normalize(
            flattened.into_rows(),
            &required,
            self.source.cursor_kind(),
            now,
        );
        report.stats.add_normalize(&table.stats);
        if table.is_empty() {
            report.outcome = CycleOutcome::Empty {
                reason: EmptyReason::NoRows,
            };
            report.states.push(CycleState::Empty);
            return Ok(());
        }

        // WRITE
        report.states.push(CycleState::Write);
        let rows = self.sink.write(&table).await?;
        report.stats.rows = rows;
        report.outcome = CycleOutcome::Written { rows };

        // ADVANCE_CURSOR
        report.states.push(CycleState::AdvanceCursor);
        let advanced = Cursor::advance(before.as_ref(), table.cursor_candidate.clone())
            .filter(|next| before.as_ref() != Some(next));
        if let Some(next) = advanced {
            if self.dry_run {
                info!(key = %key, cursor = %next, "Dry run; cursor not stored");
            } else {
                self.store.put(&key, next.clone()).await?;
                debug!(key = %key, cursor = %next, "Advanced cursor");
                report.cursor_after = Some(next);
            }
        }

        report.states.push(CycleState::Done);
        Ok(())
    }

    fn normalizer(&self) -> TableNormalizer {
        let device_type = self
            .device_type
            .clone()
            .unwrap_or_else(|| self.source.name().to_string());
        let normalizer = TableNormalizer::new(self.schema.clone()).with_device_type(device_type);
        match &self.event_type {
            Some(label) => normalizer.with_event_type(label.clone()),
            None => normalizer,
        }
    }
}

impl std::fmt::Debug for PreloadOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreloadOrchestrator")
            .field("source", &self.source.name())
            .field("sink", &self.sink.name())
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}
