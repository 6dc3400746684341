//! Engine types
//!
//! States, outcome and report of one preload cycle.

use crate::cursor::Cursor;
use crate::flatten::FlattenStats;
use crate::normalize::NormalizeStats;
use serde::Serialize;
use std::fmt;

/// Step of a preload cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleState {
    /// Reading records newer than the cursor
    Fetch,
    /// Merging readings into rows
    Flatten,
    /// Shaping rows to the sink's columns
    Normalize,
    /// Handing the table to the sink
    Write,
    /// Persisting the new cursor
    AdvanceCursor,
    /// Rows written
    Done,
    /// Nothing to write
    Empty,
    /// Source or sink error
    Failed,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleState::Fetch => "FETCH",
            CycleState::Flatten => "FLATTEN",
            CycleState::Normalize => "NORMALIZE",
            CycleState::Write => "WRITE",
            CycleState::AdvanceCursor => "ADVANCE_CURSOR",
            CycleState::Done => "DONE",
            CycleState::Empty => "EMPTY",
            CycleState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Why a cycle wrote nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyReason {
    /// The source returned no records
    NoRecords,
    /// Records were returned but no row survived flattening and normalizing
    NoRows,
}

/// How a successful cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Rows were accepted by the sink
    Written {
        /// Rows written
        rows: usize,
    },
    /// No data this cycle
    Empty {
        /// Why nothing was written
        reason: EmptyReason,
    },
}

/// Counters of one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleStats {
    /// Records returned by the source
    pub fetched: usize,
    /// Records the source could not read
    pub malformed: usize,
    /// Readings whose name is not in the attribute map
    pub unmapped: usize,
    /// Events without a timestamp or device
    pub missing_key: usize,
    /// Rows lacking a required field
    pub missing_required: usize,
    /// Rows whose device id was empty after sanitizing
    pub dropped_devices: usize,
    /// Rows with an unparseable timestamp
    pub unparseable_timestamps: usize,
    /// Source columns the sink does not have
    pub dropped_columns: Vec<String>,
    /// Rows handed to the sink
    pub rows: usize,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl CycleStats {
    /// Add flattener counters
    pub fn add_flatten(&mut self, stats: &FlattenStats) {
        self.unmapped += stats.unmapped;
        self.missing_key += stats.missing_key;
        self.missing_required += stats.missing_required;
    }

    /// Add normalizer counters
    pub fn add_normalize(&mut self, stats: &NormalizeStats) {
        self.dropped_devices += stats.dropped_devices;
        self.unparseable_timestamps += stats.unparseable_timestamps;
        self.dropped_columns
            .extend(stats.dropped_columns.iter().cloned());
    }
}

/// Result of one successful cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    /// Source name
    pub source: String,
    /// States visited, in order
    pub states: Vec<CycleState>,
    /// How the cycle ended
    pub outcome: CycleOutcome,
    /// Counters
    pub stats: CycleStats,
    /// Cursor read at the start of the cycle
    pub cursor_before: Option<Cursor>,
    /// Cursor stored at the end of the cycle
    pub cursor_after: Option<Cursor>,
    /// Whether the cursor was left untouched on purpose
    pub dry_run: bool,
}

impl CycleReport {
    /// Whether rows were written
    pub fn wrote_data(&self) -> bool {
        matches!(self.outcome, CycleOutcome::Written { rows } if rows > 0)
    }

    /// Whether the stored cursor moved
    pub fn cursor_advanced(&self) -> bool {
        self.cursor_before != self.cursor_after
    }
}
