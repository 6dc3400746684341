//! Job types
//!
//! Declarative preload job definition for YAML parsing.

use crate::flatten::AttributeMap;
use crate::normalize::TargetSchema;
use crate::sink::ColumnDef;
use crate::source::amqp::AmqpConfig;
use crate::source::osipi::{PiConnection, PiElementsConfig, PiPointsConfig};
use crate::source::{CsvSourceConfig, HttpSourceConfig};
use crate::types::JsonValue;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Job Definition
// ============================================================================

/// Top-level job definition
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct JobDefinition {
    /// Job name, also the source name in logs and the default device type
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,
    /// Where readings come from
    pub source: SourceDefinition,
    /// How rows are shaped
    #[serde(default)]
    pub target: TargetDefinition,
    /// Where rows go
    pub sink: SinkDefinition,
    /// Where cursors are kept
    pub cursors: CursorDefinition,
    /// Variables available to `{{ vars.* }}` templates
    #[serde(default)]
    pub vars: JsonValue,
}

// ============================================================================
// Source Definition
// ============================================================================

/// Source definition, tagged by `type`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceDefinition {
    /// Event hub over AMQP
    Amqp(AmqpConfig),
    /// PI points matching a name filter
    OsipiPoints(PiPointsConfig),
    /// Children of a PI AF element
    OsipiElements(PiElementsConfig),
    /// JSON endpoint
    Http(HttpSourceConfig),
    /// Local CSV file
    Csv(CsvSourceConfig),
}

impl SourceDefinition {
    /// Source kind as reported by the adapter
    pub fn kind(&self) -> &'static str {
        match self {
            SourceDefinition::Amqp(_) => "amqp",
            SourceDefinition::OsipiPoints(_) => "osipi_points",
            SourceDefinition::OsipiElements(_) => "osipi_elements",
            SourceDefinition::Http(_) => "http",
            SourceDefinition::Csv(_) => "csv",
        }
    }

    /// PI server connection, for OSI-Pi sources
    pub fn pi_connection(&self) -> Option<&PiConnection> {
        match self {
            SourceDefinition::OsipiPoints(config) => Some(&config.connection),
            SourceDefinition::OsipiElements(config) => Some(&config.connection),
            _ => None,
        }
    }
}

// ============================================================================
// Target Definition
// ============================================================================

/// Row shaping
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TargetDefinition {
    /// Sink columns, for sinks that cannot report their own
    #[serde(default)]
    pub columns: Vec<String>,
    /// Column roles
    #[serde(default)]
    pub schema: TargetSchema,
    /// Device-type label, defaults to the job name
    #[serde(default)]
    pub device_type: Option<String>,
    /// Event-type label
    #[serde(default)]
    pub event_type: Option<String>,
    /// Inline attribute map
    #[serde(default)]
    pub attributes: Option<AttributeMap>,
    /// JSON attribute map file
    #[serde(default)]
    pub attributes_file: Option<PathBuf>,
}

// ============================================================================
// Sink Definition
// ============================================================================

/// Sink definition, tagged by `type`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkDefinition {
    /// DuckDB table
    Duckdb {
        /// Database file
        path: PathBuf,
        /// Table name
        table: String,
        /// Create the table with these columns if it does not exist
        #[serde(default)]
        create: Option<Vec<ColumnDef>>,
    },
    /// Parquet file in a directory
    Parquet {
        /// Output directory
        dir: PathBuf,
        /// Table name, used as file name
        table: String,
        /// Columns; defaults to `target.columns`
        #[serde(default)]
        columns: Vec<String>,
    },
    /// In-memory table, discarded at exit
    Memory {
        /// Table name
        #[serde(default = "default_memory_table")]
        table: String,
    },
}

fn default_memory_table() -> String {
    "preload".to_string()
}

impl SinkDefinition {
    /// Table name
    pub fn table(&self) -> &str {
        match self {
            SinkDefinition::Duckdb { table, .. }
            | SinkDefinition::Parquet { table, .. }
            | SinkDefinition::Memory { table } => table,
        }
    }
}

// ============================================================================
// Cursor Definition
// ============================================================================

/// Cursor store location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorDefinition {
    /// JSON cursor file
    pub path: PathBuf,
}
