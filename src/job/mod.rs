//! Job module
//!
//! Parse preload jobs from YAML files and turn them into a ready
//! orchestrator.
//!
//! # Overview
//!
//! The job module provides:
//! - `JobDefinition` - Source, target, sink and cursor store of one preload
//! - YAML parsing with `{{ env.* }}` / `{{ vars.* }}` templates and validation
//! - `JobBuilder` - Builds the adapter, sink and cursor store
//!
//! ```yaml
//! name: boiler
//! source:
//!   type: osipi_points
//!   host: pi.example.com
//!   username: "{{ env.PI_USER }}"
//!   password: "{{ env.PI_PASSWORD }}"
//!   name_filter: "Boiler*"
//! target:
//!   attributes_file: boiler_points.json
//! sink:
//!   type: duckdb
//!   path: metrics.duckdb
//!   table: boiler_metrics
//! cursors:
//!   path: cursors.json
//! ```

mod builder;
mod parser;
mod types;

pub use builder::JobBuilder;
pub use parser::{load_job, load_job_from_str, load_job_with_context, validate_job};
pub use types::{
    CursorDefinition, JobDefinition, SinkDefinition, SourceDefinition, TargetDefinition,
};
