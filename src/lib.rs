// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # IoT Preload
//!
//! Incremental fetch-and-normalize pipeline for IoT time-series.
//!
//! Each preload cycle reads the last-seen cursor for one logical source,
//! fetches everything newer from the source, merges the readings into one
//! row per (device, timestamp), reconciles the rows against the sink's
//! required columns, writes them, and only then advances the cursor.
//!
//! ## Sources
//!
//! - **AMQP event hub**: Azure IoT Hub event-hub compatible endpoint, SAS auth
//! - **OSI-Pi Points**: PI Web API points matching a name filter
//! - **OSI-Pi Elements**: child elements of an AF parent element
//! - **HTTP**: any JSON endpoint
//! - **CSV**: local files, one device per file
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use iot_preload::job::{load_job, JobBuilder};
//!
//! #[tokio::main]
//! async fn main() -> iot_preload::Result<()> {
//!     let job = load_job("jobs/boiler-elements.yaml")?;
//!     let orchestrator = JobBuilder::new(&job).build().await?;
//!
//!     let report = orchestrator.run_cycle().await?;
//!     println!("wrote data: {}", report.wrote_data());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       PreloadOrchestrator                        │
//! │  FETCH → FLATTEN → NORMALIZE → WRITE → ADVANCE_CURSOR → DONE     │
//! └──────────────────────────────────────────────────────────────────┘
//!                                 │
//! ┌───────────┬───────────┬───────┴───────┬────────────┬────────────┐
//! │  Source   │ Flattener │  Normalizer   │    Sink    │   Cursor   │
//! ├───────────┼───────────┼───────────────┼────────────┼────────────┤
//! │ AMQP      │ Attribute │ Required cols │ DuckDB     │ JSON file  │
//! │ OSI-Pi    │ map       │ Defaults      │ Parquet    │ In-memory  │
//! │ HTTP, CSV │ Merge     │ Dedup by key  │ Memory     │            │
//! └───────────┴───────────┴───────────────┴────────────┴────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(missing_docs)] // TODO: Add docs before 1.0 release

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// Authentication and SAS token generation
pub mod auth;

/// HTTP client with retry and rate limiting
pub mod http;

/// Body decoders (JSON, JSONL, CSV, event payloads)
pub mod decode;

/// Cursor values and persistence
pub mod cursor;

/// Source adapters
pub mod source;

/// Merging of raw readings into keyed rows
pub mod flatten;

/// Reconciliation of rows against the sink schema
pub mod normalize;

/// Sinks for normalized tables
pub mod sink;

/// Preload cycle orchestration
pub mod engine;

/// YAML job definitions
pub mod job;

/// Template interpolation
pub mod template;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

pub use cursor::{Cursor, CursorKind, CursorStore, FileCursorStore};
pub use engine::{CycleOutcome, CycleReport, PreloadOrchestrator};
pub use job::{load_job, load_job_from_str, JobBuilder, JobDefinition};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
