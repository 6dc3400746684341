//! Sink module
//!
//! Destinations for normalized tables.
//!
//! # Overview
//!
//! - `DuckDbSink` - upserts into a DuckDB table keyed by (device, timestamp)
//! - `ParquetSink` - one Parquet file per table, upserted on each write
//! - `MemorySink` - in-memory upserts for dry runs and tests
//!
//! Required columns come from the sink: DuckDB reads them from
//! `information_schema`, the other sinks are configured with them.

mod batch;
mod database;
mod file;
mod memory;
mod types;

pub use batch::{batch_to_rows, table_schema, table_to_batch};
pub use database::DuckDbSink;
pub use file::ParquetSink;
pub use memory::MemorySink;
pub use types::{is_identifier, ColumnDef, Sink};
