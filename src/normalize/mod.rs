//! Normalizer module
//!
//! Turns flattened rows into a rectangular table whose columns are exactly
//! the sink's required columns, keyed by (device, timestamp).
//!
//! # Overview
//!
//! - `TargetSchema` - which sink columns hold the timestamp, device id,
//!   device type, event type and write time
//! - `TableNormalizer` - the reconciliation itself
//! - `parse_timestamp` / `sanitize_device` - value cleanup shared with the
//!   sources

mod normalizer;
mod timestamp;
mod types;

pub use normalizer::TableNormalizer;
pub use timestamp::{format_timestamp, parse_timestamp, parse_timestamp_str, sanitize_device};
pub use types::{NormalizeStats, NormalizedRow, NormalizedTable, TargetSchema};

#[cfg(test)]
mod tests;
