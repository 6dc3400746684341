//! Flattener module
//!
//! Turns a source's raw records into rows keyed by (timestamp, device).
//!
//! # Overview
//!
//! - `AttributeMap` - source attribute name → (device, attribute); empty is
//!   the identity
//! - `Flattener` - merges readings sharing a key into one row
//! - `FlattenedRows` - the keyed rows plus counters
//!
//! Readings whose attribute is not in a non-empty map are dropped with a
//! warning, never written under a guessed name.

mod flattener;
mod types;

pub use flattener::Flattener;
pub use types::{AttributeMap, AttributeTarget, FlattenStats, FlattenedRow, FlattenedRows, RowKey};

#[cfg(test)]
mod tests;
