//! Cursor module
//!
//! Tracks the last-seen position of each logical source so a preload cycle
//! only fetches new data.
//!
//! # Overview
//!
//! - `Cursor` - Sequence number or timestamp, tagged
//! - `CursorStore` - get/put contract with auto-registration on first read
//! - `FileCursorStore` - JSON file persistence with atomic writes
//!
//! A cursor is read once at the start of a cycle and written once at the
//! end, and only after the sink accepted the rows.

mod store;
mod types;

pub use store::{CursorStore, FileCursorStore};
pub use types::{Cursor, CursorEntry, CursorFile, CursorKind};
