//! Cursor types
//!
//! A cursor is the last-seen position of one logical source. Each source
//! kind uses exactly one representation, so values of different kinds are
//! never compared.

use crate::error::{Error, Result};
use crate::normalize::parse_timestamp_str;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Which cursor representation a source uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorKind {
    /// Integer sequence number
    Sequence,
    /// UTC timestamp
    Timestamp,
}

impl fmt::Display for CursorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CursorKind::Sequence => write!(f, "sequence"),
            CursorKind::Timestamp => write!(f, "timestamp"),
        }
    }
}

/// Last-seen position of a source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Cursor {
    /// Sequence number (event hub)
    Sequence(i64),
    /// Timestamp (historians, HTTP, CSV)
    Timestamp(DateTime<Utc>),
}

impl Cursor {
    /// The representation of this value
    pub fn kind(&self) -> CursorKind {
        match self {
            Cursor::Sequence(_) => CursorKind::Sequence,
            Cursor::Timestamp(_) => CursorKind::Timestamp,
        }
    }

    /// Sequence number, if this is a sequence cursor
    pub fn as_sequence(&self) -> Option<i64> {
        match self {
            Cursor::Sequence(n) => Some(*n),
            Cursor::Timestamp(_) => None,
        }
    }

    /// Timestamp, if this is a timestamp cursor
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Cursor::Timestamp(ts) => Some(*ts),
            Cursor::Sequence(_) => None,
        }
    }

    /// Parse a cursor of the given kind from text (CLI input)
    pub fn parse(kind: CursorKind, text: &str) -> Result<Self> {
        let text = text.trim();
        match kind {
            CursorKind::Sequence => text.parse::<i64>().map(Cursor::Sequence).map_err(|e| {
                Error::invalid_value("cursor", format!("'{text}' is not a sequence number: {e}"))
            }),
            CursorKind::Timestamp => parse_timestamp_str(text)
                .map(Cursor::Timestamp)
                .ok_or_else(|| {
                    Error::invalid_value("cursor", format!("'{text}' is not a timestamp"))
                }),
        }
    }

    /// Value to persist after a successful write.
    ///
    /// Returns `None` when the cursor must stay where it is: no candidate, or
    /// a candidate that is not ahead of `previous`.
    pub fn advance(previous: Option<&Cursor>, candidate: Option<Cursor>) -> Option<Cursor> {
        let candidate = candidate?;
        match previous {
            Some(prev) => match candidate.partial_cmp(prev) {
                Some(Ordering::Greater) => Some(candidate),
                Some(_) => None,
                // A kind change means the stored value predates the source's
                // current configuration; the new kind starts over.
                None => Some(candidate),
            },
            None => Some(candidate),
        }
    }
}

impl PartialOrd for Cursor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Cursor::Sequence(a), Cursor::Sequence(b)) => Some(a.cmp(b)),
            (Cursor::Timestamp(a), Cursor::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cursor::Sequence(n) => write!(f, "{n}"),
            Cursor::Timestamp(ts) => {
                write!(f, "{}", ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
            }
        }
    }
}

/// Stored state of one cursor key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorEntry {
    /// Current value, `None` until the first successful cycle
    #[serde(default)]
    pub cursor: Option<Cursor>,
    /// When the key was first read
    pub registered_at: DateTime<Utc>,
    /// When the value was last written
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CursorEntry {
    /// Register a key with its default value
    pub fn registered(cursor: Option<Cursor>) -> Self {
        Self {
            cursor,
            registered_at: Utc::now(),
            updated_at: None,
        }
    }
}

/// Persisted content of a cursor file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CursorFile {
    /// Entries by key
    #[serde(default)]
    pub cursors: BTreeMap<String, CursorEntry>,
}
