//! CSV file source
//!
//! Reads a whole CSV file every cycle. The device id defaults to the file
//! stem. With `rebase` the timestamps are shifted so the newest row lands at
//! the current time, which makes a static file usable as a live feed; the
//! cursor is ignored in that mode since every cycle produces new timestamps.

use crate::cursor::{Cursor, CursorKind};
use crate::decode::{CsvDecoder, RecordDecoder};
use crate::error::{Error, Result};
use crate::normalize::parse_timestamp;
use crate::source::types::{CheckResult, Fetch, RawRecord, RecordLayout, SourceAdapter};
use crate::types::JsonValue;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

/// CSV source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvSourceConfig {
    /// CSV file
    pub path: PathBuf,

    /// Column holding the timestamp
    #[serde(default = "default_date_field")]
    pub date_field: String,

    /// Device id, defaults to the file stem
    #[serde(default)]
    pub device_id: Option<String>,

    /// Shift timestamps so the newest row is at the current time
    #[serde(default)]
    pub rebase: bool,

    /// Field delimiter
    #[serde(default)]
    pub delimiter: Option<char>,

    /// Fields a row must carry to be kept
    #[serde(default)]
    pub required_fields: Vec<String>,
}

fn default_date_field() -> String {
    "Date".to_string()
}

impl CsvSourceConfig {
    /// Read `path` with defaults
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            date_field: default_date_field(),
            device_id: None,
            rebase: false,
            delimiter: None,
            required_fields: Vec::new(),
        }
    }

    /// File name without extension
    pub fn file_stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// CSV source adapter
#[derive(Debug)]
pub struct CsvSource {
    name: String,
    config: CsvSourceConfig,
    layout: RecordLayout,
}

impl CsvSource {
    /// Create a CSV source
    pub fn new(name: impl Into<String>, config: CsvSourceConfig) -> Result<Self> {
        let device = config
            .device_id
            .clone()
            .unwrap_or_else(|| config.file_stem());
        if device.is_empty() {
            return Err(Error::config(format!(
                "Cannot derive a device id from {}",
                config.path.display()
            )));
        }

        let layout = RecordLayout::new(&config.date_field)
            .with_fixed_device(device)
            .require(config.required_fields.iter().cloned());

        Ok(Self {
            name: name.into(),
            config,
            layout,
        })
    }

    async fn read_rows(&self) -> Result<(Vec<JsonValue>, usize)> {
        let body = tokio::fs::read_to_string(&self.config.path)
            .await
            .map_err(|e| {
                Error::unavailable(
                    &self.name,
                    format!("Cannot read {}: {e}", self.config.path.display()),
                )
            })?;

        let decoder = CsvDecoder::with_options(self.config.delimiter.unwrap_or(','), true);
        let decoded = decoder.decode_lenient(&body)?;
        Ok((decoded.records, decoded.malformed))
    }

    async fn fetch_at(&self, since: Option<&Cursor>, now: DateTime<Utc>) -> Result<Fetch> {
        let (mut rows, malformed) = self.read_rows().await?;
        info!(
            source = %self.name,
            "Read {} rows from {}",
            rows.len(),
            self.config.path.display()
        );

        let cutoff = if self.config.rebase {
            rebase_rows(&mut rows, &self.config.date_field, now);
            None
        } else {
            since.and_then(Cursor::as_timestamp)
        };

        let mut fetch = Fetch::new(Vec::new(), malformed);
        for row in rows {
            let JsonValue::Object(record) = row else {
                fetch.malformed += 1;
                continue;
            };
            if let Some(cutoff) = cutoff {
                let ts = record.get(&self.config.date_field).and_then(parse_timestamp);
                if ts.is_some_and(|ts| ts <= cutoff) {
                    continue;
                }
            }
            fetch.records.push(RawRecord::Event(record));
        }

        if fetch.malformed > 0 {
            warn!(source = %self.name, "Dropped {} malformed rows", fetch.malformed);
        }
        Ok(fetch)
    }
}

/// Shift the `field` timestamps of `rows` so the newest one equals `now`.
/// Unparseable timestamps are left alone.
pub(crate) fn rebase_rows(rows: &mut [JsonValue], field: &str, now: DateTime<Utc>) {
    let newest = rows
        .iter()
        .filter_map(|row| row.get(field).and_then(parse_timestamp))
        .max();
    let Some(newest) = newest else {
        return;
    };

    let delta = now - newest;
    info!("Rebasing timestamps by {delta}");

    for row in rows.iter_mut() {
        let Some(ts) = row.get(field).and_then(parse_timestamp) else {
            continue;
        };
        if let Some(record) = row.as_object_mut() {
            let shifted = (ts + delta).to_rfc3339_opts(SecondsFormat::Micros, true);
            record.insert(field.to_string(), JsonValue::String(shifted));
        }
    }
}

#[async_trait]
impl SourceAdapter for CsvSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "csv"
    }

    fn cursor_key(&self) -> String {
        format!("csv_{}", self.config.file_stem().to_lowercase())
    }

    fn cursor_kind(&self) -> CursorKind {
        CursorKind::Timestamp
    }

    fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    async fn fetch(&self, since: Option<&Cursor>) -> Result<Fetch> {
        self.fetch_at(since, Utc::now()).await
    }

    async fn check(&self) -> Result<CheckResult> {
        match tokio::fs::metadata(&self.config.path).await {
            Ok(meta) if meta.is_file() => Ok(CheckResult::success(format!(
                "{} ({} bytes)",
                self.config.path.display(),
                meta.len()
            ))),
            Ok(_) => Ok(CheckResult::failure(format!(
                "{} is not a file",
                self.config.path.display()
            ))),
            Err(e) => Ok(CheckResult::failure(format!(
                "{}: {e}",
                self.config.path.display()
            ))),
        }
    }
}
