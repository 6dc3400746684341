//! Parquet sink
//!
//! Keeps one file per table, `{table}.parquet`, in an output directory.
//! Each write merges the new rows into the rows already in the file, keyed
//! by (device, timestamp), and replaces the file through a temporary file
//! and a rename.

use super::batch::{batch_to_rows, table_to_batch};
use super::types::Sink;
use crate::error::{Error, Result};
use crate::normalize::{parse_timestamp, NormalizedRow, NormalizedTable};
use crate::types::JsonValue;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Parquet directory sink
#[derive(Debug, Clone)]
pub struct ParquetSink {
    table: String,
    dir: PathBuf,
    columns: Vec<String>,
    compression: Compression,
}

impl ParquetSink {
    /// Write the `table` file with `columns` into `dir`
    pub fn new(
        dir: impl Into<PathBuf>,
        table: impl Into<String>,
        columns: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            table: table.into(),
            dir: dir.into(),
            columns: columns.into_iter().collect(),
            compression: Compression::SNAPPY,
        }
    }

    /// Write uncompressed files
    #[must_use]
    pub fn uncompressed(mut self) -> Self {
        self.compression = Compression::UNCOMPRESSED;
        self
    }

    /// Output directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the table file
    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{}.parquet", self.table))
    }

    fn temp_path(&self) -> PathBuf {
        self.dir.join(format!(".{}.parquet.tmp", self.table))
    }

    /// Rows already in the table file, keyed like the upsert
    fn existing_rows(
        &self,
        table: &NormalizedTable,
    ) -> Result<BTreeMap<(String, DateTime<Utc>), NormalizedRow>> {
        let mut rows = BTreeMap::new();
        let path = self.path();
        if !path.exists() {
            return Ok(rows);
        }

        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&path)?)?.build()?;
        for batch in reader {
            for values in batch_to_rows(&batch?)? {
                let device = values
                    .get(&table.device_column)
                    .and_then(JsonValue::as_str)
                    .map(str::to_string);
                let timestamp = values.get(&table.timestamp_column).and_then(parse_timestamp);
                if let (Some(device), Some(timestamp)) = (device, timestamp) {
                    rows.insert(
                        (device.clone(), timestamp),
                        NormalizedRow {
                            device,
                            timestamp,
                            values,
                        },
                    );
                }
            }
        }
        Ok(rows)
    }

    /// Existing rows upserted with the rows of `table`
    fn merged(&self, table: &NormalizedTable) -> Result<NormalizedTable> {
        let mut rows = self.existing_rows(table)?;
        for row in &table.rows {
            rows.insert((row.device.clone(), row.timestamp), row.clone());
        }

        Ok(NormalizedTable {
            rows: rows.into_values().collect(),
            ..table.clone()
        })
    }

    fn write_file(&self, batch: &RecordBatch) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let temp = self.temp_path();
        let written = self
            .write_to(&temp, batch)
            .and_then(|()| std::fs::rename(&temp, self.path()).map_err(Error::from));
        if written.is_err() {
            let _ = std::fs::remove_file(&temp);
        }
        written
    }

    fn write_to(&self, path: &Path, batch: &RecordBatch) -> Result<()> {
        let props = WriterProperties::builder()
            .set_compression(self.compression)
            .build();

        let mut writer = ArrowWriter::try_new(File::create(path)?, batch.schema(), Some(props))?;
        writer.write(batch)?;
        writer.close()?;
        Ok(())
    }
}

#[async_trait]
impl Sink for ParquetSink {
    fn name(&self) -> &str {
        &self.table
    }

    async fn required_columns(&self) -> Result<Vec<String>> {
        Ok(self.columns.clone())
    }

    async fn write(&self, table: &NormalizedTable) -> Result<usize> {
        if table.is_empty() {
            return Ok(0);
        }

        let merged = self
            .merged(table)
            .and_then(|merged| {
                let batch = table_to_batch(&merged)?;
                self.write_file(&batch)?;
                Ok(merged)
            })
            .map_err(|e| Error::write_failure(&self.table, e.to_string()))?;

        debug!(table = %self.table, total = merged.len(), "Rewrote Parquet file");
        info!(table = %self.table, rows = table.len(), path = %self.path().display(), "Wrote Parquet file");
        Ok(table.len())
    }
}
