//! DuckDB sink
//!
//! Rows are upserted by (device, timestamp) in one transaction. Tables with a
//! primary key use `INSERT OR REPLACE`; tables without one get a delete of the
//! row's key before each insert.

use super::types::{is_identifier, quote_ident, ColumnDef, Sink};
use crate::error::{Error, Result};
use crate::normalize::{parse_timestamp_str, NormalizedTable};
use crate::types::JsonValue;
use async_trait::async_trait;
use duckdb::types::{TimeUnit, Value};
use duckdb::{params, params_from_iter, Connection};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

/// DuckDB table sink
pub struct DuckDbSink {
    table: String,
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

impl DuckDbSink {
    /// Open (or create) the database file at `path`
    pub fn open(path: impl AsRef<Path>, table: impl Into<String>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            Error::config(format!("Failed to open DuckDB {}: {e}", path.display()))
        })?;
        Self::with_connection(conn, table, Some(path.to_path_buf()))
    }

    /// In-memory database
    pub fn in_memory(table: impl Into<String>) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::config(format!("Failed to create DuckDB connection: {e}")))?;
        Self::with_connection(conn, table, None)
    }

    fn with_connection(
        conn: Connection,
        table: impl Into<String>,
        path: Option<PathBuf>,
    ) -> Result<Self> {
        let table = table.into();
        if !is_identifier(&table) {
            return Err(Error::invalid_value(
                "table",
                format!("'{table}' is not an identifier"),
            ));
        }
        Ok(Self {
            table,
            path,
            conn: Mutex::new(conn),
        })
    }

    /// Database file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Create the table if it does not exist, keyed by (device, timestamp)
    pub fn create_table(
        &self,
        columns: &[ColumnDef],
        device: &str,
        timestamp: &str,
    ) -> Result<()> {
        if let Some(bad) = columns.iter().find(|c| !is_identifier(&c.name)) {
            return Err(Error::invalid_value(
                "columns",
                format!("'{}' is not an identifier", bad.name),
            ));
        }
        for key in [device, timestamp] {
            if !columns.iter().any(|c| c.name.eq_ignore_ascii_case(key)) {
                return Err(Error::missing_field(format!("columns.{key}")));
            }
        }

        let defs: Vec<String> = columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.sql_type))
            .collect();
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({}, PRIMARY KEY ({}, {}))",
            quote_ident(&self.table),
            defs.join(", "),
            quote_ident(device),
            quote_ident(timestamp)
        );
        debug!("Executing: {}", sql);

        self.conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .execute_batch(&sql)?;
        info!(table = %self.table, "Ensured table exists");
        Ok(())
    }

    /// Column names and types, lower-cased names as keys
    fn column_types(conn: &Connection, table: &str) -> Result<Vec<(String, String)>> {
        let mut stmt = conn.prepare(
            "SELECT column_name, data_type FROM information_schema.columns \
             WHERE lower(table_name) = lower(?) ORDER BY ordinal_position",
        )?;
        let columns = stmt
            .query_map(params![table], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<(String, String)>, _>>()?;

        if columns.is_empty() {
            return Err(Error::schema_mismatch(format!("Table '{table}' does not exist")));
        }
        Ok(columns)
    }

    fn has_primary_key(conn: &Connection, table: &str) -> Result<bool> {
        let count: i64 = conn.query_row(
            "SELECT count(*) FROM duckdb_constraints() \
             WHERE lower(table_name) = lower(?) AND constraint_type = 'PRIMARY KEY'",
            params![table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn write_rows(&self, table: &NormalizedTable) -> Result<usize> {
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let keyed = Self::has_primary_key(&conn, &self.table)?;
        let types: HashMap<String, String> = Self::column_types(&conn, &self.table)?
            .into_iter()
            .map(|(name, ty)| (name.to_lowercase(), ty.to_uppercase()))
            .collect();
        let sql_type =
            |column: &str| types.get(&column.to_lowercase()).map_or("", String::as_str);

        let target = quote_ident(&self.table);
        let column_list: Vec<String> = table.columns.iter().map(|c| quote_ident(c)).collect();
        let placeholders = vec!["?"; table.columns.len()].join(", ");
        let delete_sql = format!(
            "DELETE FROM {target} WHERE {} = ? AND {} = ?",
            quote_ident(&table.device_column),
            quote_ident(&table.timestamp_column)
        );
        let insert_sql = format!(
            "INSERT {}INTO {target} ({}) VALUES ({placeholders})",
            if keyed { "OR REPLACE " } else { "" },
            column_list.join(", ")
        );

        let tx = conn.transaction()?;
        {
            let mut delete = tx.prepare(&delete_sql)?;
            let mut insert = tx.prepare(&insert_sql)?;

            for row in &table.rows {
                if !keyed {
                    let key_ts = row
                        .values
                        .get(&table.timestamp_column)
                        .unwrap_or(&JsonValue::Null);
                    delete.execute(params_from_iter([
                        Value::Text(row.device.clone()),
                        to_sql_value(key_ts, sql_type(&table.timestamp_column)),
                    ]))?;
                }

                let values = table.columns.iter().map(|column| {
                    let value = row.values.get(column).unwrap_or(&JsonValue::Null);
                    to_sql_value(value, sql_type(column))
                });
                insert.execute(params_from_iter(values))?;
            }
        }
        tx.commit()?;

        Ok(table.len())
    }
}

/// DuckDB value for a JSON value written to a column of `sql_type`
fn to_sql_value(value: &JsonValue, sql_type: &str) -> Value {
    match value {
        JsonValue::Null => Value::Null,
        JsonValue::String(s) if sql_type.starts_with("TIMESTAMP") => {
            match parse_timestamp_str(s) {
                Some(ts) => Value::Timestamp(TimeUnit::Microsecond, ts.timestamp_micros()),
                None => Value::Null,
            }
        }
        JsonValue::String(s) => Value::Text(s.clone()),
        JsonValue::Bool(b) => Value::Boolean(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Value::BigInt(i),
            None => n.as_f64().map_or(Value::Null, Value::Double),
        },
        other => Value::Text(other.to_string()),
    }
}

impl std::fmt::Debug for DuckDbSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDbSink")
            .field("table", &self.table)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Sink for DuckDbSink {
    fn name(&self) -> &str {
        &self.table
    }

    async fn required_columns(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(Self::column_types(&conn, &self.table)?
            .into_iter()
            .map(|(name, _)| name)
            .collect())
    }

    async fn write(&self, table: &NormalizedTable) -> Result<usize> {
        if table.is_empty() {
            return Ok(0);
        }
        let written = self
            .write_rows(table)
            .map_err(|e| Error::write_failure(&self.table, e.to_string()))?;
        info!(table = %self.table, rows = written, "Upserted rows");
        Ok(written)
    }
}
