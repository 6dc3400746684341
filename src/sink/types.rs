//! Sink types

use crate::error::Result;
use crate::normalize::NormalizedTable;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Destination of normalized rows
#[async_trait]
pub trait Sink: Send + Sync {
    /// Table name
    fn name(&self) -> &str;

    /// Columns every written row must have
    async fn required_columns(&self) -> Result<Vec<String>>;

    /// Write `table`, replacing rows with the same (device, timestamp).
    ///
    /// Any failure is a `WriteFailure`; nothing is written in that case.
    async fn write(&self, table: &NormalizedTable) -> Result<usize>;
}

/// Column of a table created by a sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name
    pub name: String,
    /// SQL type (`VARCHAR`, `DOUBLE`, `TIMESTAMP`, ...)
    #[serde(rename = "type", default = "default_column_type")]
    pub sql_type: String,
}

fn default_column_type() -> String {
    "VARCHAR".to_string()
}

impl ColumnDef {
    /// Create a column definition
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
        }
    }
}

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

/// Check whether `name` can be used as a table or column name
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Double-quoted SQL identifier
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
