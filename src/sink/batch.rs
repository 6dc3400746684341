//! Normalized table to Arrow conversion
//!
//! Timestamp columns become UTC microsecond timestamps; every other column
//! gets the narrowest scalar type that holds all of its values.

use crate::error::{Error, Result};
use crate::normalize::{format_timestamp, parse_timestamp, NormalizedTable};
use crate::types::{JsonObject, JsonValue};
use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int64Array, NullArray, StringArray,
    TimestampMicrosecondArray,
};
use arrow::datatypes::{
    DataType, Field, Float64Type, Int64Type, Schema, TimeUnit, TimestampMicrosecondType,
};
use chrono::DateTime;
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

/// Arrow type of one JSON value
fn infer_type(value: &JsonValue) -> DataType {
    match value {
        JsonValue::Null => DataType::Null,
        JsonValue::Bool(_) => DataType::Boolean,
        JsonValue::Number(n) if n.is_i64() => DataType::Int64,
        JsonValue::Number(_) => DataType::Float64,
        _ => DataType::Utf8,
    }
}

/// Merge two data types into a compatible type
fn merge_types(type1: &DataType, type2: &DataType) -> DataType {
    match (type1, type2) {
        (a, b) if a == b => a.clone(),
        (DataType::Null, other) | (other, DataType::Null) => other.clone(),
        (DataType::Int64, DataType::Float64) | (DataType::Float64, DataType::Int64) => {
            DataType::Float64
        }
        _ => DataType::Utf8,
    }
}

/// Arrow schema of `table`
pub fn table_schema(table: &NormalizedTable) -> Schema {
    let fields: Vec<Field> = table
        .columns
        .iter()
        .map(|column| {
            let data_type = if table.is_timestamp_column(column) {
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
            } else {
                table
                    .rows
                    .iter()
                    .filter_map(|row| row.values.get(column))
                    .fold(DataType::Null, |acc, v| merge_types(&acc, &infer_type(v)))
            };
            let nullable = column != &table.device_column && column != &table.timestamp_column;
            Field::new(column, data_type, nullable)
        })
        .collect();

    Schema::new(fields)
}

/// Convert `table` to a record batch
pub fn table_to_batch(table: &NormalizedTable) -> Result<RecordBatch> {
    let schema = Arc::new(table_schema(table));

    let columns = schema
        .fields()
        .iter()
        .map(|field| {
            let values: Vec<Option<&JsonValue>> = table
                .rows
                .iter()
                .map(|row| row.values.get(field.name()))
                .collect();
            build_array(&values, field.data_type())
        })
        .collect::<Result<Vec<_>>>()?;

    RecordBatch::try_new(schema, columns)
        .map_err(|e| Error::write_failure("parquet", format!("Failed to create RecordBatch: {e}")))
}

fn build_array(values: &[Option<&JsonValue>], data_type: &DataType) -> Result<ArrayRef> {
    let array: ArrayRef = match data_type {
        DataType::Null => Arc::new(NullArray::new(values.len())),
        DataType::Boolean => Arc::new(
            values
                .iter()
                .map(|v| v.and_then(JsonValue::as_bool))
                .collect::<BooleanArray>(),
        ),
        DataType::Int64 => Arc::new(
            values
                .iter()
                .map(|v| v.and_then(JsonValue::as_i64))
                .collect::<Int64Array>(),
        ),
        DataType::Float64 => Arc::new(
            values
                .iter()
                .map(|v| v.and_then(JsonValue::as_f64))
                .collect::<Float64Array>(),
        ),
        DataType::Timestamp(TimeUnit::Microsecond, tz) => Arc::new(
            values
                .iter()
                .map(|v| v.and_then(parse_timestamp).map(|ts| ts.timestamp_micros()))
                .collect::<TimestampMicrosecondArray>()
                .with_timezone_opt(tz.clone()),
        ),
        _ => Arc::new(
            values
                .iter()
                .map(|v| match v {
                    None | Some(JsonValue::Null) => None,
                    Some(JsonValue::String(s)) => Some(s.clone()),
                    Some(other) => Some(other.to_string()),
                })
                .collect::<StringArray>(),
        ),
    };
    Ok(array)
}

/// Convert a record batch written by [`table_to_batch`] back to JSON rows
///
/// Timestamps come back as RFC 3339 strings.
pub fn batch_to_rows(batch: &RecordBatch) -> Result<Vec<JsonObject>> {
    let schema = batch.schema();
    let mut rows = vec![JsonObject::new(); batch.num_rows()];

    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        for (index, row) in rows.iter_mut().enumerate() {
            row.insert(field.name().clone(), array_value(column.as_ref(), index)?);
        }
    }
    Ok(rows)
}

fn array_value(array: &dyn Array, index: usize) -> Result<JsonValue> {
    if array.is_null(index) {
        return Ok(JsonValue::Null);
    }
    let value = match array.data_type() {
        DataType::Null => JsonValue::Null,
        DataType::Boolean => JsonValue::Bool(array.as_boolean().value(index)),
        DataType::Int64 => JsonValue::from(array.as_primitive::<Int64Type>().value(index)),
        DataType::Float64 => JsonValue::from(array.as_primitive::<Float64Type>().value(index)),
        DataType::Utf8 => JsonValue::String(array.as_string::<i32>().value(index).to_string()),
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            let micros = array.as_primitive::<TimestampMicrosecondType>().value(index);
            DateTime::from_timestamp_micros(micros)
                .map(|ts| JsonValue::String(format_timestamp(&ts)))
                .unwrap_or(JsonValue::Null)
        }
        other => {
            return Err(Error::schema_mismatch(format!(
                "Unsupported Parquet column type {other}"
            )))
        }
    };
    Ok(value)
}
