//! Decoder implementations
//!
//! Each decoder handles a specific body format.

use super::types::{Decoded, RecordDecoder};
use crate::error::{Error, Result};
use serde_json::{Map, Value};
use tracing::warn;

// ============================================================================
// JSON Decoder
// ============================================================================

/// JSON decoder with optional record path extraction
#[derive(Debug, Clone, Default)]
pub struct JsonDecoder {
    /// Path to the records array
    record_path: Option<String>,
}

impl JsonDecoder {
    /// Create a new JSON decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a JSON decoder with a record path
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            record_path: Some(path.into()),
        }
    }

    /// Extract records from a JSON value using the configured path
    pub fn extract_records(&self, value: &Value) -> Result<Vec<Value>> {
        match &self.record_path {
            Some(path) => {
                // jsonpath-rust only for wildcards, dotted paths are walked directly
                if path.contains('*') && !path.contains("[-") {
                    extract_with_jsonpath(value, path)
                } else {
                    match extract_simple_path(value, path) {
                        Some(Value::Array(arr)) => Ok(arr),
                        Some(v) => Ok(vec![v]),
                        None => Ok(vec![]),
                    }
                }
            }
            None => match value {
                Value::Array(arr) => Ok(arr.clone()),
                _ => Ok(vec![value.clone()]),
            },
        }
    }
}

impl RecordDecoder for JsonDecoder {
    fn decode(&self, body: &str) -> Result<Vec<Value>> {
        let value: Value = serde_json::from_str(body).map_err(|e| Error::Decode {
            message: format!("Failed to parse JSON: {e}"),
        })?;
        self.extract_records(&value)
    }
}

// ============================================================================
// JSONL Decoder
// ============================================================================

/// JSON Lines decoder (one JSON object per line)
#[derive(Debug, Clone, Default)]
pub struct JsonlDecoder;

impl JsonlDecoder {
    /// Create a new JSONL decoder
    pub fn new() -> Self {
        Self
    }
}

impl RecordDecoder for JsonlDecoder {
    fn decode(&self, body: &str) -> Result<Vec<Value>> {
        let mut records = Vec::new();

        for (line_num, line) in body.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let value: Value = serde_json::from_str(line).map_err(|e| Error::Decode {
                message: format!("Failed to parse JSONL at line {}: {e}", line_num + 1),
            })?;

            records.push(value);
        }

        Ok(records)
    }

    fn decode_lenient(&self, body: &str) -> Result<Decoded> {
        let mut decoded = Decoded::default();

        for (line_num, line) in body.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str(line) {
                Ok(value) => decoded.records.push(value),
                Err(e) => {
                    warn!(line = line_num + 1, "Skipping malformed JSONL record: {e}");
                    decoded.malformed += 1;
                }
            }
        }

        Ok(decoded)
    }
}

// ============================================================================
// CSV Decoder
// ============================================================================

/// CSV decoder with configurable delimiter and header handling
#[derive(Debug, Clone)]
pub struct CsvDecoder {
    /// Field delimiter
    delimiter: char,
    /// Whether the first row is a header
    has_header: bool,
}

impl Default for CsvDecoder {
    fn default() -> Self {
        Self {
            delimiter: ',',
            has_header: true,
        }
    }
}

impl CsvDecoder {
    /// Create a new CSV decoder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a CSV decoder with custom settings
    pub fn with_options(delimiter: char, has_header: bool) -> Self {
        Self {
            delimiter,
            has_header,
        }
    }

    fn headers<'a>(&self, lines: &mut std::iter::Peekable<std::str::Lines<'a>>) -> Vec<String> {
        if self.has_header {
            return lines
                .next()
                .map(|line| parse_csv_line(line, self.delimiter))
                .unwrap_or_default();
        }

        lines
            .peek()
            .map(|first| {
                let count = parse_csv_line(first, self.delimiter).len();
                (0..count).map(|i| format!("column_{i}")).collect()
            })
            .unwrap_or_default()
    }
}

impl RecordDecoder for CsvDecoder {
    fn decode(&self, body: &str) -> Result<Vec<Value>> {
        Ok(self.decode_lenient(body)?.records)
    }

    fn decode_lenient(&self, body: &str) -> Result<Decoded> {
        let mut decoded = Decoded::default();
        let mut lines = body.lines().peekable();
        let headers = self.headers(&mut lines);

        if headers.is_empty() {
            return Ok(decoded);
        }

        for (row_num, line) in lines.enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let fields = parse_csv_line(line, self.delimiter);
            if fields.len() > headers.len() {
                warn!(
                    row = row_num + 1,
                    "Skipping CSV row with {} fields, header has {}",
                    fields.len(),
                    headers.len()
                );
                decoded.malformed += 1;
                continue;
            }

            let mut obj = Map::new();
            for (i, header) in headers.iter().enumerate() {
                let value = fields.get(i).map(String::as_str).unwrap_or_default();
                obj.insert(header.clone(), parse_csv_value(value));
            }

            decoded.records.push(Value::Object(obj));
        }

        Ok(decoded)
    }
}

/// Parse a CSV line into fields
fn parse_csv_line(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '"' {
            if in_quotes {
                // Escaped quote
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                in_quotes = true;
            }
        } else if c == delimiter && !in_quotes {
            fields.push(current.trim().to_string());
            current = String::new();
        } else {
            current.push(c);
        }
    }

    fields.push(current.trim().to_string());
    fields
}

/// Parse a CSV value into JSON value
fn parse_csv_value(value: &str) -> Value {
    if let Ok(n) = value.parse::<i64>() {
        return Value::Number(n.into());
    }

    if let Ok(n) = value.parse::<f64>() {
        if let Some(num) = serde_json::Number::from_f64(n) {
            return Value::Number(num);
        }
    }

    match value.to_lowercase().as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    if value.is_empty()
        || value.eq_ignore_ascii_case("null")
        || value.eq_ignore_ascii_case("none")
        || value.eq_ignore_ascii_case("nan")
    {
        return Value::Null;
    }

    Value::String(value.to_string())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Extract a value using simple dot-notation path
fn extract_simple_path(value: &Value, path: &str) -> Option<Value> {
    let path = path.strip_prefix("$.").unwrap_or(path);
    let mut current = value;

    for part in path.split('.') {
        // Array indexing like "Items[0]" or "Items[-1]"
        if let Some(bracket_pos) = part.find('[') {
            let name = &part[..bracket_pos];
            let index_str = part[bracket_pos + 1..].trim_end_matches(']');

            if !name.is_empty() {
                current = current.get(name)?;
            }

            if index_str == "*" {
                return Some(current.clone());
            }

            let index = index_str.parse::<i64>().ok()?;
            let arr = current.as_array()?;
            #[allow(clippy::cast_possible_wrap)]
            let idx = if index < 0 {
                (arr.len() as i64 + index) as usize
            } else {
                index as usize
            };
            current = arr.get(idx)?;
        } else {
            current = current.get(part)?;
        }
    }

    Some(current.clone())
}

/// Extract records using jsonpath-rust
fn extract_with_jsonpath(value: &Value, path: &str) -> Result<Vec<Value>> {
    use jsonpath_rust::JsonPath;

    let jp = JsonPath::try_from(path).map_err(|e| Error::JsonPath {
        message: format!("Invalid JSONPath: {e}"),
    })?;

    match jp.find(value) {
        Value::Array(arr) => Ok(arr),
        Value::Null => Ok(vec![]),
        other => Ok(vec![other]),
    }
}
