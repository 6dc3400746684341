//! Timestamp parsing and device id sanitizing

use crate::types::JsonValue;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

/// Epoch numbers above this are milliseconds
const EPOCH_MILLIS_THRESHOLD: f64 = 1e11;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

/// Parse a timestamp given as text or an epoch number
pub fn parse_timestamp(value: &JsonValue) -> Option<DateTime<Utc>> {
    match value {
        JsonValue::String(s) => parse_timestamp_str(s),
        JsonValue::Number(n) => n.as_f64().and_then(from_epoch),
        _ => None,
    }
}

/// Parse a timestamp string. Naive values are taken as UTC.
pub fn parse_timestamp_str(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }

    text.parse::<f64>().ok().and_then(from_epoch)
}

fn from_epoch(epoch: f64) -> Option<DateTime<Utc>> {
    if !epoch.is_finite() {
        return None;
    }
    let micros = if epoch.abs() > EPOCH_MILLIS_THRESHOLD {
        epoch * 1_000.0
    } else {
        epoch * 1_000_000.0
    };
    DateTime::from_timestamp_micros(micros.round() as i64)
}

/// Text form written to sinks: RFC 3339, microseconds, `Z`
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Remove characters the sink does not accept in device ids
pub fn sanitize_device(device: &str) -> String {
    device.chars().filter(|c| *c != ' ' && *c != '.').collect()
}
