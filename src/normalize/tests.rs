//! Tests for the table normalizer

use super::*;
use crate::cursor::{Cursor, CursorKind};
use crate::flatten::FlattenedRow;
use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use test_case::test_case;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn row(ts: Value, device: &str, values: Value) -> FlattenedRow {
    let mut row = FlattenedRow::new(ts, device);
    if let Value::Object(values) = values {
        row.values = values;
    }
    row
}

fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| (*s).to_string()).collect()
}

// ============================================================================
// Timestamps and Devices
// ============================================================================

#[test_case("2024-03-01T10:00:00Z", Some("2024-03-01T10:00:00.000000Z"); "rfc3339 utc")]
#[test_case("2024-03-01T11:00:00+01:00", Some("2024-03-01T10:00:00.000000Z"); "rfc3339 offset")]
#[test_case("2024-03-01T10:00:00.1234567Z", Some("2024-03-01T10:00:00.123456Z"); "seven fraction digits")]
#[test_case("2024-03-01T10:00:00", Some("2024-03-01T10:00:00.000000Z"); "naive with t")]
#[test_case("2024-03-01 10:00:00.5", Some("2024-03-01T10:00:00.500000Z"); "naive with space")]
#[test_case("2024-03-01 10:00", Some("2024-03-01T10:00:00.000000Z"); "no seconds")]
#[test_case("2024-03-01", Some("2024-03-01T00:00:00.000000Z"); "date only")]
#[test_case("1709287200", Some("2024-03-01T10:00:00.000000Z"); "epoch seconds text")]
#[test_case("garbage", None; "garbage")]
#[test_case("", None; "empty")]
fn test_parse_timestamp_str(input: &str, expected: Option<&str>) {
    let parsed = parse_timestamp_str(input).map(|ts| format_timestamp(&ts));
    assert_eq!(parsed.as_deref(), expected);
}

#[test_case(json!(1_709_287_200), Some("2024-03-01T10:00:00.000000Z"); "epoch seconds")]
#[test_case(json!(1_709_287_200_250_i64), Some("2024-03-01T10:00:00.250000Z"); "epoch millis")]
#[test_case(json!(1_709_287_200.5), Some("2024-03-01T10:00:00.500000Z"); "fractional seconds")]
#[test_case(json!(null), None; "null")]
#[test_case(json!({"t": 1}), None; "object")]
fn test_parse_timestamp_value(input: Value, expected: Option<&str>) {
    let parsed = parse_timestamp(&input).map(|ts| format_timestamp(&ts));
    assert_eq!(parsed.as_deref(), expected);
}

#[test_case("Motor 1", "Motor1")]
#[test_case("Pump.7", "Pump7")]
#[test_case(" a. b .c ", "abc")]
#[test_case("dev1", "dev1")]
#[test_case(". .", "")]
fn test_sanitize_device(input: &str, expected: &str) {
    assert_eq!(sanitize_device(input), expected);
}

// ============================================================================
// Column Reconciliation
// ============================================================================

#[test]
fn test_columns_are_exactly_required() {
    let rows = vec![row(
        json!("2024-03-01T10:00:00Z"),
        "dev1",
        json!({"Temp": 21.5, "Extra": 1, "pressure": 2}),
    )];
    let required = columns(&["deviceid", "evt_timestamp", "temp", "humidity", "updated_utc"]);

    let table = TableNormalizer::default().normalize(rows, &required, CursorKind::Timestamp, now());

    assert_eq!(table.columns, required);
    assert_eq!(table.len(), 1);
    let values = &table.rows[0].values;
    let mut keys: Vec<_> = values.keys().cloned().collect();
    keys.sort();
    let mut expected = required.clone();
    expected.sort();
    assert_eq!(keys, expected);

    assert_eq!(values["deviceid"], json!("dev1"));
    assert_eq!(values["evt_timestamp"], json!("2024-03-01T10:00:00.000000Z"));
    assert_eq!(values["temp"], json!(21.5));
    assert_eq!(values["humidity"], Value::Null);
    assert_eq!(values["updated_utc"], json!("2024-03-01T12:00:00.000000Z"));
    assert_eq!(
        table.stats.dropped_columns,
        vec!["extra".to_string(), "pressure".to_string()]
    );
    assert_eq!(
        table.stats.filled_columns,
        vec!["humidity".to_string(), "updated_utc".to_string()]
    );
    assert_eq!(
        table.timestamp_columns,
        vec!["evt_timestamp".to_string(), "updated_utc".to_string()]
    );
}

#[test]
fn test_default_labels() {
    let rows = vec![
        row(json!("2024-03-01T10:00:00Z"), "dev1", json!({})),
        row(json!("2024-03-01T10:01:00Z"), "dev1", json!({"eventtype": "Alarm"})),
    ];
    let required = columns(&["deviceid", "evt_timestamp", "devicetype", "eventtype"]);

    let table = TableNormalizer::default()
        .with_device_type("boiler")
        .with_event_type("Telemetry")
        .normalize(rows, &required, CursorKind::Timestamp, now());

    assert_eq!(table.rows[0].values["devicetype"], json!("boiler"));
    assert_eq!(table.rows[0].values["eventtype"], json!("Telemetry"));
    assert_eq!(table.rows[1].values["eventtype"], json!("Alarm"));
}

#[test]
fn test_force_upper_renames_columns() {
    let schema = TargetSchema {
        force_upper: vec!["deviceid".to_string(), "EVT_TIMESTAMP".to_string()],
        ..TargetSchema::default()
    };
    let rows = vec![row(json!("2024-03-01T10:00:00Z"), "dev1", json!({"temp": 1}))];
    let required = columns(&["deviceid", "evt_timestamp", "temp"]);

    let table = TableNormalizer::new(schema).normalize(rows, &required, CursorKind::Timestamp, now());

    assert_eq!(table.columns, columns(&["DEVICEID", "EVT_TIMESTAMP", "temp"]));
    assert_eq!(table.device_column, "DEVICEID");
    assert_eq!(table.timestamp_column, "EVT_TIMESTAMP");
    assert_eq!(table.rows[0].values["DEVICEID"], json!("dev1"));
    assert!(table.is_timestamp_column("EVT_TIMESTAMP"));
}

#[test]
fn test_required_columns_are_compared_lowercase() {
    let rows = vec![row(json!("2024-03-01T10:00:00Z"), "dev1", json!({"SPEED": 5}))];
    let required = columns(&["DeviceId", "Evt_Timestamp", "Speed", "speed"]);

    let table = TableNormalizer::default().normalize(rows, &required, CursorKind::Timestamp, now());

    assert_eq!(table.columns, columns(&["deviceid", "evt_timestamp", "speed"]));
    assert_eq!(table.rows[0].values["speed"], json!(5));
}

// ============================================================================
// Keys
// ============================================================================

#[test]
fn test_rows_merge_on_sanitized_key() {
    let rows = vec![
        row(json!("2024-03-01T10:00:00Z"), "Motor 1", json!({"speed": 1500})),
        row(json!("2024-03-01T10:00:00.000Z"), "Motor1", json!({"current": 4.2})),
        row(json!("2024-03-01T10:00:00Z"), "Motor.1", json!({"speed": null})),
    ];
    let required = columns(&["deviceid", "evt_timestamp", "speed", "current"]);

    let table = TableNormalizer::default().normalize(rows, &required, CursorKind::Timestamp, now());

    assert_eq!(table.len(), 1);
    assert_eq!(table.stats.merged, 2);
    assert_eq!(table.rows[0].values["speed"], json!(1500));
    assert_eq!(table.rows[0].values["current"], json!(4.2));
}

#[test]
fn test_rows_sorted_by_device_then_time() {
    let rows = vec![
        row(json!("2024-03-01T10:05:00Z"), "b", json!({})),
        row(json!("2024-03-01T10:00:00Z"), "b", json!({})),
        row(json!("2024-03-01T10:10:00Z"), "a", json!({})),
    ];
    let required = columns(&["deviceid", "evt_timestamp"]);

    let table = TableNormalizer::default().normalize(rows, &required, CursorKind::Timestamp, now());

    let keys: Vec<_> = table
        .rows
        .iter()
        .map(|r| (r.device.as_str(), r.timestamp.format("%H:%M").to_string()))
        .collect();
    assert_eq!(
        keys,
        vec![
            ("a", "10:10".to_string()),
            ("b", "10:00".to_string()),
            ("b", "10:05".to_string()),
        ]
    );
}

#[test]
fn test_empty_device_is_dropped() {
    let rows = vec![
        row(json!("2024-03-01T10:00:00Z"), " . ", json!({})),
        row(json!("2024-03-01T10:00:00Z"), "dev1", json!({})),
    ];
    let required = columns(&["deviceid", "evt_timestamp"]);

    let table = TableNormalizer::default().normalize(rows, &required, CursorKind::Timestamp, now());

    assert_eq!(table.len(), 1);
    assert_eq!(table.stats.dropped_devices, 1);
}

#[test]
fn test_unparseable_timestamp_drops_the_row() {
    let rows = vec![
        row(json!("not a time"), "dev1", json!({"temp": 1})),
        row(json!("2024-03-01T10:00:00Z"), "dev1", json!({"temp": 2})),
    ];
    let required = columns(&["deviceid", "evt_timestamp", "temp"]);

    let table = TableNormalizer::default().normalize(rows, &required, CursorKind::Timestamp, now());

    assert_eq!(table.len(), 1);
    assert_eq!(table.stats.unparseable_timestamps, 1);
    assert_eq!(table.rows[0].values["temp"], json!(2));
    assert_eq!(
        table.rows[0].values["evt_timestamp"],
        json!("2024-03-01T10:00:00.000000Z")
    );
    assert_eq!(
        table.cursor_candidate,
        Some(Cursor::Timestamp(
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
        ))
    );
}

// ============================================================================
// Cursor Candidate
// ============================================================================

#[test]
fn test_sequence_cursor_candidate() {
    let mut rows = Vec::new();
    for (seq, minute) in [(10, 0), (12, 2), (11, 1)] {
        let mut r = row(json!(format!("2024-03-01T10:0{minute}:00Z")), "dev1", json!({}));
        r.sequence = Some(seq);
        rows.push(r);
    }
    let required = columns(&["deviceid", "evt_timestamp"]);

    let table = TableNormalizer::default().normalize(rows, &required, CursorKind::Sequence, now());
    assert_eq!(table.cursor_candidate, Some(Cursor::Sequence(12)));
}

#[test]
fn test_empty_table_has_no_candidate() {
    let table = TableNormalizer::default().normalize(
        Vec::new(),
        &columns(&["deviceid", "evt_timestamp"]),
        CursorKind::Timestamp,
        now(),
    );
    assert!(table.is_empty());
    assert_eq!(table.cursor_candidate, None);
}

#[test]
fn test_target_schema_defaults_from_yaml() {
    let schema: TargetSchema = serde_yaml::from_str("force_upper: [deviceid]").unwrap();
    assert_eq!(schema.timestamp_column, "evt_timestamp");
    assert_eq!(schema.device_column, "deviceid");
    assert_eq!(schema.updated_column, "updated_utc");
    assert_eq!(schema.output_name("deviceid"), "DEVICEID");
    assert_eq!(schema.output_name("temp"), "temp");
}
