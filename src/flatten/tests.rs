//! Tests for the flattener

use super::*;
use crate::source::{RawRecord, RecordLayout};
use crate::types::JsonObject;
use pretty_assertions::assert_eq;
use serde_json::json;

fn event(value: serde_json::Value) -> RawRecord {
    match value {
        serde_json::Value::Object(obj) => RawRecord::Event(obj),
        other => panic!("not an object: {other}"),
    }
}

fn pi_map() -> AttributeMap {
    AttributeMap::from_json_str(
        r#"{
            "Boiler.Temp": ["boiler1", "temperature"],
            "Boiler.Pressure": ["boiler1", "pressure"],
            "Pump.Speed": ["pump1", "speed"]
        }"#,
    )
    .unwrap()
}

// ============================================================================
// Attribute Map
// ============================================================================

#[test]
fn test_map_entry_forms() {
    let map = AttributeMap::from_json_str(
        r#"{
            "A": ["dev", "a"],
            "B": "b",
            "C": {"device": "other", "attribute": "c"}
        }"#,
    )
    .unwrap();

    assert_eq!(map.len(), 3);
    assert_eq!(map.get("A").unwrap().device.as_deref(), Some("dev"));
    assert_eq!(map.get("B").unwrap().device, None);
    assert_eq!(map.get("B").unwrap().attribute, "b");
    assert_eq!(map.get("C").unwrap().attribute, "c");
}

#[test]
fn test_identity_map_resolves_everything() {
    let map = AttributeMap::identity();
    assert!(map.is_identity());
    let target = map.resolve("Speed").unwrap();
    assert_eq!(target.attribute, "Speed");
    assert_eq!(target.device, None);

    assert_eq!(pi_map().resolve("Unknown"), None);
}

#[test]
fn test_map_from_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("points.json");
    std::fs::write(&path, r#"{"P1": ["d", "a"]}"#).unwrap();

    let map = AttributeMap::from_file(&path).unwrap();
    assert_eq!(map.len(), 1);

    let missing = AttributeMap::from_file(dir.path().join("nope.json"));
    assert!(matches!(
        missing,
        Err(crate::error::Error::FileNotFound { .. })
    ));
}

// ============================================================================
// Signals and Attributes
// ============================================================================

#[test]
fn test_signals_merge_per_key() {
    let records = vec![
        RawRecord::signal("Boiler.Temp", json!("2024-03-01T10:00:00Z"), json!(80.5)),
        RawRecord::signal("Boiler.Pressure", json!("2024-03-01T10:00:00Z"), json!(2.1)),
        RawRecord::signal("Boiler.Temp", json!("2024-03-01T10:01:00Z"), json!(81.0)),
        RawRecord::signal("Pump.Speed", json!("2024-03-01T10:00:00Z"), json!(1500)),
    ];

    let rows = Flattener::new(pi_map()).flatten(records, &RecordLayout::new("Timestamp"));

    assert_eq!(rows.len(), 3);
    let row = rows.get("2024-03-01T10:00:00Z", "boiler1").unwrap();
    assert_eq!(row.values.len(), 2);
    assert_eq!(row.values["temperature"], json!(80.5));
    assert_eq!(row.values["pressure"], json!(2.1));
    assert!(rows.get("2024-03-01T10:00:00Z", "pump1").is_some());
}

#[test]
fn test_unmapped_signal_is_dropped() {
    let records = vec![
        RawRecord::signal("Boiler.Temp", json!("2024-03-01T10:00:00Z"), json!(80.5)),
        RawRecord::signal("Unmapped.Point", json!("2024-03-01T10:00:00Z"), json!(1)),
        RawRecord::signal("Unmapped.Point", json!("2024-03-01T10:01:00Z"), json!(2)),
    ];

    let rows = Flattener::new(pi_map()).flatten(records, &RecordLayout::new("Timestamp"));

    assert_eq!(rows.len(), 1);
    assert_eq!(rows.stats.unmapped, 2);
    assert_eq!(rows.stats.records, 3);
}

#[test]
fn test_signal_without_device_is_unmapped() {
    let records = vec![RawRecord::signal("Tag", json!("2024-03-01T10:00:00Z"), json!(1))];

    let rows = Flattener::default().flatten(records.clone(), &RecordLayout::new("Timestamp"));
    assert!(rows.is_empty());
    assert_eq!(rows.stats.unmapped, 1);

    let layout = RecordLayout::new("Timestamp").with_fixed_device("site");
    let rows = Flattener::default().flatten(records, &layout);
    assert_eq!(rows.len(), 1);
}

#[test]
fn test_attributes_identity_map() {
    let records = vec![
        RawRecord::attribute("Motor 1", "Speed", json!("2024-03-01T10:00:00Z"), json!(1500)),
        RawRecord::attribute("Motor 1", "Current", json!("2024-03-01T10:00:00Z"), json!(4.2)),
        RawRecord::attribute("Motor 2", "Speed", json!("2024-03-01T10:00:00Z"), json!(1490)),
        RawRecord::attribute("Motor 2", "Speed", json!(null), json!(1)),
    ];

    let rows = Flattener::default().flatten(records, &RecordLayout::new("Timestamp"));

    assert_eq!(rows.len(), 2);
    assert_eq!(rows.stats.missing_key, 1);
    let row = rows.get("2024-03-01T10:00:00Z", "Motor 1").unwrap();
    assert_eq!(row.values["Speed"], json!(1500));
    assert_eq!(row.values["Current"], json!(4.2));
}

#[test]
fn test_null_does_not_overwrite_value() {
    let records = vec![
        RawRecord::attribute("m", "Speed", json!("t1"), json!(10)),
        RawRecord::attribute("m", "Speed", json!("t1"), json!(null)),
    ];
    let rows = Flattener::default().flatten(records, &RecordLayout::new("Timestamp"));
    assert_eq!(rows.get("t1", "m").unwrap().values["Speed"], json!(10));
}

// ============================================================================
// Events
// ============================================================================

fn amqp_layout() -> RecordLayout {
    RecordLayout::new("date")
        .with_device_field("iothub-connection-device-id")
        .with_sequence_field("x-opt-sequence-number")
        .rename("iothub-message-source", "eventtype")
        .strip_prefix("iothub-")
        .strip_prefix("x-opt-")
}

#[test]
fn test_event_processing_order() {
    let records = vec![event(json!({
        "date": "2024-03-01T10:00:00Z",
        "temp": 21.5,
        "iothub-connection-device-id": "dev1",
        "iothub-message-source": "Telemetry",
        "iothub-enqueuedtime": "2024-03-01T10:00:01Z",
        "x-opt-sequence-number": 11,
        "x-opt-offset": "4096",
    }))];

    let rows = Flattener::default().flatten(records, &amqp_layout());
    let row = rows.get("2024-03-01T10:00:00Z", "dev1").unwrap();

    let mut expected = JsonObject::new();
    expected.insert("eventtype".to_string(), json!("Telemetry"));
    expected.insert("temp".to_string(), json!(21.5));
    assert_eq!(row.values, expected);
    assert_eq!(row.sequence, Some(11));
}

#[test]
fn test_events_merge_and_keep_highest_sequence() {
    let records = vec![
        event(json!({"date": "t1", "a": 1, "iothub-connection-device-id": "dev1", "x-opt-sequence-number": 5})),
        event(json!({"date": "t1", "b": 2, "iothub-connection-device-id": "dev1", "x-opt-sequence-number": "7"})),
    ];

    let rows = Flattener::default().flatten(records, &amqp_layout());

    assert_eq!(rows.len(), 1);
    let row = rows.get("t1", "dev1").unwrap();
    assert_eq!(row.values["a"], json!(1));
    assert_eq!(row.values["b"], json!(2));
    assert_eq!(row.sequence, Some(7));
}

#[test]
fn test_events_without_key_are_counted() {
    let records = vec![
        event(json!({"temp": 1, "iothub-connection-device-id": "dev1"})),
        event(json!({"date": "t1", "temp": 1})),
    ];

    let rows = Flattener::default().flatten(records, &amqp_layout());
    assert!(rows.is_empty());
    assert_eq!(rows.stats.missing_key, 2);
}

#[test]
fn test_event_fields_through_map() {
    let mut map = AttributeMap::identity();
    map.insert("Temp", None, "temperature")
        .insert("Flow", Some("pump9".to_string()), "flow");
    let layout = RecordLayout::new("Date").with_fixed_device("site");

    let records = vec![event(json!({"Date": "t1", "Temp": 20, "Flow": 3, "Noise": 0}))];
    let rows = Flattener::new(map).flatten(records, &layout);

    assert_eq!(rows.stats.unmapped, 1);
    assert_eq!(rows.get("t1", "site").unwrap().values["temperature"], json!(20));
    assert_eq!(rows.get("t1", "pump9").unwrap().values["flow"], json!(3));
}

#[test]
fn test_unmapped_event_yields_no_row() {
    let mut map = AttributeMap::identity();
    map.insert("Temp", Some("other".to_string()), "temperature");
    let layout = RecordLayout::new("Date").with_fixed_device("site");

    let rows = Flattener::new(map).flatten(vec![event(json!({"Date": "t1", "Noise": 0}))], &layout);

    assert!(rows.is_empty());
    assert_eq!(rows.stats.unmapped, 1);
}

#[test]
fn test_redirected_event_leaves_no_empty_row() {
    let mut map = AttributeMap::identity();
    map.insert("Temp", Some("other".to_string()), "temperature");
    let layout = RecordLayout::new("Date")
        .with_fixed_device("site")
        .with_sequence_field("seq");

    let rows = Flattener::new(map).flatten(
        vec![event(json!({"Date": "t2", "Temp": 5, "seq": 42}))],
        &layout,
    );

    assert_eq!(rows.len(), 1);
    assert!(rows.get("t2", "site").is_none());
    let row = rows.get("t2", "other").unwrap();
    assert_eq!(row.values["temperature"], json!(5));
    assert_eq!(row.sequence, Some(42));
}

// ============================================================================
// Required Fields
// ============================================================================

#[test]
fn test_required_field_filter() {
    let layout = RecordLayout::new("date")
        .with_fixed_device("dev1")
        .require(["temp"]);
    let records = vec![
        event(json!({"date": "t1", "temp": 1})),
        event(json!({"date": "t2", "temp": 2})),
        event(json!({"date": "t3", "humidity": 40})),
        event(json!({"date": "t4", "temp": 4})),
        event(json!({"date": "t5", "temp": null})),
    ];

    let rows = Flattener::default().flatten(records, &layout);

    assert_eq!(rows.len(), 3);
    assert_eq!(rows.stats.missing_required, 2);
    let kept: Vec<_> = rows.iter().map(|r| r.timestamp.clone()).collect();
    assert_eq!(kept, vec![json!("t1"), json!("t2"), json!("t4")]);
}

#[test]
fn test_required_fields_can_empty_the_batch() {
    let layout = RecordLayout::new("date")
        .with_fixed_device("dev1")
        .require(["temp"]);
    let records = vec![event(json!({"date": "t1", "humidity": 40}))];

    let rows = Flattener::default().flatten(records, &layout);
    assert!(rows.is_empty());
    assert_eq!(rows.stats.missing_required, 1);
}
