//! Tests for decoder module

use super::*;
use bytes::Bytes;
use serde_json::json;
use test_case::test_case;

// ============================================================================
// DecoderConfig Tests
// ============================================================================

#[test]
fn test_decoder_config_from_yaml() {
    let config: DecoderConfig =
        serde_yaml::from_str("format: json\nrecord_path: data.readings\n").unwrap();
    assert_eq!(config.format, DecoderFormat::Json);
    assert_eq!(config.record_path.as_deref(), Some("data.readings"));
    assert!(config.csv_has_header);
}

#[test]
fn test_decoder_config_build_csv() {
    let decoder = DecoderConfig::csv().build();
    let records = decoder.decode("Date,temp\n2024-01-01,21.5").unwrap();
    assert_eq!(records[0]["temp"], 21.5);
}

// ============================================================================
// JSON Decoder Tests
// ============================================================================

#[test]
fn test_json_decoder_array() {
    let decoder = JsonDecoder::new();
    let records = decoder.decode(r#"[{"id": 1}, {"id": 2}]"#).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1]["id"], 2);
}

#[test]
fn test_json_decoder_object_is_single_record() {
    let decoder = JsonDecoder::new();
    let records = decoder.decode(r#"{"deviceid": "p1", "temp": 20}"#).unwrap();
    assert_eq!(records.len(), 1);
}

#[test]
fn test_json_decoder_nested_path() {
    let decoder = JsonDecoder::with_path("response.Items");
    let body = r#"{"response": {"Items": [{"Value": 1.5}], "Links": {}}}"#;

    let records = decoder.decode(body).unwrap();
    assert_eq!(records, vec![json!({"Value": 1.5})]);
}

#[test]
fn test_json_decoder_array_index() {
    let decoder = JsonDecoder::with_path("Items[-1]");
    let body = r#"{"Items": [{"id": 1}, {"id": 2}, {"id": 3}]}"#;

    let records = decoder.decode(body).unwrap();
    assert_eq!(records[0]["id"], 3);
}

#[test]
fn test_json_decoder_jsonpath_wildcard() {
    let decoder = JsonDecoder::with_path("$.data[*]");
    let records = decoder
        .decode(r#"{"data": [{"id": 1}, {"id": 2}]}"#)
        .unwrap();
    assert_eq!(records.len(), 2);
}

#[test]
fn test_json_decoder_missing_path_is_empty() {
    let decoder = JsonDecoder::with_path("nothing.here");
    assert!(decoder.decode(r#"{"data": []}"#).unwrap().is_empty());
}

#[test]
fn test_json_decoder_invalid() {
    let decoder = JsonDecoder::new();
    assert!(decoder.decode("not valid json").is_err());
    assert!(decoder.decode_lenient("not valid json").is_err());
}

// ============================================================================
// JSONL Decoder Tests
// ============================================================================

#[test]
fn test_jsonl_decoder_strict_rejects_bad_line() {
    let decoder = JsonlDecoder::new();
    let body = "{\"id\": 1}\nnot valid json\n{\"id\": 2}";
    assert!(decoder.decode(body).is_err());
}

#[test]
fn test_jsonl_decoder_lenient_skips_bad_line() {
    let decoder = JsonlDecoder::new();
    let body = "{\"id\": 1}\n\nnot valid json\n{\"id\": 2}\n";

    let decoded = decoder.decode_lenient(body).unwrap();
    assert_eq!(decoded.records.len(), 2);
    assert_eq!(decoded.malformed, 1);
}

// ============================================================================
// CSV Decoder Tests
// ============================================================================

#[test]
fn test_csv_decoder_basic() {
    let decoder = CsvDecoder::new();
    let body = "Date,temperature,status\n2024-01-01 00:00:00,21.5,ok\n2024-01-01 00:01:00,22,ok";

    let records = decoder.decode(body).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["Date"], "2024-01-01 00:00:00");
    assert_eq!(records[0]["temperature"], 21.5);
    assert_eq!(records[1]["temperature"], 22);
}

#[test]
fn test_csv_decoder_quoted_fields() {
    let decoder = CsvDecoder::new();
    let body = "id,description\n1,\"Hello, World\"\n2,\"He said \"\"Hi\"\"\"";

    let records = decoder.decode(body).unwrap();
    assert_eq!(records[0]["description"], "Hello, World");
    assert_eq!(records[1]["description"], "He said \"Hi\"");
}

#[test]
fn test_csv_decoder_no_header() {
    let decoder = CsvDecoder::with_options(';', false);
    let records = decoder.decode("1;pump\n2;valve").unwrap();
    assert_eq!(records[0]["column_0"], 1);
    assert_eq!(records[1]["column_1"], "valve");
}

#[test]
fn test_csv_decoder_skips_overlong_rows() {
    let decoder = CsvDecoder::new();
    let decoded = decoder.decode_lenient("a,b\n1,2\n1,2,3\n4,5").unwrap();
    assert_eq!(decoded.records.len(), 2);
    assert_eq!(decoded.malformed, 1);
}

#[test_case("" ; "empty")]
#[test_case("null" ; "null literal")]
#[test_case("None" ; "python none")]
#[test_case("NaN" ; "not a number")]
fn test_csv_decoder_nulls(cell: &str) {
    let decoder = CsvDecoder::new();
    let records = decoder.decode(&format!("id,value\n1,{cell}")).unwrap();
    assert!(records[0]["value"].is_null());
}

#[test]
fn test_csv_decoder_empty_body() {
    let decoder = CsvDecoder::new();
    assert!(decoder.decode("").unwrap().is_empty());
}

// ============================================================================
// Event body Tests
// ============================================================================

#[test]
fn test_event_body_object() {
    let (obj, kind) = decode_event_body(&[Bytes::from_static(br#"{"temp": 21.5}"#)]);
    assert_eq!(kind, BodyKind::Object);
    assert_eq!(obj["temp"], 21.5);
}

#[test]
fn test_event_body_sections_are_concatenated() {
    let sections = [
        Bytes::from_static(br#"{"temp": "#),
        Bytes::from_static(br#"21.5, "date": "2024-01-01T00:00:00Z"}"#),
    ];
    let (obj, kind) = decode_event_body(&sections);
    assert_eq!(kind, BodyKind::Object);
    assert_eq!(obj["date"], "2024-01-01T00:00:00Z");
}

#[test]
fn test_event_body_non_object_is_wrapped() {
    let (obj, kind) = decode_event_body(&[Bytes::from_static(b"[1, 2, 3]")]);
    assert_eq!(kind, BodyKind::Wrapped);
    assert_eq!(obj[JSON_WRAPPER_KEY], json!([1, 2, 3]));
}

#[test]
fn test_event_body_text_is_kept_raw() {
    let (obj, kind) = decode_event_body(&[Bytes::from_static(b"temp=21.5")]);
    assert_eq!(kind, BodyKind::Raw);
    assert_eq!(obj[RAW_DATA_KEY], "temp=21.5");
}
