//! Integration tests using mock PI Web API server
//!
//! Tests the full end-to-end flow: YAML job → PI Web API requests → DuckDB table → cursor file

use chrono::{TimeZone, Utc};
use iot_preload::cursor::{Cursor, CursorStore, FileCursorStore};
use iot_preload::engine::CycleOutcome;
use iot_preload::job::{load_job_with_context, JobBuilder, JobDefinition};
use iot_preload::template::TemplateContext;
use iot_preload::Error;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PARENT: &str = "\\\\PISRV\\FabLab\\Motors";

// ============================================================================
// Fixtures
// ============================================================================

async fn mount_json(server: &MockServer, route: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn readings(points: &[(&str, f64, f64)]) -> Value {
    let speed: Vec<_> = points
        .iter()
        .map(|(ts, speed, _)| json!({"Timestamp": ts, "Value": speed}))
        .collect();
    let torque: Vec<_> = points
        .iter()
        .map(|(ts, _, torque)| json!({"Timestamp": ts, "Value": torque}))
        .collect();
    json!({"Items": [
        {"Name": "Speed", "Items": speed},
        {"Name": "Torque", "Items": torque},
    ]})
}

/// PI Web API with one motor below the parent element
///
/// Without a cursor the motor reports 10:00 and 10:05. Resuming from 10:05
/// returns the boundary value again (with a corrected speed) and 10:10.
async fn pi_server() -> MockServer {
    let server = MockServer::start().await;
    let uri = server.uri();

    mount_json(
        &server,
        "/piwebapi/assetservers",
        json!({"Items": [{
            "Name": "AF",
            "Links": {"Databases": format!("{uri}/piwebapi/assetservers/AS1/assetdatabases")}
        }]}),
    )
    .await;
    mount_json(
        &server,
        "/piwebapi/assetservers/AS1/assetdatabases",
        json!({"Items": [
            {"Name": "FabLab", "Path": "\\\\PISRV\\FabLab",
             "Links": {"Elements": format!("{uri}/piwebapi/assetdatabases/D1/elements")}},
        ]}),
    )
    .await;
    mount_json(
        &server,
        "/piwebapi/assetdatabases/D1/elements",
        json!({"Items": [
            {"Name": "Motors", "Path": PARENT,
             "Links": {"Elements": format!("{uri}/piwebapi/elements/E1/elements")}},
        ]}),
    )
    .await;
    mount_json(
        &server,
        "/piwebapi/elements/E1/elements",
        json!({"Items": [
            {"Name": "Motor 1", "Links": {
                "RecordedData": format!("{uri}/piwebapi/streamsets/M1/recorded"),
            }},
        ]}),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/piwebapi/streamsets/M1/recorded"))
        .and(query_param("startTime", "2024-03-01T10:05:00Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(readings(&[
            ("2024-03-01T10:05:00Z", 1520.0, 41.0),
            ("2024-03-01T10:10:00Z", 1530.0, 42.0),
        ])))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/piwebapi/streamsets/M1/recorded"))
        .respond_with(ResponseTemplate::new(200).set_body_json(readings(&[
            ("2024-03-01T10:00:00Z", 1500.0, 40.0),
            ("2024-03-01T10:05:00Z", 1510.0, 40.5),
        ])))
        .mount(&server)
        .await;

    server
}

fn job(server_uri: &str, dir: &TempDir, speed_type: &str) -> JobDefinition {
    let yaml = format!(
        r#"
name: motors
source:
  type: osipi_elements
  host: pisrv
  url: {server_uri}/piwebapi
  username: piadmin
  password: "{{{{ env.PI_PASSWORD }}}}"
  parent_path: '{PARENT}'
  max_retries: 0
target:
  device_type: motor
sink:
  type: duckdb
  path: {db}
  table: motor_metrics
  create:
    - {{name: deviceid}}
    - {{name: evt_timestamp, type: TIMESTAMP}}
    - {{name: speed, type: "{speed_type}"}}
    - {{name: torque, type: DOUBLE}}
    - {{name: devicetype}}
cursors:
  path: {cursors}
"#,
        db = dir.path().join("metrics.duckdb").display(),
        cursors = dir.path().join("cursors.json").display(),
    );

    let mut ctx = TemplateContext::new();
    ctx.set_env("PI_PASSWORD", "s3cret");
    load_job_with_context(&yaml, ctx).unwrap()
}

fn cursor_key() -> String {
    format!("osipi_elements_{}", PARENT.to_lowercase())
}

fn at(hour: u32, minute: u32) -> Cursor {
    Cursor::Timestamp(Utc.with_ymd_and_hms(2024, 3, 1, hour, minute, 0).unwrap())
}

async fn stored_cursor(job: &JobDefinition) -> Option<Cursor> {
    FileCursorStore::open(&job.cursors.path)
        .unwrap()
        .get(&cursor_key(), None)
        .await
        .unwrap()
}

/// (device, timestamp, speed) rows of the target table, in time order
fn table_rows(db: &Path) -> Vec<(String, String, f64)> {
    let conn = duckdb::Connection::open(db).unwrap();
    let mut stmt = conn
        .prepare(
            "SELECT deviceid, CAST(evt_timestamp AS VARCHAR), speed \
             FROM motor_metrics ORDER BY evt_timestamp",
        )
        .unwrap();
    stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

// ============================================================================
// Full Cycle Tests
// ============================================================================

#[tokio::test]
async fn test_cycles_resume_from_stored_cursor() {
    let server = pi_server().await;
    let dir = TempDir::new().unwrap();
    let job = job(&server.uri(), &dir, "DOUBLE");

    {
        let orchestrator = JobBuilder::new(&job).build().await.unwrap();
        let report = orchestrator.run_cycle().await.unwrap();
        assert_eq!(report.outcome, CycleOutcome::Written { rows: 2 });
        assert_eq!(report.cursor_before, None);
        assert_eq!(report.cursor_after, Some(at(10, 5)));
    }
    assert_eq!(stored_cursor(&job).await, Some(at(10, 5)));

    {
        let orchestrator = JobBuilder::new(&job).build().await.unwrap();
        let report = orchestrator.run_cycle().await.unwrap();
        assert_eq!(report.outcome, CycleOutcome::Written { rows: 2 });
        assert_eq!(report.cursor_before, Some(at(10, 5)));
    }
    assert_eq!(stored_cursor(&job).await, Some(at(10, 10)));

    // The boundary reading replaced its earlier version
    assert_eq!(
        table_rows(&dir.path().join("metrics.duckdb")),
        vec![
            ("Motor1".to_string(), "2024-03-01 10:00:00".to_string(), 1500.0),
            ("Motor1".to_string(), "2024-03-01 10:05:00".to_string(), 1520.0),
            ("Motor1".to_string(), "2024-03-01 10:10:00".to_string(), 1530.0),
        ]
    );
}

#[tokio::test]
async fn test_rerun_of_same_range_is_idempotent() {
    let server = pi_server().await;
    let dir = TempDir::new().unwrap();
    let job = job(&server.uri(), &dir, "DOUBLE");
    let store = Arc::new(FileCursorStore::open(&job.cursors.path).unwrap());

    for _ in 0..2 {
        store.remove(&cursor_key()).await.unwrap();
        let orchestrator = JobBuilder::new(&job)
            .with_store(store.clone())
            .build()
            .await
            .unwrap();
        let report = orchestrator.run_cycle().await.unwrap();
        assert!(report.wrote_data());
    }

    assert_eq!(table_rows(&dir.path().join("metrics.duckdb")).len(), 2);
}

#[tokio::test]
async fn test_cursor_never_moves_backwards() {
    let server = pi_server().await;
    let dir = TempDir::new().unwrap();
    let job = job(&server.uri(), &dir, "DOUBLE");
    FileCursorStore::open(&job.cursors.path)
        .unwrap()
        .put(&cursor_key(), at(11, 0))
        .await
        .unwrap();

    // The server ignores startTime and answers with older readings
    let report = JobBuilder::new(&job)
        .build()
        .await
        .unwrap()
        .run_cycle()
        .await
        .unwrap();

    assert!(report.wrote_data());
    assert!(!report.cursor_advanced());
    assert_eq!(stored_cursor(&job).await, Some(at(11, 0)));
}

#[tokio::test]
async fn test_write_failure_keeps_cursor() {
    let server = pi_server().await;
    let dir = TempDir::new().unwrap();
    let job = job(&server.uri(), &dir, "DOUBLE CHECK (speed < 1000)");
    FileCursorStore::open(&job.cursors.path)
        .unwrap()
        .put(&cursor_key(), at(9, 0))
        .await
        .unwrap();

    let err = {
        let orchestrator = JobBuilder::new(&job).build().await.unwrap();
        orchestrator.run_cycle().await.unwrap_err()
    };

    assert!(matches!(err, Error::WriteFailure { .. }));
    assert!(!err.is_source_unavailable());
    assert_eq!(stored_cursor(&job).await, Some(at(9, 0)));
    assert!(table_rows(&dir.path().join("metrics.duckdb")).is_empty());
}

#[tokio::test]
async fn test_unreachable_source_keeps_cursor() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let job = job(&server.uri(), &dir, "DOUBLE");

    let err = {
        let orchestrator = JobBuilder::new(&job).build().await.unwrap();
        orchestrator.run_cycle().await.unwrap_err()
    };

    assert!(err.is_source_unavailable());
    assert_eq!(stored_cursor(&job).await, None);
    assert!(table_rows(&dir.path().join("metrics.duckdb")).is_empty());
}

#[tokio::test]
async fn test_dry_run_leaves_table_and_cursor_alone() {
    let server = pi_server().await;
    let dir = TempDir::new().unwrap();
    let job = job(&server.uri(), &dir, "DOUBLE");

    let report = {
        let orchestrator = JobBuilder::new(&job).dry_run(true).build().await.unwrap();
        orchestrator.run_cycle().await.unwrap()
    };

    assert!(report.dry_run);
    assert_eq!(report.outcome, CycleOutcome::Written { rows: 2 });
    assert_eq!(report.cursor_after, None);
    assert!(!job.cursors.path.exists());
    assert!(!dir.path().join("metrics.duckdb").exists());
}

#[tokio::test]
async fn test_dry_run_resumes_from_stored_cursor() {
    let server = pi_server().await;
    let dir = TempDir::new().unwrap();
    let job = job(&server.uri(), &dir, "DOUBLE");
    FileCursorStore::open(&job.cursors.path)
        .unwrap()
        .put(&cursor_key(), at(10, 5))
        .await
        .unwrap();
    let before = std::fs::read_to_string(&job.cursors.path).unwrap();

    let report = {
        let orchestrator = JobBuilder::new(&job).dry_run(true).build().await.unwrap();
        orchestrator.run_cycle().await.unwrap()
    };

    assert_eq!(report.cursor_before, Some(at(10, 5)));
    assert_eq!(report.outcome, CycleOutcome::Written { rows: 2 });
    assert_eq!(std::fs::read_to_string(&job.cursors.path).unwrap(), before);
    assert!(!dir.path().join("metrics.duckdb").exists());
}
