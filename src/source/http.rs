//! Generic HTTP source
//!
//! One request per cycle. The response body is decoded into records with the
//! configured decoder; records at or before the cursor are dropped here since
//! arbitrary endpoints cannot be asked for "newer than".

use crate::auth::AuthConfig;
use crate::cursor::{Cursor, CursorKind};
use crate::decode::{DecoderConfig, RecordDecoder};
use crate::error::{Error, Result};
use crate::http::{HttpClient, HttpClientConfig, RequestConfig};
use crate::normalize::parse_timestamp;
use crate::source::types::{CheckResult, Fetch, RawRecord, RecordLayout, SourceAdapter};
use crate::types::{JsonObject, JsonValue, Method, StringMap};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// HTTP source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSourceConfig {
    /// Request URL
    pub url: String,

    /// Request method
    #[serde(default)]
    pub method: Method,

    /// Extra request headers
    #[serde(default)]
    pub headers: StringMap,

    /// JSON request body
    #[serde(default)]
    pub body: Option<JsonValue>,

    /// Credentials
    #[serde(default)]
    pub auth: AuthConfig,

    /// How to decode the response body
    #[serde(default = "DecoderConfig::json")]
    pub decoder: DecoderConfig,

    /// Response body is one object of equal-length column arrays
    #[serde(default)]
    pub columnar: bool,

    /// Column renames
    #[serde(default)]
    pub column_map: BTreeMap<String, String>,

    /// Field holding the timestamp
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,

    /// Field holding the device id
    #[serde(default)]
    pub device_field: Option<String>,

    /// Device id for every record, when records carry none
    #[serde(default)]
    pub device_id: Option<String>,

    /// Fields a row must carry to be kept
    #[serde(default)]
    pub required_fields: Vec<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries on transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_timestamp_field() -> String {
    "evt_timestamp".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

impl HttpSourceConfig {
    /// GET `url` with defaults
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::GET,
            headers: StringMap::new(),
            body: None,
            auth: AuthConfig::None,
            decoder: DecoderConfig::json(),
            columnar: false,
            column_map: BTreeMap::new(),
            timestamp_field: default_timestamp_field(),
            device_field: None,
            device_id: None,
            required_fields: Vec::new(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

/// HTTP source adapter
pub struct HttpSource {
    name: String,
    config: HttpSourceConfig,
    client: HttpClient,
    decoder: Box<dyn RecordDecoder>,
    layout: RecordLayout,
}

impl HttpSource {
    /// Create an HTTP source
    pub fn new(name: impl Into<String>, config: HttpSourceConfig) -> Result<Self> {
        let mut layout = match (&config.device_field, &config.device_id) {
            (Some(field), _) => RecordLayout::new(&config.timestamp_field).with_device_field(field),
            (None, Some(device)) => {
                RecordLayout::new(&config.timestamp_field).with_fixed_device(device)
            }
            (None, None) => {
                return Err(Error::config(
                    "HTTP source needs either device_field or device_id",
                ))
            }
        };
        for (from, to) in &config.column_map {
            layout = layout.rename(from, to);
        }
        let layout = layout.require(config.required_fields.iter().cloned());

        let mut builder = HttpClientConfig::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .max_retries(config.max_retries);
        for (key, value) in &config.headers {
            builder = builder.header(key, value);
        }
        let client = HttpClient::with_auth(builder.build(), config.auth.clone())?;
        let decoder = config.decoder.build();

        Ok(Self {
            name: name.into(),
            config,
            client,
            decoder,
            layout,
        })
    }

    fn request(&self) -> RequestConfig {
        match self.config.body {
            Some(ref body) => RequestConfig::new().json(body.clone()),
            None => RequestConfig::new(),
        }
    }

    async fn fetch_http(&self, since: Option<&Cursor>) -> Result<Fetch> {
        let body = self
            .client
            .request_text(self.config.method.into(), &self.config.url, self.request())
            .await?;
        let decoded = self.decoder.decode_lenient(&body)?;

        let values = if self.config.columnar {
            decoded
                .records
                .into_iter()
                .flat_map(|value| match value {
                    JsonValue::Object(columns) => rows_from_columns(columns)
                        .into_iter()
                        .map(JsonValue::Object)
                        .collect(),
                    other => vec![other],
                })
                .collect()
        } else {
            decoded.records
        };

        let cutoff = since.and_then(Cursor::as_timestamp);
        let mut fetch = Fetch::new(Vec::new(), decoded.malformed);
        let mut seen = 0usize;

        for value in values {
            let JsonValue::Object(record) = value else {
                fetch.malformed += 1;
                continue;
            };

            if let Some(cutoff) = cutoff {
                let ts = record
                    .get(&self.config.timestamp_field)
                    .and_then(parse_timestamp);
                if ts.is_some_and(|ts| ts <= cutoff) {
                    seen += 1;
                    continue;
                }
            }
            fetch.records.push(RawRecord::Event(record));
        }

        if seen > 0 {
            debug!(source = %self.name, "Skipped {seen} records at or before the cursor");
        }
        if fetch.malformed > 0 {
            warn!(source = %self.name, "Dropped {} malformed records", fetch.malformed);
        }
        info!(source = %self.name, records = fetch.records.len(), "Fetched HTTP records");
        Ok(fetch)
    }
}

/// Turn `{"a": [1, 2], "b": [3, 4]}` into one row per index. Scalars are
/// repeated on every row.
pub(crate) fn rows_from_columns(columns: JsonObject) -> Vec<JsonObject> {
    let len = columns
        .values()
        .filter_map(|v| v.as_array().map(Vec::len))
        .max()
        .unwrap_or(1);

    (0..len)
        .map(|i| {
            columns
                .iter()
                .map(|(key, value)| {
                    let cell = match value {
                        JsonValue::Array(items) => items.get(i).cloned().unwrap_or_default(),
                        scalar => scalar.clone(),
                    };
                    (key.clone(), cell)
                })
                .collect()
        })
        .collect()
}

impl std::fmt::Debug for HttpSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSource")
            .field("name", &self.name)
            .field("url", &self.config.url)
            .field("method", &self.config.method)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SourceAdapter for HttpSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "http"
    }

    fn cursor_key(&self) -> String {
        format!("http_{}", self.config.url.to_lowercase())
    }

    fn cursor_kind(&self) -> CursorKind {
        CursorKind::Timestamp
    }

    fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    async fn fetch(&self, since: Option<&Cursor>) -> Result<Fetch> {
        self.fetch_http(since)
            .await
            .map_err(|e| e.at_source(&self.name))
    }

    async fn check(&self) -> Result<CheckResult> {
        match self
            .client
            .request(self.config.method.into(), &self.config.url, self.request())
            .await
        {
            Ok(response) => Ok(CheckResult::success(format!(
                "{} answered {}",
                self.config.url,
                response.status()
            ))),
            Err(e) => Ok(CheckResult::failure(format!("{} failed: {e}", self.config.url))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> HttpSourceConfig {
        let mut config = HttpSourceConfig::new(format!("{}/readings", server.uri()));
        config.device_field = Some("device".to_string());
        config.max_retries = 0;
        config
    }

    #[tokio::test]
    async fn test_fetch_decodes_records() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/readings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"device": "d1", "evt_timestamp": "2024-03-01T10:00:00Z", "temp": 20.5},
                {"device": "d2", "evt_timestamp": "2024-03-01T10:01:00Z", "temp": 21.0},
                "not a record",
            ])))
            .mount(&server)
            .await;

        let source = HttpSource::new("readings", config(&server)).unwrap();
        let fetch = source.fetch(None).await.unwrap();

        assert_eq!(fetch.records.len(), 2);
        assert_eq!(fetch.malformed, 1);
        match &fetch.records[0] {
            RawRecord::Event(record) => assert_eq!(record["temp"], json!(20.5)),
            other => panic!("Expected an event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_drops_records_before_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/readings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [
                {"device": "d1", "evt_timestamp": "2024-03-01T10:00:00Z", "temp": 20.5},
                {"device": "d1", "evt_timestamp": "2024-03-01T10:05:00Z", "temp": 21.0},
                {"device": "d1", "evt_timestamp": "2024-03-01T10:10:00Z", "temp": 21.5},
            ]})))
            .mount(&server)
            .await;

        let mut config = config(&server);
        config.decoder = DecoderConfig::json().with_record_path("data");
        let source = HttpSource::new("readings", config).unwrap();

        let cursor = Cursor::Timestamp(Utc.with_ymd_and_hms(2024, 3, 1, 10, 5, 0).unwrap());
        let fetch = source.fetch(Some(&cursor)).await.unwrap();
        assert_eq!(fetch.records.len(), 1);
    }

    #[tokio::test]
    async fn test_post_with_body_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/readings"))
            .and(header("x-api-key", "k1"))
            .and(body_json(json!({"site": "north"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = config(&server);
        config.method = Method::POST;
        config.body = Some(json!({"site": "north"}));
        config.headers.insert("x-api-key".to_string(), "k1".to_string());
        let source = HttpSource::new("readings", config).unwrap();

        let fetch = source.fetch(None).await.unwrap();
        assert!(fetch.is_empty());
    }

    #[tokio::test]
    async fn test_columnar_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/readings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "evt_timestamp": ["2024-03-01T10:00:00Z", "2024-03-01T10:01:00Z"],
                "temp": [1.0, 2.0],
            })))
            .mount(&server)
            .await;

        let mut config = config(&server);
        config.columnar = true;
        config.device_field = None;
        config.device_id = Some("pump1".to_string());
        let source = HttpSource::new("readings", config).unwrap();

        let fetch = source.fetch(None).await.unwrap();
        assert_eq!(fetch.records.len(), 2);
        assert_eq!(source.layout().fixed_device.as_deref(), Some("pump1"));
    }

    #[tokio::test]
    async fn test_server_error_is_source_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let source = HttpSource::new("readings", config(&server)).unwrap();
        let err = source.fetch(None).await.unwrap_err();
        assert!(err.is_source_unavailable());
        assert!(!source.check().await.unwrap().success);
    }

    #[test]
    fn test_rows_from_columns() {
        let columns = json!({"a": [1, 2, 3], "b": [4], "site": "x"});
        let rows = rows_from_columns(columns.as_object().cloned().unwrap_or_default());

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["b"], json!(4));
        assert_eq!(rows[2]["b"], JsonValue::Null);
        assert_eq!(rows[2]["site"], json!("x"));
    }

    #[test]
    fn test_needs_a_device() {
        let config = HttpSourceConfig::new("http://localhost/readings");
        assert!(matches!(
            HttpSource::new("readings", config),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn test_layout_and_cursor_key() {
        let mut config = HttpSourceConfig::new("http://Example.com/Readings");
        config.device_field = Some("device".to_string());
        config
            .column_map
            .insert("Temp".to_string(), "temperature".to_string());
        config.required_fields = vec!["temperature".to_string()];
        let source = HttpSource::new("readings", config).unwrap();

        assert_eq!(source.cursor_key(), "http_http://example.com/readings");
        assert_eq!(source.layout().renames["Temp"], "temperature");
        assert_eq!(
            source.layout().required_fields,
            vec!["temperature".to_string(), "evt_timestamp".to_string()]
        );
    }
}
