//! Tests for the HTTP client module

use super::*;
use crate::auth::AuthConfig;
use crate::error::Error;
use crate::types::BackoffType;
use reqwest::Method;
use std::time::Duration;
use wiremock::matchers::{header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_config(base: &str) -> HttpClientConfig {
    HttpClientConfig::builder()
        .base_url(base)
        .max_retries(2)
        .backoff(
            BackoffType::Constant,
            Duration::from_millis(10),
            Duration::from_secs(1),
        )
        .no_rate_limit()
        .build()
}

#[test]
fn test_http_client_config_default() {
    let config = HttpClientConfig::default();
    assert_eq!(config.timeout, Duration::from_secs(30));
    assert_eq!(config.max_retries, 3);
    assert!(config.base_url.is_none());
    assert!(config.rate_limit.is_some());
    assert!(!config.accept_invalid_certs);
}

#[test]
fn test_http_client_config_builder() {
    let config = HttpClientConfig::builder()
        .base_url("https://pi.example.com/piwebapi")
        .timeout(Duration::from_secs(60))
        .max_retries(5)
        .header("X-Requested-With", "iot-preload")
        .accept_invalid_certs(true)
        .build();

    assert_eq!(
        config.base_url.as_deref(),
        Some("https://pi.example.com/piwebapi")
    );
    assert_eq!(config.timeout, Duration::from_secs(60));
    assert_eq!(config.max_retries, 5);
    assert!(config.accept_invalid_certs);
    assert_eq!(
        config.default_headers.get("X-Requested-With"),
        Some(&"iot-preload".to_string())
    );
}

#[tokio::test]
async fn test_get_json_with_basic_auth() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/piwebapi"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Links": {"DataServers": "https://pi/piwebapi/dataservers"}
        })))
        .mount(&mock_server)
        .await;

    let client = HttpClient::with_auth(
        fast_config(&mock_server.uri()),
        AuthConfig::basic("piadmin", "secret"),
    )
    .unwrap();
    let root: serde_json::Value = client.get_json("/piwebapi").await.unwrap();

    assert_eq!(
        root["Links"]["DataServers"],
        "https://pi/piwebapi/dataservers"
    );
}

#[tokio::test]
async fn test_query_params_keep_order_and_repeat() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/points"))
        .and(query_param("nameFilter", "Boiler*"))
        .and(query_param("selectedFields", "Items.Name;Items.PointType"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"Items": []})))
        .mount(&mock_server)
        .await;

    let client = HttpClient::with_config(fast_config(&mock_server.uri())).unwrap();
    let response = client
        .request(
            Method::GET,
            "/points",
            RequestConfig::new()
                .query("nameFilter", "Boiler*")
                .query("selectedFields", "Items.Name;Items.PointType"),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_post_with_body_and_header() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/readings"))
        .and(header("X-Request-Id", "abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{"v": 1}])))
        .mount(&mock_server)
        .await;

    let client = HttpClient::with_config(fast_config(&mock_server.uri())).unwrap();
    let body: serde_json::Value = client
        .request_json(
            Method::POST,
            "/readings",
            RequestConfig::new()
                .header("X-Request-Id", "abc")
                .json(serde_json::json!({"since": 0})),
        )
        .await
        .unwrap();

    assert_eq!(body[0]["v"], 1);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = HttpClient::with_config(fast_config(&mock_server.uri())).unwrap();
    let err = client.get("/missing").await.unwrap_err();

    assert!(matches!(err, Error::HttpStatus { status: 401, .. }));
}

#[tokio::test]
async fn test_retry_on_500_then_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .mount(&mock_server)
        .await;

    let client = HttpClient::with_config(fast_config(&mock_server.uri())).unwrap();
    let response = client.get("/flaky").await.unwrap();

    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_retries_exhausted_returns_last_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(3)
        .mount(&mock_server)
        .await;

    let client = HttpClient::with_config(fast_config(&mock_server.uri())).unwrap();
    let err = client.get("/down").await.unwrap_err();

    assert!(matches!(err, Error::HttpStatus { status: 503, .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_rate_limited_retry() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1"))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let client = HttpClient::with_config(fast_config(&mock_server.uri())).unwrap();
    let response = client.get("/limited").await.unwrap();

    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_absolute_url_ignores_base() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/streams/abc/recorded"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&mock_server)
        .await;

    let client = HttpClient::with_config(fast_config("https://unused.invalid")).unwrap();
    let text = client
        .request_text(
            Method::GET,
            &format!("{}/streams/abc/recorded", mock_server.uri()),
            RequestConfig::new(),
        )
        .await
        .unwrap();

    assert_eq!(text, "ok");
}

#[test]
fn test_calculate_backoff() {
    let config = HttpClientConfig::builder()
        .backoff(
            BackoffType::Exponential,
            Duration::from_millis(100),
            Duration::from_millis(500),
        )
        .no_rate_limit()
        .build();
    let client = HttpClient::with_config(config).unwrap();

    assert_eq!(client.calculate_backoff(0), Duration::from_millis(100));
    assert_eq!(client.calculate_backoff(1), Duration::from_millis(200));
    assert_eq!(client.calculate_backoff(2), Duration::from_millis(400));
    assert_eq!(client.calculate_backoff(3), Duration::from_millis(500));

    let config = HttpClientConfig::builder()
        .backoff(
            BackoffType::Linear,
            Duration::from_millis(100),
            Duration::from_secs(10),
        )
        .build();
    let client = HttpClient::with_config(config).unwrap();
    assert_eq!(client.calculate_backoff(2), Duration::from_millis(300));
    assert!(client.has_rate_limiter());
}
