//! PI Web API configuration and response types

use crate::error::{Error, Result};
use crate::types::JsonValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Field holding a reading's timestamp
pub const TIMESTAMP_FIELD: &str = "Timestamp";

/// Field holding a reading's value
pub const VALUE_FIELD: &str = "Value";

/// Start time used when a source has no cursor yet
pub const DEFAULT_LOOKBACK: &str = "-30d";

// ============================================================================
// Configuration
// ============================================================================

/// Connection to a PI Web API server
#[derive(Clone, Serialize, Deserialize)]
pub struct PiConnection {
    /// Server host name
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Basic auth user
    pub username: String,

    /// Basic auth password
    pub password: String,

    /// Full API root, overriding `https://{host}:{port}/piwebapi`
    #[serde(default)]
    pub url: Option<String>,

    /// Accept self-signed certificates
    #[serde(default)]
    pub accept_invalid_certs: bool,

    /// Concurrent value requests per cycle
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Retries per request
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Request rate towards the historian
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
}

fn default_port() -> u16 {
    443
}

fn default_concurrency() -> usize {
    4
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_requests_per_second() -> u32 {
    10
}

impl PiConnection {
    /// Create a connection with default settings
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            username: username.into(),
            password: password.into(),
            url: None,
            accept_invalid_certs: false,
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            requests_per_second: default_requests_per_second(),
        }
    }

    /// Use `url` as API root
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// API root URL
    pub fn base_url(&self) -> String {
        match self.url {
            Some(ref url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}:{}/piwebapi", self.host, self.port),
        }
    }
}

impl fmt::Debug for PiConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PiConnection")
            .field("base_url", &self.base_url())
            .field("username", &self.username)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

/// PI points source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PiPointsConfig {
    /// Server connection
    #[serde(flatten)]
    pub connection: PiConnection,

    /// Point name filter (`*` wildcards)
    pub name_filter: String,

    /// Attributes a row must carry to be kept
    #[serde(default)]
    pub required_fields: Vec<String>,

    /// `startTime` used without a cursor
    #[serde(default = "default_lookback")]
    pub lookback: String,
}

/// PI Asset Framework elements source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PiElementsConfig {
    /// Server connection
    #[serde(flatten)]
    pub connection: PiConnection,

    /// Path of the parent element, e.g. `\\SERVER\Database\Plant\Motors`
    pub parent_path: String,

    /// Interpolation interval (`10s`, `1m`); recorded values when absent
    #[serde(default)]
    pub interval: Option<String>,

    /// Attributes a row must carry to be kept
    #[serde(default)]
    pub required_fields: Vec<String>,

    /// `startTime` used without a cursor
    #[serde(default = "default_lookback")]
    pub lookback: String,
}

fn default_lookback() -> String {
    DEFAULT_LOOKBACK.to_string()
}

impl PiElementsConfig {
    /// Name of the parent element (last path segment)
    pub fn parent_name(&self) -> &str {
        self.parent_path
            .rsplit('\\')
            .find(|s| !s.is_empty())
            .unwrap_or(&self.parent_path)
    }
}

// ============================================================================
// API Responses
// ============================================================================

/// Collection response (`{"Items": [...]}`)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PiItems<T> {
    /// Items
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// Hypermedia links of a resource
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct PiLinks(pub HashMap<String, String>);

impl PiLinks {
    /// Link by name
    pub fn get(&self, name: &str) -> Result<&str> {
        self.0
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| Error::decode(format!("PI Web API response has no '{name}' link")))
    }
}

/// API root
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PiRoot {
    /// Links to the server collections
    #[serde(default)]
    pub links: PiLinks,
}

/// Data server or asset server
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PiServer {
    /// Server name
    #[serde(default)]
    pub name: String,
    /// Links (`Points`, `Databases`)
    #[serde(default)]
    pub links: PiLinks,
}

/// PI point
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PiPoint {
    /// Point name
    pub name: String,
    /// Point type (`Float32`, `Digital`, ...)
    #[serde(default)]
    pub point_type: Option<String>,
    /// Value span
    #[serde(default)]
    pub span: Option<f64>,
    /// Zero value
    #[serde(default)]
    pub zero: Option<f64>,
    /// Links (`RecordedData`)
    #[serde(default)]
    pub links: PiLinks,
}

/// Asset database or element
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PiElement {
    /// Name
    #[serde(default)]
    pub name: String,
    /// Full path
    #[serde(default)]
    pub path: String,
    /// Description
    #[serde(default)]
    pub description: Option<String>,
    /// Links (`Elements`, `Attributes`, `RecordedData`, `InterpolatedData`)
    #[serde(default)]
    pub links: PiLinks,
}

/// Element attribute
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PiAttribute {
    /// Attribute name
    pub name: String,
    /// Value type
    #[serde(default, rename = "Type")]
    pub value_type: Option<String>,
    /// Zero value
    #[serde(default)]
    pub zero: Option<f64>,
    /// Value span
    #[serde(default)]
    pub span: Option<f64>,
}

/// One timestamped value
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PiValue {
    /// Timestamp as returned by the server
    #[serde(default)]
    pub timestamp: JsonValue,
    /// Value; objects are digital states or error payloads
    #[serde(default)]
    pub value: JsonValue,
}

/// Values of one attribute in a stream set
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PiStream {
    /// Attribute name
    pub name: String,
    /// Values
    #[serde(default = "Vec::new")]
    pub items: Vec<PiValue>,
}

// ============================================================================
// Listing Output
// ============================================================================

/// Point as listed by the CLI
#[derive(Debug, Clone, Serialize)]
pub struct PointInfo {
    /// Data server name
    pub server: String,
    /// Point name
    pub name: String,
    /// Point type
    pub point_type: Option<String>,
    /// Value span
    pub span: Option<f64>,
    /// Zero value
    pub zero: Option<f64>,
}

/// Element as listed by the CLI
#[derive(Debug, Clone, Serialize)]
pub struct ElementInfo {
    /// Full path
    pub path: String,
    /// Description
    pub description: Option<String>,
    /// Attributes, when requested
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<PiAttribute>,
}

/// Semicolon-joined `selectedFields` value
pub fn selected_fields(prefix: &str, fields: &[&str]) -> String {
    fields
        .iter()
        .map(|f| format!("{prefix}.{f}"))
        .collect::<Vec<_>>()
        .join(";")
}
