//! PI points source
//!
//! Root → data servers → points matching the name filter → recorded values
//! of each point. Readings come back as signals; the attribute map decides
//! which device and attribute each point feeds.

use super::client::PiClient;
use super::types::{
    selected_fields, PiItems, PiPoint, PiPointsConfig, PiValue, TIMESTAMP_FIELD, VALUE_FIELD,
};
use crate::cursor::{Cursor, CursorKind};
use crate::error::Result;
use crate::source::types::{CheckResult, Fetch, RawRecord, RecordLayout, SourceAdapter};
use async_trait::async_trait;
use chrono::SecondsFormat;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

/// PI points source adapter
#[derive(Debug)]
pub struct PiPointsSource {
    name: String,
    config: PiPointsConfig,
    client: PiClient,
    layout: RecordLayout,
}

impl PiPointsSource {
    /// Create a points source
    pub fn new(name: impl Into<String>, config: PiPointsConfig) -> Result<Self> {
        let client = PiClient::new(&config.connection)?;
        let layout =
            RecordLayout::new(TIMESTAMP_FIELD).require(config.required_fields.iter().cloned());

        Ok(Self {
            name: name.into(),
            config,
            client,
            layout,
        })
    }

    /// Underlying API client
    pub fn client(&self) -> &PiClient {
        &self.client
    }

    /// Recorded values of one point since `start_time`
    async fn recorded(&self, point: &PiPoint, start_time: &str) -> Result<Vec<PiValue>> {
        let fields = selected_fields("Items", &[TIMESTAMP_FIELD, VALUE_FIELD]);
        let values: PiItems<PiValue> = self
            .client
            .get(
                point.links.get("RecordedData")?,
                &[("selectedFields", fields.as_str()), ("startTime", start_time)],
            )
            .await?;
        debug!(point = %point.name, values = values.items.len(), "Recorded values");
        Ok(values.items)
    }

    async fn fetch_points(&self, since: Option<&Cursor>) -> Result<Fetch> {
        let start_time = start_time(since, &self.config.lookback);
        info!(source = %self.name, start_time = %start_time, "Fetching PI points");

        let mut points = Vec::new();
        for server in self.client.data_servers().await? {
            let found = self
                .client
                .points(&server, Some(&self.config.name_filter))
                .await?;
            info!(
                "Found {} points on {} that match filter {}",
                found.len(),
                server.name,
                self.config.name_filter
            );
            points.extend(found);
        }

        let start = start_time.as_str();
        let requests: Vec<_> = points
            .iter()
            .map(|point| async move { (point, self.recorded(point, start).await) })
            .collect();
        let results: Vec<_> = stream::iter(requests)
            .buffered(self.config.connection.concurrency.max(1))
            .collect()
            .await;

        let mut fetch = Fetch::default();
        for (point, values) in results {
            for value in values? {
                match value.value {
                    serde_json::Value::Object(_) => {
                        debug!(point = %point.name, "Dropping non-scalar value");
                        fetch.malformed += 1;
                    }
                    scalar if !value.timestamp.is_null() => fetch.records.push(
                        RawRecord::signal(point.name.clone(), value.timestamp, scalar),
                    ),
                    _ => fetch.malformed += 1,
                }
            }
        }

        if fetch.malformed > 0 {
            warn!(source = %self.name, "Dropped {} malformed values", fetch.malformed);
        }
        Ok(fetch)
    }
}

/// `startTime` query value: the cursor, or the lookback window
pub(crate) fn start_time(since: Option<&Cursor>, lookback: &str) -> String {
    match since.and_then(Cursor::as_timestamp) {
        Some(ts) => ts.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        None => lookback.to_string(),
    }
}

#[async_trait]
impl SourceAdapter for PiPointsSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "osipi_points"
    }

    fn cursor_key(&self) -> String {
        format!("osipi_points_{}", self.config.name_filter.to_lowercase())
    }

    fn cursor_kind(&self) -> CursorKind {
        CursorKind::Timestamp
    }

    fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    async fn fetch(&self, since: Option<&Cursor>) -> Result<Fetch> {
        self.fetch_points(since)
            .await
            .map_err(|e| e.at_source(&self.name))
    }

    async fn check(&self) -> Result<CheckResult> {
        match self.client.root().await {
            Ok(_) => Ok(CheckResult::success(format!(
                "PI Web API at {} answered",
                self.client.base_url()
            ))),
            Err(e) => Ok(CheckResult::failure(format!(
                "PI Web API at {} failed: {e}",
                self.client.base_url()
            ))),
        }
    }
}
