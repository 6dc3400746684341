//! PI Asset Framework elements source
//!
//! Asset server → database holding the parent path → parent element →
//! child elements. Each child element is one device; its attributes are read
//! as recorded or interpolated stream sets.
//!
//! When resuming from a cursor the stream sets are requested with
//! `boundaryType=Outside`, which also returns the last value before the
//! cursor. That row is written again with the same (device, timestamp) key
//! and replaces itself in the sink.

use super::client::PiClient;
use super::points::start_time;
use super::types::{
    selected_fields, PiElement, PiElementsConfig, PiItems, PiStream, TIMESTAMP_FIELD, VALUE_FIELD,
};
use crate::cursor::{Cursor, CursorKind};
use crate::error::{Error, Result};
use crate::source::types::{CheckResult, Fetch, RawRecord, RecordLayout, SourceAdapter};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

/// PI elements source adapter
#[derive(Debug)]
pub struct PiElementsSource {
    name: String,
    config: PiElementsConfig,
    client: PiClient,
    layout: RecordLayout,
}

impl PiElementsSource {
    /// Create an elements source
    pub fn new(name: impl Into<String>, config: PiElementsConfig) -> Result<Self> {
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

    /// Child elements of the configured parent; each is one device
    pub async fn devices(&self) -> Result<Vec<PiElement>> {
        let parent_path = self.config.parent_path.as_str();

        let databases = self.client.asset_databases().await?;
        let database = databases
            .iter()
            .find(|db| !db.path.is_empty() && parent_path.starts_with(db.path.as_str()))
            .ok_or_else(|| {
                Error::config(format!("No asset database holds element '{parent_path}'"))
            })?;
        debug!(database = %database.path, "Found database of parent element");

        let candidates = self
            .client
            .search_elements(
                database.links.get("Elements")?,
                Some(self.config.parent_name()),
            )
            .await?;
        let parent = candidates
            .iter()
            .find(|e| e.path == parent_path)
            .ok_or_else(|| Error::config(format!("Parent element '{parent_path}' not found")))?;

        let fields = selected_fields(
            "Items",
            &["Name", "Links.RecordedData", "Links.InterpolatedData"],
        );
        let children: PiItems<PiElement> = self
            .client
            .get(
                parent.links.get("Elements")?,
                &[("selectedFields", fields.as_str())],
            )
            .await?;

        Ok(children.items)
    }

    /// Stream sets of one device
    async fn streams(&self, device: &PiElement, since: Option<&Cursor>) -> Result<Vec<PiStream>> {
        let link = if self.config.interval.is_some() {
            "InterpolatedData"
        } else {
            "RecordedData"
        };

        let fields = format!(
            "Items.Name;Items.PointType;{}",
            selected_fields("Items.Items", &[TIMESTAMP_FIELD, VALUE_FIELD])
        );
        let start = start_time(since, &self.config.lookback);

        let mut query = vec![("selectedFields", fields.as_str())];
        if let Some(ref interval) = self.config.interval {
            query.push(("interval", interval.as_str()));
        }
        if since.is_some() {
            query.push(("boundaryType", "Outside"));
        }
        query.push(("startTime", start.as_str()));

        let streams: PiItems<PiStream> = self.client.get(device.links.get(link)?, &query).await?;
        Ok(streams.items)
    }

    async fn fetch_elements(&self, since: Option<&Cursor>) -> Result<Fetch> {
        let devices = self.devices().await?;
        info!(
            source = %self.name,
            "Found {} devices below {}",
            devices.len(),
            self.config.parent_path
        );

        let requests: Vec<_> = devices
            .iter()
            .map(|device| async move { (device, self.streams(device, since).await) })
            .collect();
        let results: Vec<_> = stream::iter(requests)
            .buffered(self.config.connection.concurrency.max(1))
            .collect()
            .await;

        let mut fetch = Fetch::default();
        for (device, streams) in results {
            for attribute in streams? {
                for value in attribute.items {
                    if value.value.is_object() || value.timestamp.is_null() {
                        debug!(device = %device.name, attribute = %attribute.name, "Dropping non-scalar value");
                        fetch.malformed += 1;
                        continue;
                    }
                    fetch.records.push(RawRecord::attribute(
                        device.name.clone(),
                        attribute.name.clone(),
                        value.timestamp,
                        value.value,
                    ));
                }
            }
        }

        if fetch.malformed > 0 {
            warn!(source = %self.name, "Dropped {} malformed values", fetch.malformed);
        }
        Ok(fetch)
    }
}

#[async_trait]
impl SourceAdapter for PiElementsSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "osipi_elements"
    }

    fn cursor_key(&self) -> String {
        format!("osipi_elements_{}", self.config.parent_path.to_lowercase())
    }

    fn cursor_kind(&self) -> CursorKind {
        CursorKind::Timestamp
    }

    fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    async fn fetch(&self, since: Option<&Cursor>) -> Result<Fetch> {
        self.fetch_elements(since)
            .await
            .map_err(|e| e.at_source(&self.name))
    }

    async fn check(&self) -> Result<CheckResult> {
        match self.devices().await {
            Ok(devices) => Ok(CheckResult::success(format!(
                "{} devices below {}",
                devices.len(),
                self.config.parent_path
            ))),
            Err(e) => Ok(CheckResult::failure(e.to_string())),
        }
    }
}
