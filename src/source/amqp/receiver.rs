//! Event-hub source
//!
//! Receives the events of one IoT-hub partition past the stored sequence
//! number, keeping only those sent by the configured device.

use super::filter::{
    AmqpTarget, EventFilter, DEVICE_PROPERTY, MESSAGE_SOURCE_PROPERTY, SEQUENCE_ANNOTATION,
};
use super::message::AmqpMessage;
use super::transport::{AmqpLink, AmqpTransport, LinkEvent};
use crate::auth::{SasCredentials, DEFAULT_SAS_TTL_SECS};
use crate::cursor::{Cursor, CursorKind};
use crate::decode::BodyKind;
use crate::error::Result;
use crate::source::types::{CheckResult, Fetch, RawRecord, RecordLayout, SourceAdapter};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Column the message source property is renamed to
const EVENT_TYPE_COLUMN: &str = "eventtype";

// ============================================================================
// Configuration
// ============================================================================

/// Connection and filtering parameters of an event-hub source
#[derive(Clone, Serialize, Deserialize)]
pub struct AmqpConfig {
    /// IoT hub name (`{hub}.azure-devices.net`)
    pub hub_name: String,

    /// Shared access policy name
    pub policy_name: String,

    /// Base64 policy key
    pub access_key: String,

    /// Consumer group
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,

    /// Partition id
    #[serde(default = "default_partition_id")]
    pub partition_id: String,

    /// Device whose events are kept
    pub device_id: String,

    /// Field of the event payload holding the event timestamp
    #[serde(default = "default_date_field")]
    pub date_field: String,

    /// Fields an event must carry to be kept (the date field always is)
    #[serde(default)]
    pub required_fields: Vec<String>,

    /// Maximum messages per receive call
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Receive timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Ignore events enqueued more than this many seconds ago
    #[serde(default)]
    pub max_age_secs: Option<i64>,

    /// Also filter by device id on the server
    #[serde(default)]
    pub server_device_filter: bool,

    /// SAS token lifetime in seconds
    #[serde(default = "default_sas_ttl")]
    pub sas_ttl_secs: i64,
}

fn default_consumer_group() -> String {
    "$Default".to_string()
}

fn default_partition_id() -> String {
    "0".to_string()
}

fn default_date_field() -> String {
    "date".to_string()
}

fn default_max_batch_size() -> usize {
    60
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_sas_ttl() -> i64 {
    DEFAULT_SAS_TTL_SECS
}

impl AmqpConfig {
    /// Create a config with defaults for everything but the connection
    pub fn new(
        hub_name: impl Into<String>,
        policy_name: impl Into<String>,
        access_key: impl Into<String>,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            hub_name: hub_name.into(),
            policy_name: policy_name.into(),
            access_key: access_key.into(),
            consumer_group: default_consumer_group(),
            partition_id: default_partition_id(),
            device_id: device_id.into(),
            date_field: default_date_field(),
            required_fields: Vec::new(),
            max_batch_size: default_max_batch_size(),
            timeout_ms: default_timeout_ms(),
            max_age_secs: None,
            server_device_filter: false,
            sas_ttl_secs: default_sas_ttl(),
        }
    }
}

impl fmt::Debug for AmqpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmqpConfig")
            .field("hub_name", &self.hub_name)
            .field("policy_name", &self.policy_name)
            .field("consumer_group", &self.consumer_group)
            .field("partition_id", &self.partition_id)
            .field("device_id", &self.device_id)
            .field("date_field", &self.date_field)
            .field("required_fields", &self.required_fields)
            .field("max_batch_size", &self.max_batch_size)
            .field("timeout_ms", &self.timeout_ms)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Source
// ============================================================================

/// Event-hub source adapter
pub struct AmqpSource {
    name: String,
    config: AmqpConfig,
    credentials: SasCredentials,
    transport: Arc<dyn AmqpTransport>,
    layout: RecordLayout,
}

impl AmqpSource {
    /// Create a source receiving through `transport`
    pub fn new(
        name: impl Into<String>,
        config: AmqpConfig,
        transport: Arc<dyn AmqpTransport>,
    ) -> Self {
        let mut credentials =
            SasCredentials::new(config.policy_name.clone(), config.access_key.clone());
        credentials.ttl_secs = config.sas_ttl_secs;

        let layout = RecordLayout::new(config.date_field.clone())
            .with_device_field(DEVICE_PROPERTY)
            .with_sequence_field(SEQUENCE_ANNOTATION)
            .rename(MESSAGE_SOURCE_PROPERTY, EVENT_TYPE_COLUMN)
            .strip_prefix("iothub-")
            .strip_prefix("x-opt-")
            .require(config.required_fields.iter().cloned());

        Self {
            name: name.into(),
            config,
            credentials,
            transport,
            layout,
        }
    }

    /// Source configuration
    pub fn config(&self) -> &AmqpConfig {
        &self.config
    }

    /// Selector for a cycle starting after `since`
    pub fn filter(&self, since: Option<&Cursor>) -> EventFilter {
        let next = since
            .and_then(Cursor::as_sequence)
            .map_or(0, |last| last + 1);

        let mut filter = EventFilter::new().since_sequence(next);
        if let Some(age) = self.config.max_age_secs {
            filter = filter.max_age(age);
        }
        if self.config.server_device_filter {
            filter = filter.device(self.config.device_id.clone());
        }
        filter
    }

    /// Receive batches until the partition is drained.
    ///
    /// Paging stops at an empty batch, a detach or a connection close. One
    /// redirect is followed per cycle by re-opening the link at the new
    /// address with a freshly derived token.
    async fn receive(&self, mut target: AmqpTarget) -> Result<Vec<AmqpMessage>> {
        let timeout = Duration::from_millis(self.config.timeout_ms);
        let max = self.config.max_batch_size.max(1);

        info!(source = %self.name, target = %target, "Receiving events");
        let mut link = self.transport.open(&target).await?;
        let mut redirected = false;
        let mut messages = Vec::new();

        loop {
            match link.receive_batch(max, timeout).await {
                Ok(LinkEvent::Batch(batch)) if batch.is_empty() => {
                    debug!(source = %self.name, "Empty batch, partition drained");
                    break;
                }
                Ok(LinkEvent::Batch(batch)) => {
                    info!(source = %self.name, "Got {} messages", batch.len());
                    messages.extend(batch);
                }
                Ok(LinkEvent::Redirect { address }) if !redirected => {
                    info!(source = %self.name, "Link redirected, following");
                    redirected = true;
                    close_quietly(link.as_mut()).await;

                    target = target.redirected(&address, &self.credentials, Utc::now())?;
                    info!(source = %self.name, target = %target, "Receiving events");
                    link = self.transport.open(&target).await?;
                }
                Ok(LinkEvent::Redirect { address }) => {
                    warn!(
                        source = %self.name,
                        "Second redirect to {address} in one cycle, stopping"
                    );
                    break;
                }
                Ok(LinkEvent::Detached { reason }) => {
                    info!(source = %self.name, "Link detached: {reason}");
                    break;
                }
                Ok(LinkEvent::Closed { reason }) => {
                    info!(source = %self.name, "Connection closed: {reason}");
                    break;
                }
                Err(e) => {
                    close_quietly(link.as_mut()).await;
                    return Err(e);
                }
            }
        }

        close_quietly(link.as_mut()).await;
        Ok(messages)
    }
}

async fn close_quietly(link: &mut dyn AmqpLink) {
    if let Err(e) = link.close().await {
        debug!("Ignoring error while closing link: {e}");
    }
}

#[async_trait]
impl SourceAdapter for AmqpSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "amqp"
    }

    fn cursor_key(&self) -> String {
        format!("amqp_lastseq_{}", self.config.device_id.to_lowercase())
    }

    fn cursor_kind(&self) -> CursorKind {
        CursorKind::Sequence
    }

    fn default_cursor(&self) -> Option<Cursor> {
        Some(Cursor::Sequence(-1))
    }

    fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    async fn fetch(&self, since: Option<&Cursor>) -> Result<Fetch> {
        let now = Utc::now();
        let filter = self.filter(since).render(now);
        let target = AmqpTarget::for_partition(
            &self.config.hub_name,
            &self.config.consumer_group,
            &self.config.partition_id,
            &self.credentials,
            filter,
            now,
        )
        .map_err(|e| e.at_source(&self.name))?;

        let messages = self
            .receive(target)
            .await
            .map_err(|e| e.at_source(&self.name))?;

        if messages.is_empty() {
            info!(source = %self.name, "No messages returned");
            return Ok(Fetch::default());
        }

        let received = messages.len();
        let mut records = Vec::with_capacity(received);
        for message in messages {
            let (record, kind) = message.into_record();
            if kind != BodyKind::Object {
                debug!(source = %self.name, "Kept non-object event body as {kind:?}");
            }

            let device = record.get(DEVICE_PROPERTY).and_then(|v| v.as_str());
            if device != Some(self.config.device_id.as_str()) {
                continue;
            }
            records.push(RawRecord::Event(record));
        }

        info!(
            source = %self.name,
            "Keeping {} of {} records for device {}",
            records.len(),
            received,
            self.config.device_id
        );

        Ok(Fetch::new(records, 0))
    }

    async fn check(&self) -> Result<CheckResult> {
        let target = AmqpTarget::for_partition(
            &self.config.hub_name,
            &self.config.consumer_group,
            &self.config.partition_id,
            &self.credentials,
            None,
            Utc::now(),
        )?;

        match self.transport.open(&target).await {
            Ok(mut link) => {
                close_quietly(link.as_mut()).await;
                Ok(CheckResult::success(format!("Attached to {target}")))
            }
            Err(e) => Ok(CheckResult::failure(format!(
                "Could not attach to {target}: {e}"
            ))),
        }
    }
}

impl fmt::Debug for AmqpSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmqpSource")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
