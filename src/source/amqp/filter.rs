//! Event filters and endpoints
//!
//! The event hub evaluates a selector expression on the server, built from
//! message annotations and application properties, so a receiver only gets
//! events past its cursor.

use crate::auth::SasCredentials;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::fmt;
use url::{form_urlencoded, Url};

/// Annotation holding the per-partition sequence number
pub const SEQUENCE_ANNOTATION: &str = "x-opt-sequence-number";

/// Annotation holding the enqueue time (epoch milliseconds)
pub const ENQUEUED_TIME_ANNOTATION: &str = "x-opt-enqueued-time";

/// Property holding the sending device id
pub const DEVICE_PROPERTY: &str = "iothub-connection-device-id";

/// Property holding the message source (telemetry, twin change, ...)
pub const MESSAGE_SOURCE_PROPERTY: &str = "iothub-message-source";

// ============================================================================
// Event Filter
// ============================================================================

/// Server-side selector for one receive cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    since_sequence: Option<i64>,
    max_age_secs: Option<i64>,
    since_time: Option<DateTime<Utc>>,
    device: Option<String>,
}

impl EventFilter {
    /// Create a filter matching every event
    pub fn new() -> Self {
        Self::default()
    }

    /// Only events with a sequence number `>= sequence`
    #[must_use]
    pub fn since_sequence(mut self, sequence: i64) -> Self {
        self.since_sequence = Some(sequence);
        self
    }

    /// Only events enqueued in the last `secs` seconds
    #[must_use]
    pub fn max_age(mut self, secs: i64) -> Self {
        self.max_age_secs = Some(secs);
        self
    }

    /// Only events enqueued at or after `ts`
    #[must_use]
    pub fn since_time(mut self, ts: DateTime<Utc>) -> Self {
        self.since_time = Some(ts);
        self
    }

    /// Only events sent by `device_id`
    #[must_use]
    pub fn device(mut self, device_id: impl Into<String>) -> Self {
        self.device = Some(device_id.into());
        self
    }

    /// Render the selector expression, `None` when no predicate applies.
    ///
    /// Sequence numbers and ages that are not positive add no predicate.
    pub fn render(&self, now: DateTime<Utc>) -> Option<String> {
        let mut predicates = Vec::new();

        if let Some(seq) = self.since_sequence.filter(|s| *s > 0) {
            predicates.push(format!("amqp.annotation.{SEQUENCE_ANNOTATION} >= {seq}"));
        }

        if let Some(age) = self.max_age_secs.filter(|a| *a > 0) {
            let since = now.timestamp() - age;
            predicates.push(format!(
                "amqp.annotation.{ENQUEUED_TIME_ANNOTATION} >= {since}000"
            ));
        }

        if let Some(ts) = self.since_time {
            predicates.push(format!(
                "amqp.annotation.{ENQUEUED_TIME_ANNOTATION} >= {}",
                ts.timestamp_millis()
            ));
        }

        if let Some(ref device) = self.device {
            let escaped = device.replace('\'', "''");
            predicates.push(format!("{DEVICE_PROPERTY} = '{escaped}'"));
        }

        if predicates.is_empty() {
            None
        } else {
            Some(predicates.join(" AND "))
        }
    }
}

// ============================================================================
// Endpoint
// ============================================================================

/// Everything needed to attach a receiver to one partition
#[derive(Clone, PartialEq, Eq)]
pub struct AmqpTarget {
    /// Host to connect to
    pub host: String,
    /// Full address of the partition (`amqps://host/path`)
    pub address: String,
    /// SASL user name
    pub username: String,
    /// SASL password (SAS token)
    pub password: String,
    /// Selector expression
    pub filter: Option<String>,
}

impl AmqpTarget {
    /// Target for a partition of a hub's built-in event endpoint
    pub fn for_partition(
        hub_name: &str,
        consumer_group: &str,
        partition_id: &str,
        credentials: &SasCredentials,
        filter: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let host = format!("{hub_name}.azure-devices.net");
        let path =
            format!("/messages/events/ConsumerGroups/{consumer_group}/Partitions/{partition_id}");

        Ok(Self {
            password: credentials.token_for(&host, now)?,
            username: credentials.username(hub_name),
            address: format!("amqps://{host}{path}"),
            host,
            filter,
        })
    }

    /// Target for the address a redirect pointed to, with a token derived
    /// for that address
    pub fn redirected(
        &self,
        address: &str,
        credentials: &SasCredentials,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let url = Url::parse(address)
            .map_err(|e| Error::auth(format!("Invalid redirect address '{address}': {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| Error::auth(format!("Redirect address '{address}' has no host")))?
            .to_string();

        Ok(Self {
            password: credentials.token_for(address, now)?,
            username: credentials.policy_name.clone(),
            address: address.to_string(),
            host,
            filter: self.filter.clone(),
        })
    }

    /// Path part of the address
    pub fn path(&self) -> String {
        Url::parse(&self.address)
            .map(|u| u.path().to_string())
            .unwrap_or_default()
    }

    /// Address with url-encoded credentials, as accepted by AMQP clients
    pub fn uri(&self) -> String {
        let user: String = form_urlencoded::byte_serialize(self.username.as_bytes()).collect();
        let pass: String = form_urlencoded::byte_serialize(self.password.as_bytes()).collect();
        match self.address.split_once("://") {
            Some((scheme, rest)) => format!("{scheme}://{user}:{pass}@{rest}"),
            None => format!("amqps://{user}:{pass}@{}", self.address),
        }
    }
}

impl fmt::Display for AmqpTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address.split_once("://") {
            Some((scheme, rest)) => write!(f, "{scheme}://{}:***@{rest}", self.username),
            None => write!(f, "{}:***@{}", self.username, self.address),
        }
    }
}

impl fmt::Debug for AmqpTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmqpTarget")
            .field("host", &self.host)
            .field("address", &self.address)
            .field("username", &self.username)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}
