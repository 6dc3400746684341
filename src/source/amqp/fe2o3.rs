//! AMQP 1.0 transport over `fe2o3-amqp`
//!
//! Connects with SASL PLAIN (SAS token as password) over TLS and attaches a
//! receiver whose source carries the event-hub selector filter.

use super::filter::AmqpTarget;
use super::message::{AmqpMessage, AnnotationValue};
use super::transport::{AmqpLink, AmqpTransport, LinkEvent};
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use fe2o3_amqp::connection::ConnectionHandle;
use fe2o3_amqp::link::{LinkStateError, RecvError};
use fe2o3_amqp::sasl_profile::SaslProfile;
use fe2o3_amqp::session::SessionHandle;
use fe2o3_amqp::types::definitions::{AmqpError, ConnectionError, ErrorCondition, LinkError};
use fe2o3_amqp::types::messaging::annotations::OwnedKey;
use fe2o3_amqp::types::messaging::{Body, FilterSet, Source};
use fe2o3_amqp::types::primitives::{Symbol, Value};
use fe2o3_amqp::{Connection, Receiver, Session};
use serde_amqp::described::Described;
use serde_amqp::descriptor::Descriptor;
use std::time::Duration;
use tracing::debug;

/// Filter name understood by the event hub
const SELECTOR_FILTER: &str = "apache.org:selector-filter:string";

/// Descriptor code of the selector filter
const SELECTOR_FILTER_CODE: u64 = 0x0000_468C_0000_0004;

/// Transport opening real AMQP connections
#[derive(Debug, Clone, Default)]
pub struct Fe2o3Transport {
    container_id: String,
}

impl Fe2o3Transport {
    /// Create a transport
    pub fn new() -> Self {
        Self {
            container_id: format!("iot-preload-{}", std::process::id()),
        }
    }
}

#[async_trait]
impl AmqpTransport for Fe2o3Transport {
    async fn open(&self, target: &AmqpTarget) -> Result<Box<dyn AmqpLink>> {
        let url = format!("amqps://{}:5671", target.host);

        let mut connection = Connection::builder()
            .container_id(self.container_id.clone())
            .hostname(target.host.as_str())
            .sasl_profile(SaslProfile::Plain {
                username: target.username.clone(),
                password: target.password.clone(),
            })
            .open(url.as_str())
            .await
            .map_err(|e| Error::auth(format!("Failed to connect to {}: {e}", target.host)))?;

        let mut session = Session::begin(&mut connection)
            .await
            .map_err(|e| Error::auth(format!("Failed to begin session: {e}")))?;

        let mut source = Source::builder().address(target.address.clone());
        if let Some(ref filter) = target.filter {
            let mut filters = FilterSet::new();
            filters.insert(
                Symbol::from(SELECTOR_FILTER),
                Some(Described {
                    descriptor: Descriptor::Code(SELECTOR_FILTER_CODE),
                    value: Value::String(filter.clone()),
                }),
            );
            source = source.filter(filters);
        }

        let receiver = Receiver::builder()
            .name(format!("{}-receiver", self.container_id))
            .source(source.build())
            .attach(&mut session)
            .await
            .map_err(|e| Error::auth(format!("Failed to attach receiver: {e}")))?;

        Ok(Box::new(Fe2o3Link {
            connection,
            session,
            receiver: Some(receiver),
        }))
    }
}

struct Fe2o3Link {
    connection: ConnectionHandle<()>,
    session: SessionHandle<()>,
    receiver: Option<Receiver>,
}

#[async_trait]
impl AmqpLink for Fe2o3Link {
    async fn receive_batch(&mut self, max: usize, timeout: Duration) -> Result<LinkEvent> {
        let Some(receiver) = self.receiver.as_mut() else {
            return Ok(LinkEvent::Closed {
                reason: "receiver already closed".to_string(),
            });
        };

        let mut batch = Vec::new();
        let deadline = tokio::time::Instant::now() + timeout;

        while batch.len() < max {
            let delivery =
                match tokio::time::timeout_at(deadline, receiver.recv::<Body<Value>>()).await {
                    Err(_) => break,
                    Ok(Ok(delivery)) => delivery,
                    Ok(Err(e)) => {
                        if batch.is_empty() {
                            return classify(e);
                        }
                        debug!("Link ended after {} messages: {e}", batch.len());
                        break;
                    }
                };

            receiver
                .accept(&delivery)
                .await
                .map_err(|e| Error::Other(format!("Failed to settle delivery: {e}")))?;

            let message = delivery.message();
            let mut annotations = Vec::new();
            if let Some(ref ma) = message.message_annotations {
                for (key, value) in ma.iter() {
                    annotations.push((key_name(key), to_annotation(value)));
                }
            }
            if let Some(ref props) = message.application_properties {
                for (key, value) in props.iter() {
                    annotations.push((key.clone(), to_annotation(value)));
                }
            }

            let data = match &message.body {
                Body::Data(sections) => sections
                    .iter()
                    .map(|d| Bytes::copy_from_slice(d.0.as_ref()))
                    .collect(),
                Body::Value(v) => vec![Bytes::from(format!("{:?}", v.0))],
                _ => Vec::new(),
            };

            batch.push(AmqpMessage { data, annotations });
        }

        Ok(LinkEvent::Batch(batch))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(receiver) = self.receiver.take() {
            let _ = receiver.close().await;
            let _ = self.session.end().await;
            let _ = self.connection.close().await;
        }
        Ok(())
    }
}

/// Map a receive error onto a link event.
///
/// Only conditions sent by the peer end paging; anything else means the
/// transport or session broke and the hub is unreachable for this cycle.
fn classify(error: RecvError) -> Result<LinkEvent> {
    let event = match error {
        RecvError::LinkStateError(LinkStateError::RemoteDetachedWithError(err))
        | RecvError::LinkStateError(LinkStateError::RemoteClosedWithError(err)) => {
            match err.condition {
                ErrorCondition::LinkError(LinkError::Redirect) => {
                    let address = err
                        .info
                        .as_ref()
                        .and_then(|info| info.get(&Symbol::from("address")))
                        .and_then(|v| match v {
                            Value::String(s) => Some(s.clone()),
                            _ => None,
                        });
                    match address {
                        Some(address) => LinkEvent::Redirect { address },
                        None => LinkEvent::Detached {
                            reason: "redirect without address".to_string(),
                        },
                    }
                }
                ErrorCondition::ConnectionError(ConnectionError::ConnectionForced)
                | ErrorCondition::AmqpError(AmqpError::ResourceLimitExceeded) => {
                    LinkEvent::Closed {
                        reason: err.description.unwrap_or_default(),
                    }
                }
                _ => LinkEvent::Detached {
                    reason: err.description.unwrap_or_default(),
                },
            }
        }
        RecvError::LinkStateError(LinkStateError::RemoteDetached) => LinkEvent::Detached {
            reason: "detached by peer".to_string(),
        },
        RecvError::LinkStateError(LinkStateError::RemoteClosed) => LinkEvent::Closed {
            reason: "closed by peer".to_string(),
        },
        other => {
            return Err(Error::unavailable(
                "amqp",
                format!("Receive failed: {other}"),
            ))
        }
    };
    Ok(event)
}

fn key_name(key: &OwnedKey) -> String {
    match key {
        OwnedKey::Symbol(s) => s.0.clone(),
        OwnedKey::Ulong(n) => n.to_string(),
    }
}

fn to_annotation(value: &Value) -> AnnotationValue {
    match value {
        Value::Binary(b) => AnnotationValue::Binary(Bytes::copy_from_slice(b.as_ref())),
        Value::String(s) => AnnotationValue::Text(s.clone()),
        Value::Symbol(s) => AnnotationValue::Text(s.0.clone()),
        Value::Long(n) => AnnotationValue::Long(*n),
        Value::Int(n) => AnnotationValue::Long(i64::from(*n)),
        Value::Timestamp(ts) => AnnotationValue::Timestamp(ts.milliseconds()),
        other => AnnotationValue::Text(format!("{other:?}")),
    }
}
