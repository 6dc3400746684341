//! Link abstraction over an AMQP client
//!
//! The receive loop only needs to open a link to a target and pull batches
//! from it. Protocol conditions that end or divert paging (redirect, detach,
//! connection close) are events, not errors.

use super::filter::AmqpTarget;
use super::message::AmqpMessage;
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Outcome of one batch receive
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// Messages received before the timeout; empty when none arrived
    Batch(Vec<AmqpMessage>),
    /// The peer asked the client to attach to another address
    Redirect {
        /// New address
        address: String,
    },
    /// The peer detached the link
    Detached {
        /// Reason given by the peer
        reason: String,
    },
    /// The peer closed the connection
    Closed {
        /// Reason given by the peer
        reason: String,
    },
}

/// Opens receive links
#[async_trait]
pub trait AmqpTransport: Send + Sync {
    /// Connect and attach a receiver to `target`
    async fn open(&self, target: &AmqpTarget) -> Result<Box<dyn AmqpLink>>;
}

/// An attached receive link
#[async_trait]
pub trait AmqpLink: Send {
    /// Receive up to `max` messages, waiting at most `timeout`
    async fn receive_batch(&mut self, max: usize, timeout: Duration) -> Result<LinkEvent>;

    /// Detach and close the connection
    async fn close(&mut self) -> Result<()>;
}
