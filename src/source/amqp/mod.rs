//! Event-hub (AMQP 1.0) source
//!
//! # Overview
//!
//! - `EventFilter` - server-side selector on sequence number, age, device
//! - `AmqpTarget` - partition address plus SAS credentials
//! - `AmqpTransport` / `AmqpLink` - the client seam; `Fe2o3Transport`
//!   implements it when the `amqp` feature is enabled
//! - `AmqpSource` - the receive loop and record extraction
//!
//! The cursor is the highest `x-opt-sequence-number` written; a cycle asks
//! for everything from the next sequence number on.

mod filter;
mod message;
mod receiver;
mod transport;

#[cfg(feature = "amqp")]
mod fe2o3;

pub use filter::{
    AmqpTarget, EventFilter, DEVICE_PROPERTY, ENQUEUED_TIME_ANNOTATION, MESSAGE_SOURCE_PROPERTY,
    SEQUENCE_ANNOTATION,
};
pub use message::{AmqpMessage, AnnotationValue};
pub use receiver::{AmqpConfig, AmqpSource};
pub use transport::{AmqpLink, AmqpTransport, LinkEvent};

#[cfg(feature = "amqp")]
pub use fe2o3::Fe2o3Transport;
