//! Authentication module
//!
//! Supports: Basic, Bearer, Custom Headers for HTTP sources, and
//! Shared Access Signature tokens for the AMQP event hub.
//!
//! PI Web API deployments typically run with Basic auth; the event hub
//! authenticates the AMQP connection with a SAS token passed as SASL password.

mod authenticator;
mod sas;
mod types;

pub use authenticator::Authenticator;
pub use sas::{generate_sas_token, SasCredentials, DEFAULT_SAS_TTL_SECS};
pub use types::AuthConfig;
