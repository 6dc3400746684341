//! Shared Access Signature tokens
//!
//! IoT Hub accepts `SharedAccessSignature sr=..&sig=..&se=..&skn=..` as the
//! SASL password of the AMQP connection. The signature is an HMAC-SHA256,
//! keyed with the base64-decoded policy key, over the url-encoded resource
//! and the expiry (epoch seconds) separated by a newline.

use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::form_urlencoded;

type HmacSha256 = Hmac<Sha256>;

/// Token lifetime used when none is configured
pub const DEFAULT_SAS_TTL_SECS: i64 = 3600;

/// Generate a SAS token for `resource`, valid until `now + ttl_secs`
pub fn generate_sas_token(
    resource: &str,
    key_b64: &str,
    policy_name: Option<&str>,
    ttl_secs: i64,
    now: DateTime<Utc>,
) -> Result<String> {
    let expiry = now.timestamp() + ttl_secs;

    let key = STANDARD
        .decode(key_b64.trim())
        .map_err(|e| Error::auth(format!("Access key is not valid base64: {e}")))?;

    let encoded_resource: String = form_urlencoded::byte_serialize(resource.as_bytes()).collect();
    let to_sign = format!("{encoded_resource}\n{expiry}");

    let mut mac = HmacSha256::new_from_slice(&key)
        .map_err(|e| Error::auth(format!("Invalid signing key: {e}")))?;
    mac.update(to_sign.as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());

    let mut query = form_urlencoded::Serializer::new(String::new());
    query
        .append_pair("sr", resource)
        .append_pair("sig", &signature)
        .append_pair("se", &expiry.to_string());
    if let Some(policy) = policy_name {
        query.append_pair("skn", policy);
    }

    Ok(format!("SharedAccessSignature {}", query.finish()))
}

/// Policy credentials for an IoT hub
#[derive(Clone)]
pub struct SasCredentials {
    /// Shared access policy name (e.g. `iothubowner`, `service`)
    pub policy_name: String,
    /// Base64 policy key
    pub access_key: String,
    /// Token lifetime in seconds
    pub ttl_secs: i64,
}

impl SasCredentials {
    /// Create credentials with the default token lifetime
    pub fn new(policy_name: impl Into<String>, access_key: impl Into<String>) -> Self {
        Self {
            policy_name: policy_name.into(),
            access_key: access_key.into(),
            ttl_secs: DEFAULT_SAS_TTL_SECS,
        }
    }

    /// SASL user name for a hub: `{policy}@sas.root.{hub}`
    pub fn username(&self, hub_name: &str) -> String {
        format!("{}@sas.root.{hub_name}", self.policy_name)
    }

    /// Derive a token scoped to `resource`
    pub fn token_for(&self, resource: &str, now: DateTime<Utc>) -> Result<String> {
        generate_sas_token(
            resource,
            &self.access_key,
            Some(&self.policy_name),
            self.ttl_secs,
            now,
        )
    }
}

impl std::fmt::Debug for SasCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SasCredentials")
            .field("policy_name", &self.policy_name)
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}
