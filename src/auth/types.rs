//! Auth configuration types
//!
//! These types represent the runtime auth configuration after template
//! interpolation has been applied to the job file.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Authentication configuration for HTTP sources
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    /// No authentication required
    #[default]
    None,

    /// HTTP Basic authentication
    Basic {
        /// Username
        username: String,
        /// Password
        password: String,
    },

    /// Bearer token authentication
    Bearer {
        /// The bearer token
        token: String,
    },

    /// Custom headers
    CustomHeaders {
        /// Headers to add to each request
        headers: HashMap<String, String>,
    },
}

impl AuthConfig {
    /// Create a Basic auth config
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Name of the auth scheme, safe to log
    pub fn scheme(&self) -> &'static str {
        match self {
            AuthConfig::None => "none",
            AuthConfig::Basic { .. } => "basic",
            AuthConfig::Bearer { .. } => "bearer",
            AuthConfig::CustomHeaders { .. } => "custom_headers",
        }
    }
}

#[cfg(test)]
mod type_tests {
    use super::*;

    #[test]
    fn test_auth_config_default() {
        let config = AuthConfig::default();
        assert!(matches!(config, AuthConfig::None));
    }

    #[test]
    fn test_auth_config_from_yaml() {
        let config: AuthConfig =
            serde_yaml::from_str("type: basic\nusername: piadmin\npassword: secret\n").unwrap();
        assert_eq!(config, AuthConfig::basic("piadmin", "secret"));
        assert_eq!(config.scheme(), "basic");
    }
}
