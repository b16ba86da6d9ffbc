//! Pre-shared API key check.

use axum::http::HeaderMap;

use crate::config::AuthConfig;
use crate::error::GatewayError;

/// Validates the API key header against configuration.
#[derive(Debug, Clone)]
pub struct ApiKeyAuth {
    enabled: bool,
    header: String,
    api_key: String,
}

impl ApiKeyAuth {
    pub fn new(header: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            enabled: true,
            header: header.into(),
            api_key: api_key.into(),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            enabled: config.enabled,
            ..Self::new(&config.header, &config.api_key)
        }
    }

    /// Header that carries the key, when checking is enabled.
    pub fn header(&self) -> Option<&str> {
        self.enabled.then_some(self.header.as_str())
    }

    pub fn verify(&self, headers: &HeaderMap) -> Result<(), GatewayError> {
        if !self.enabled {
            return Ok(());
        }

        let presented = headers.get(self.header.as_str()).map(|v| v.as_bytes());
        if presented == Some(self.api_key.as_bytes()) {
            Ok(())
        } else {
            Err(GatewayError::Unauthorized)
        }
    }
}
