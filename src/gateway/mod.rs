//! The resilient forwarding core.
//!
//! # Data Flow
//! ```text
//! front.rs      GatewayFront: auth, rate limit, trace id, body, audit
//!     → forwarder.rs  ResilientForwarder: route, breaker, retries
//!     → upstream      one call per attempt, under a per-try timeout
//! ```

pub mod forwarder;
pub mod front;

use std::collections::BTreeMap;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;

use crate::routing::RouterError;

pub use forwarder::{ForwardRequest, ResilientForwarder};
pub use front::GatewayFront;

/// Reasons a gateway cannot be assembled from configuration.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Router(#[from] RouterError),

    #[error("invalid identity header '{0}'")]
    IdentityHeader(String),
}

pub(crate) fn identity_headers(config: &BTreeMap<String, String>) -> Result<HeaderMap, BuildError> {
    let mut headers = HeaderMap::with_capacity(config.len());
    for (name, value) in config {
        let header = HeaderName::from_bytes(name.as_bytes()).map_err(|_| BuildError::IdentityHeader(name.clone()))?;
        let value = HeaderValue::from_str(value).map_err(|_| BuildError::IdentityHeader(name.clone()))?;
        headers.insert(header, value);
    }
    Ok(headers)
}
