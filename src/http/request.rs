//! Request-scoped identifiers and context.
//!
//! # Responsibilities
//! - Generate or propagate the trace identifier (`X-Request-ID`)
//! - Carry per-request state through the gateway (client key, attempts)
//!
//! # Design Decisions
//! - An incoming trace id is kept only if it is a short, printable token
//! - Generated ids are UUID v4 in simple (hex) form

use std::fmt;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use uuid::Uuid;

/// Header carrying the trace identifier in both directions.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

const MAX_TRACE_ID_LEN: usize = 128;

/// Opaque token correlating every hop of a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TraceId(String);

impl TraceId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Reuse the caller's id when it is usable, otherwise mint a new one.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| is_valid_trace_id(v))
            .map(|v| Self(v.to_string()))
            .unwrap_or_else(Self::generate)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn header_value(&self) -> HeaderValue {
        // Only visible ASCII is ever stored.
        HeaderValue::from_str(&self.0).unwrap_or_else(|_| HeaderValue::from_static("invalid"))
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_valid_trace_id(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_TRACE_ID_LEN
        && value.bytes().all(|b| b.is_ascii_graphic())
}

/// Per-request state, owned by the task handling the request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub trace_id: TraceId,
    pub client_key: String,
    /// Upstream attempts made so far.
    pub attempt_count: u32,
    /// Name of the matched route, once resolved.
    pub route: Option<String>,
    /// Upstream key of the matched route, once resolved.
    pub upstream: Option<String>,
}

impl RequestContext {
    pub fn new(trace_id: TraceId, client_key: impl Into<String>) -> Self {
        Self {
            trace_id,
            client_key: client_key.into(),
            attempt_count: 0,
            route: None,
            upstream: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_hex() {
        let a = TraceId::generate();
        let b = TraceId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert!(a.as_str().bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn propagates_incoming_id() {
        let mut headers = HeaderMap::new();
        headers.insert(X_REQUEST_ID, HeaderValue::from_static("abc123"));
        assert_eq!(TraceId::from_headers(&headers).as_str(), "abc123");
    }

    #[test]
    fn replaces_unusable_id() {
        let mut headers = HeaderMap::new();
        headers.insert(X_REQUEST_ID, HeaderValue::from_static("has space"));
        assert_ne!(TraceId::from_headers(&headers).as_str(), "has space");

        let long = "a".repeat(MAX_TRACE_ID_LEN + 1);
        headers.insert(X_REQUEST_ID, HeaderValue::from_str(&long).unwrap());
        assert_eq!(TraceId::from_headers(&headers).as_str().len(), 32);

        assert_eq!(TraceId::from_headers(&HeaderMap::new()).as_str().len(), 32);
    }
}
