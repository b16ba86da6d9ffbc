//! Client-facing responses.
//!
//! # Responsibilities
//! - Relay a buffered upstream response (status, headers, body)
//! - Render the configured fallback while a circuit is open
//! - Stamp the trace id on everything that leaves the gateway
//!
//! # Design Decisions
//! - Hop-by-hop headers are stripped on the way back too
//! - Fallbacks are marked so clients can tell them from real answers

use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue};
use axum::response::Response;

use crate::http::request::{TraceId, X_REQUEST_ID};
use crate::routing::Fallback;
use crate::security::headers::strip_hop_by_hop;
use crate::upstream::UpstreamResponse;

/// Marks a response served from a route's fallback instead of its upstream.
pub const X_GATEWAY_FALLBACK: HeaderName = HeaderName::from_static("x-gateway-fallback");

/// Turn an upstream response into the client response.
pub fn relay(upstream: UpstreamResponse) -> Response {
    let mut headers = upstream.headers;
    strip_hop_by_hop(&mut headers);
    // The body is fully buffered; hyper recomputes the length.
    headers.remove(header::CONTENT_LENGTH);

    let mut response = Response::new(Body::from(upstream.body));
    *response.status_mut() = upstream.status;
    *response.headers_mut() = headers;
    response
}

pub fn fallback(fallback: Fallback) -> Response {
    let mut response = Response::new(Body::from(fallback.body));
    *response.status_mut() = fallback.status;
    response
        .headers_mut()
        .insert(X_GATEWAY_FALLBACK, HeaderValue::from_static("true"));
    response
}

pub fn with_trace_id(mut response: Response, trace_id: &TraceId) -> Response {
    response.headers_mut().insert(X_REQUEST_ID, trace_id.header_value());
    response
}
