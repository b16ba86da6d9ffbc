//! Request-boundary error taxonomy.
//!
//! Every failure a request can meet ends up here and is turned into a
//! distinguishable status: "fix your request" (4xx), "retry later" (429/503)
//! or "upstream broken" (502).

use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::routing::Fallback;
use crate::upstream::UpstreamError;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("missing or invalid credential")]
    Unauthorized,

    #[error("rate limit exceeded for client {client}")]
    RateLimited { client: String },

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("no route for path {path}")]
    RouteNotFound { path: String },

    #[error("circuit open for upstream {upstream}")]
    CircuitOpen {
        upstream: String,
        /// Time until the breaker will admit another trial call.
        retry_after: Duration,
        fallback: Option<Fallback>,
    },

    #[error("upstream {upstream} unavailable after {attempts} attempts: {last}")]
    UpstreamUnavailable {
        upstream: String,
        attempts: u32,
        last: UpstreamError,
    },

    #[error("upstream {upstream} answered with a body over {limit} bytes")]
    UpstreamResponseTooLarge { upstream: String, limit: usize },

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::UpstreamUnavailable { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamResponseTooLarge { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code, used in response bodies and audit events.
    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::Unauthorized => "unauthorized",
            GatewayError::RateLimited { .. } => "rate_limit_exceeded",
            GatewayError::PayloadTooLarge { .. } => "payload_too_large",
            GatewayError::RouteNotFound { .. } => "not_found",
            GatewayError::CircuitOpen { .. } => "circuit_open",
            GatewayError::UpstreamUnavailable { .. } => "upstream_timeout_or_unreachable",
            GatewayError::UpstreamResponseTooLarge { .. } => "upstream_response_too_large",
            GatewayError::Internal(_) => "internal_error",
        }
    }

    /// True for errors caused by the caller rather than an upstream.
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = axum::Json(json!({ "error": self.error_code() }));
        let mut response = (status, body).into_response();

        if let GatewayError::CircuitOpen { retry_after: wait, .. } = &self {
            // Whole seconds, rounded up so clients never come back early.
            let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }
        response
    }
}
