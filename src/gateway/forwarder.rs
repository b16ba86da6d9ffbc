//! Route → breaker → bounded retry loop.
//!
//! Each call to [`ResilientForwarder::forward`] that gets past the breaker
//! reports exactly one outcome to it: success when any attempt produced a
//! non-5xx response or an oversized one, failure when every attempt failed.

use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{HeaderMap, Method};

use crate::error::GatewayError;
use crate::http::request::{RequestContext, X_REQUEST_ID};
use crate::observability::metrics;
use crate::resilience::retries::{classify, AttemptOutcome};
use crate::resilience::timeouts::with_timeout;
use crate::resilience::{Admission, BreakerRegistry, ForwardPolicy};
use crate::routing::Router;
use crate::upstream::{Upstream, UpstreamError, UpstreamRequest, UpstreamResponse};

/// An inbound request, buffered and ready to be replayed.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    /// Sanitized headers; trace and identity headers are added per attempt.
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ForwardRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}

pub struct ResilientForwarder {
    router: Arc<Router>,
    breakers: Arc<BreakerRegistry>,
    upstream: Arc<dyn Upstream>,
    identity_headers: HeaderMap,
}

impl ResilientForwarder {
    pub fn new(router: Arc<Router>, breakers: Arc<BreakerRegistry>, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            router,
            breakers,
            upstream,
            identity_headers: HeaderMap::new(),
        }
    }

    /// Headers stamped on every outbound attempt (service identity markers).
    pub fn with_identity_headers(mut self, headers: HeaderMap) -> Self {
        self.identity_headers = headers;
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    pub async fn forward(
        &self,
        ctx: &mut RequestContext,
        request: ForwardRequest,
        policy: &ForwardPolicy,
    ) -> Result<UpstreamResponse, GatewayError> {
        let route = self
            .router
            .resolve(&request.path)
            .ok_or_else(|| GatewayError::RouteNotFound {
                path: request.path.clone(),
            })?;
        let upstream_key = route.upstream_key();
        ctx.route = Some(route.name.clone());
        ctx.upstream = Some(upstream_key.to_string());

        let uri = route
            .upstream_uri(&request.path, request.query.as_deref())
            .map_err(|e| GatewayError::Internal(format!("building upstream uri: {e}")))?;

        let breaker = self.breakers.get(upstream_key);
        if let Admission::Denied { retry_after } = breaker.admit() {
            tracing::warn!(
                trace_id = %ctx.trace_id,
                route = %route.name,
                upstream = %upstream_key,
                retry_after = ?retry_after,
                "Circuit open, failing fast"
            );
            metrics::record_circuit_rejected(upstream_key);
            return Err(GatewayError::CircuitOpen {
                upstream: upstream_key.to_string(),
                retry_after,
                fallback: route.fallback.clone(),
            });
        }

        let headers = self.attempt_headers(request.headers, ctx);
        let mut last_error = None;

        for attempt in 0..policy.max_attempts() {
            if let Some(error) = &last_error {
                metrics::record_retry(upstream_key);
                tracing::info!(
                    trace_id = %ctx.trace_id,
                    upstream = %upstream_key,
                    attempt,
                    error = %error,
                    "Retrying upstream call"
                );
                let delay = policy.delay_before(attempt);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }

            ctx.attempt_count = attempt + 1;
            let call = self.upstream.call(UpstreamRequest {
                method: request.method.clone(),
                uri: uri.clone(),
                headers: headers.clone(),
                body: request.body.clone(),
            });

            match classify(with_timeout(policy.per_try_timeout, call).await) {
                AttemptOutcome::Done(response) => {
                    breaker.report_outcome(true);
                    tracing::debug!(
                        trace_id = %ctx.trace_id,
                        upstream = %upstream_key,
                        status = %response.status,
                        attempts = ctx.attempt_count,
                        "Upstream responded"
                    );
                    return Ok(response);
                }
                AttemptOutcome::Retry(error) => {
                    tracing::warn!(
                        trace_id = %ctx.trace_id,
                        upstream = %upstream_key,
                        attempt,
                        error = %error,
                        "Upstream attempt failed"
                    );
                    last_error = Some(error);
                }
                AttemptOutcome::Reject(error) => {
                    // The upstream answered; its health is not in question.
                    breaker.report_outcome(true);
                    tracing::warn!(
                        trace_id = %ctx.trace_id,
                        upstream = %upstream_key,
                        attempt,
                        error = %error,
                        "Upstream response rejected"
                    );
                    return Err(match error {
                        UpstreamError::ResponseTooLarge { limit } => GatewayError::UpstreamResponseTooLarge {
                            upstream: upstream_key.to_string(),
                            limit,
                        },
                        other => GatewayError::UpstreamUnavailable {
                            upstream: upstream_key.to_string(),
                            attempts: ctx.attempt_count,
                            last: other,
                        },
                    });
                }
            }
        }

        breaker.report_outcome(false);
        Err(GatewayError::UpstreamUnavailable {
            upstream: upstream_key.to_string(),
            attempts: ctx.attempt_count,
            last: last_error.unwrap_or_else(|| UpstreamError::Transport("no attempt was made".into())),
        })
    }

    fn attempt_headers(&self, mut headers: HeaderMap, ctx: &RequestContext) -> HeaderMap {
        headers.insert(X_REQUEST_ID, ctx.trace_id.header_value());
        for (name, value) in &self.identity_headers {
            headers.insert(name.clone(), value.clone());
        }
        headers
    }
}
