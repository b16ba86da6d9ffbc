//! Per-request pipeline at the edge of the gateway.
//!
//! ```text
//! inbound request
//!     → auth (401)
//!     → rate limit by client key (429)
//!     → trace id, body buffering (413)
//!     → ResilientForwarder (404 / 503 or fallback / 502)
//!     → relay upstream response
//! ```
//!
//! Every response, successful or not, carries `X-Request-ID`. Each terminal
//! outcome is counted in metrics and handed to the audit dispatcher.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::audit::{now_millis, AuditDispatcher, AuditEvent};
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::gateway::forwarder::{ForwardRequest, ResilientForwarder};
use crate::gateway::{identity_headers, BuildError};
use crate::http::request::{RequestContext, TraceId};
use crate::http::response;
use crate::observability::metrics;
use crate::resilience::{BreakerRegistry, ForwardPolicy};
use crate::routing::Router;
use crate::security::headers::{client_key, outbound_headers};
use crate::security::{ApiKeyAuth, RateLimiter};
use crate::upstream::Upstream;

const DEFAULT_MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

pub struct GatewayFront {
    auth: ApiKeyAuth,
    limiter: RateLimiter,
    forwarder: ResilientForwarder,
    policy: ForwardPolicy,
    max_body_size: usize,
    audit: AuditDispatcher,
}

impl GatewayFront {
    pub fn new(auth: ApiKeyAuth, limiter: RateLimiter, forwarder: ResilientForwarder, policy: ForwardPolicy) -> Self {
        Self {
            auth,
            limiter,
            forwarder,
            policy,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            audit: AuditDispatcher::disabled(),
        }
    }

    /// Wire every component from a validated configuration.
    pub fn from_config(
        config: &GatewayConfig,
        upstream: Arc<dyn Upstream>,
        audit: AuditDispatcher,
    ) -> Result<Self, BuildError> {
        let router = Router::from_config(&config.routes)?;
        let breakers = BreakerRegistry::with_upstreams(&config.breaker, router.upstream_keys());
        let forwarder = ResilientForwarder::new(Arc::new(router), Arc::new(breakers), upstream)
            .with_identity_headers(identity_headers(&config.forwarder.identity_headers)?);

        Ok(Self::new(
            ApiKeyAuth::from_config(&config.auth),
            RateLimiter::from_config(&config.rate_limit),
            forwarder,
            ForwardPolicy::from_config(&config.forwarder),
        )
        .with_max_body_size(config.security.max_body_size)
        .with_audit(audit))
    }

    pub fn with_max_body_size(mut self, limit: usize) -> Self {
        self.max_body_size = limit;
        self
    }

    pub fn with_audit(mut self, audit: AuditDispatcher) -> Self {
        self.audit = audit;
        self
    }

    pub fn forwarder(&self) -> &ResilientForwarder {
        &self.forwarder
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Run one request through the gateway. Never fails: errors become responses.
    pub async fn handle(&self, request: Request<Body>, peer: Option<SocketAddr>) -> Response {
        let start = Instant::now();
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let mut ctx = RequestContext::new(
            TraceId::from_headers(request.headers()),
            client_key(request.headers(), peer),
        );

        let (response, outcome) = match self.process(&mut ctx, request, peer).await {
            Ok(response) => (response, "ok"),
            Err(GatewayError::CircuitOpen {
                fallback: Some(fallback),
                upstream,
                ..
            }) => {
                tracing::info!(trace_id = %ctx.trace_id, upstream = %upstream, "Serving route fallback");
                (response::fallback(fallback), "fallback")
            }
            Err(err) => {
                if err.is_client_error() {
                    tracing::debug!(trace_id = %ctx.trace_id, path = %path, error = %err, "Request rejected");
                } else {
                    tracing::warn!(trace_id = %ctx.trace_id, path = %path, error = %err, "Request failed");
                }
                let code = err.error_code();
                (err.into_response(), code)
            }
        };

        let response = response::with_trace_id(response, &ctx.trace_id);
        let status = response.status();
        metrics::record_request(ctx.route.as_deref().unwrap_or("none"), status.as_u16(), start);
        self.emit_audit(&ctx, &method, &path, status, outcome, start);

        tracing::info!(
            trace_id = %ctx.trace_id,
            method = %method,
            path = %path,
            status = status.as_u16(),
            attempts = ctx.attempt_count,
            duration_ms = start.elapsed().as_millis() as u64,
            "Request completed"
        );
        response
    }

    async fn process(
        &self,
        ctx: &mut RequestContext,
        request: Request<Body>,
        peer: Option<SocketAddr>,
    ) -> Result<Response, GatewayError> {
        self.auth.verify(request.headers())?;

        if !self.limiter.allow(&ctx.client_key) {
            return Err(GatewayError::RateLimited {
                client: ctx.client_key.clone(),
            });
        }

        let (parts, body) = request.into_parts();
        let body = axum::body::to_bytes(body, self.max_body_size)
            .await
            .map_err(|e| {
                tracing::debug!(trace_id = %ctx.trace_id, error = %e, "Could not buffer request body");
                GatewayError::PayloadTooLarge {
                    limit: self.max_body_size,
                }
            })?;

        let forward = ForwardRequest {
            headers: outbound_headers(&parts.headers, peer, self.auth.header()),
            method: parts.method,
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            body,
        };

        let upstream = self.forwarder.forward(ctx, forward, &self.policy).await?;
        Ok(response::relay(upstream))
    }

    fn emit_audit(
        &self,
        ctx: &RequestContext,
        method: &Method,
        path: &str,
        status: StatusCode,
        outcome: &str,
        start: Instant,
    ) {
        if !self.audit.is_enabled() {
            return;
        }

        self.audit.emit(AuditEvent {
            trace_id: ctx.trace_id.to_string(),
            timestamp_ms: now_millis(),
            client_key: ctx.client_key.clone(),
            method: method.to_string(),
            path: path.to_string(),
            route: ctx.route.clone(),
            upstream: ctx.upstream.clone(),
            status: status.as_u16(),
            outcome: outcome.to_string(),
            attempts: ctx.attempt_count,
            duration_ms: start.elapsed().as_millis() as u64,
        });
    }
}
