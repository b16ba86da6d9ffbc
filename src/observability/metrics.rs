//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by route, status
//! - `gateway_request_duration_seconds` (histogram): latency by route
//! - `gateway_rate_limited_total` (counter): rejected by the rate limiter
//! - `gateway_upstream_retries_total` (counter): retries by upstream
//! - `gateway_circuit_rejections_total` (counter): fail-fast by upstream
//! - `gateway_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `gateway_audit_dropped_total` (counter): audit events lost, by reason
//!
//! Metrics are held in memory and scraped over HTTP; nothing is persisted.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::resilience::CircuitState;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(route: &str, status: u16, start: Instant) {
    let route = route.to_string();
    ::metrics::counter!(
        "gateway_requests_total",
        "route" => route.clone(),
        "status" => status.to_string()
    )
    .increment(1);
    ::metrics::histogram!("gateway_request_duration_seconds", "route" => route)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited() {
    ::metrics::counter!("gateway_rate_limited_total").increment(1);
}

pub fn record_retry(upstream: &str) {
    ::metrics::counter!("gateway_upstream_retries_total", "upstream" => upstream.to_string()).increment(1);
}

pub fn record_circuit_rejected(upstream: &str) {
    ::metrics::counter!("gateway_circuit_rejections_total", "upstream" => upstream.to_string()).increment(1);
}

pub fn record_breaker_state(upstream: &str, state: CircuitState) {
    ::metrics::gauge!("gateway_breaker_state", "upstream" => upstream.to_string()).set(state.as_gauge());
}

pub fn record_audit_dropped(reason: &'static str) {
    ::metrics::counter!("gateway_audit_dropped_total", "reason" => reason).increment(1);
}
