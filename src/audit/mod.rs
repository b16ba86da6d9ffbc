//! Audit trail of gateway decisions.
//!
//! # Data Flow
//! ```text
//! GatewayFront (terminal outcome of a request)
//!     → dispatcher.rs (bounded queue, never blocks the request)
//!     → worker task (bounded retries per event)
//!     → sink.rs (log line or HTTP collector)
//! ```
//!
//! Storage of events is the collector's business; the gateway only delivers.

pub mod dispatcher;
pub mod sink;

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::{AuditConfig, AuditSinkKind};

pub use dispatcher::{AuditDispatcher, DeliveryPolicy};
pub use sink::{AuditError, AuditSink, HttpSink, LogSink};

/// One request's outcome as seen by the gateway.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditEvent {
    pub trace_id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    pub client_key: String,
    pub method: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream: Option<String>,
    pub status: u16,
    /// "ok", "fallback" or the error code.
    pub outcome: String,
    pub attempts: u32,
    pub duration_ms: u64,
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Build the dispatcher described by `config`.
pub fn start(
    config: &AuditConfig,
    shutdown: broadcast::Receiver<()>,
) -> Result<(AuditDispatcher, Option<JoinHandle<()>>), AuditError> {
    if !config.enabled {
        return Ok((AuditDispatcher::disabled(), None));
    }

    let sink: Arc<dyn AuditSink> = match (config.sink, &config.endpoint) {
        (AuditSinkKind::Http, Some(endpoint)) => {
            Arc::new(HttpSink::new(endpoint, Duration::from_millis(config.timeout_ms))?)
        }
        (AuditSinkKind::Http, None) => {
            tracing::warn!("Audit http sink has no endpoint, logging events instead");
            Arc::new(LogSink)
        }
        (AuditSinkKind::Log, _) => Arc::new(LogSink),
    };

    let (dispatcher, worker) = AuditDispatcher::spawn(
        sink,
        config.queue_capacity,
        DeliveryPolicy::from_config(config),
        shutdown,
    );
    Ok((dispatcher, Some(worker)))
}
