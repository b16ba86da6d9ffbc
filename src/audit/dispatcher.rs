//! Detached delivery of audit events.
//!
//! Requests hand events to a bounded queue and move on. One worker task drains
//! the queue, retrying each delivery a bounded number of times; an event that
//! still fails is logged once and dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::audit::sink::AuditSink;
use crate::audit::AuditEvent;
use crate::config::AuditConfig;
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;

/// Retry budget for a single event.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl DeliveryPolicy {
    pub fn from_config(config: &AuditConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            attempt_timeout: Duration::from_millis(config.timeout_ms),
            ..Self::default()
        }
    }
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(1),
            base_delay_ms: 100,
            max_delay_ms: 1000,
        }
    }
}

/// Non-blocking handle for emitting audit events.
#[derive(Debug, Clone, Default)]
pub struct AuditDispatcher {
    tx: Option<mpsc::Sender<AuditEvent>>,
}

impl AuditDispatcher {
    /// A dispatcher that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Start the delivery worker. It exits after draining the queue once
    /// `shutdown` fires or every dispatcher handle is dropped.
    pub fn spawn(
        sink: Arc<dyn AuditSink>,
        capacity: usize,
        policy: DeliveryPolicy,
        shutdown: broadcast::Receiver<()>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(sink, rx, policy, shutdown));
        (Self { tx: Some(tx) }, worker)
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Queue an event without waiting. Returns false if it was dropped.
    pub fn emit(&self, event: AuditEvent) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };

        match tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(trace_id = %event.trace_id, "Audit queue full, dropping event");
                metrics::record_audit_dropped("queue_full");
                false
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                tracing::debug!(trace_id = %event.trace_id, "Audit worker stopped, dropping event");
                metrics::record_audit_dropped("closed");
                false
            }
        }
    }
}

async fn run_worker(
    sink: Arc<dyn AuditSink>,
    mut rx: mpsc::Receiver<AuditEvent>,
    policy: DeliveryPolicy,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::info!(sink = sink.name(), "Audit worker started");

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => deliver(sink.as_ref(), &event, policy).await,
                None => break,
            },
            _ = shutdown.recv() => {
                rx.close();
                while let Some(event) = rx.recv().await {
                    deliver(sink.as_ref(), &event, policy).await;
                }
                break;
            }
        }
    }

    tracing::info!("Audit worker stopped");
}

async fn deliver(sink: &dyn AuditSink, event: &AuditEvent, policy: DeliveryPolicy) {
    let mut last_error = String::new();

    for attempt in 1..=policy.max_attempts {
        match tokio::time::timeout(policy.attempt_timeout, sink.deliver(event)).await {
            Ok(Ok(())) => return,
            Ok(Err(e)) => last_error = e.to_string(),
            Err(_) => last_error = format!("timed out after {:?}", policy.attempt_timeout),
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(calculate_backoff(attempt, policy.base_delay_ms, policy.max_delay_ms)).await;
        }
    }

    tracing::warn!(
        trace_id = %event.trace_id,
        sink = sink.name(),
        attempts = policy.max_attempts,
        error = %last_error,
        "Dropping audit event after failed delivery"
    );
    metrics::record_audit_dropped("delivery_failed");
}
