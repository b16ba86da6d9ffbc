//! Audit event destinations.

use std::time::Duration;

use async_trait::async_trait;

use crate::audit::AuditEvent;

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("collector request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("collector rejected event with status {0}")]
    Rejected(u16),

    #[error("event could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Somewhere audit events are delivered to.
#[async_trait]
pub trait AuditSink: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn deliver(&self, event: &AuditEvent) -> Result<(), AuditError>;
}

/// Writes each event as one structured log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl AuditSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let line = serde_json::to_string(event)?;
        tracing::info!(target: "audit", trace_id = %event.trace_id, event = %line, "audit");
        Ok(())
    }
}

/// POSTs each event as JSON to a collector endpoint.
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSink {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, AuditError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl AuditSink for HttpSink {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn deliver(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let response = self.client.post(&self.endpoint).json(event).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(AuditError::Rejected(status.as_u16()))
        }
    }
}
