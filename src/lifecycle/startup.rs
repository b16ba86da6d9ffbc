//! Startup orchestration.
//!
//! Takes an already validated configuration and brings the gateway up in
//! dependency order, then blocks until shutdown has completed.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::audit::{self, AuditError};
use crate::config::GatewayConfig;
use crate::gateway::BuildError;
use crate::http::HttpServer;
use crate::lifecycle::shutdown::{drain, Shutdown};
use crate::lifecycle::signals::wait_for_signal;
use crate::observability::metrics;

/// How long the audit worker gets to flush its queue on the way out.
const AUDIT_DRAIN_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid metrics address '{0}'")]
    MetricsAddress(String),

    #[error("metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("audit sink: {0}")]
    Audit(#[from] AuditError),

    #[error("gateway: {0}")]
    Build(#[from] BuildError),

    #[error("listener: {0}")]
    Io(#[from] std::io::Error),
}

/// Run the gateway until SIGINT/SIGTERM.
pub async fn run(config: GatewayConfig) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::MetricsAddress(config.observability.metrics_address.clone()))?;
        metrics::init_metrics(addr)?;
    }

    let shutdown = Shutdown::new();
    let (audit, audit_worker) = audit::start(&config.audit, shutdown.subscribe())?;
    let server = HttpServer::new(&config, audit)?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        routes = config.routes.len(),
        auth = config.auth.enabled,
        rate_limit = config.rate_limit.enabled,
        audit = config.audit.enabled,
        "Gateway listening"
    );

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        trigger.trigger();
    });

    server.run(listener, shutdown.subscribe()).await?;

    if let Some(worker) = audit_worker {
        drain("audit", worker, AUDIT_DRAIN_DEADLINE).await;
    }
    Ok(())
}
