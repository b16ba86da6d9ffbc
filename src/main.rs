//! Resilient API gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────────┐
//!                  │                      GATEWAY                          │
//!  Client Request  │  ┌────────┐   ┌───────────┐   ┌──────────────────┐   │
//!  ────────────────┼─▶│  http  │──▶│   front   │──▶│    forwarder     │   │
//!                  │  │ server │   │ auth/rate │   │ route → breaker  │   │
//!                  │  └────────┘   │ trace/body│   │ → retry/timeout  │   │
//!                  │               └───────────┘   └────────┬─────────┘   │
//!                  │                                        ▼             │
//!  Client Response │  ┌──────────┐                 ┌──────────────┐      │
//!  ◀───────────────┼──│ response │◀────────────────│   upstream   │◀─────┼── Upstream
//!                  │  │ relay /  │                 │ hyper client │      │   Service
//!                  │  │ fallback │                 └──────────────┘      │
//!                  │  └──────────┘                                       │
//!                  │  config · observability · audit · lifecycle          │
//!                  └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use resilient_gateway::config::{load_config, GatewayConfig};
use resilient_gateway::lifecycle;
use resilient_gateway::observability::logging::init_logging;

#[derive(Parser, Debug)]
#[command(name = "resilient-gateway", version, about = "Resilient API gateway")]
struct Args {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    if args.check {
        println!("configuration ok: {} route(s)", config.routes.len());
        return Ok(());
    }

    init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "resilient-gateway starting");

    if config.auth.enabled && config.auth.api_key == resilient_gateway::config::schema::DEFAULT_API_KEY {
        tracing::warn!("Using the default API key; set auth.api_key before exposing the gateway");
    }

    lifecycle::run(config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
