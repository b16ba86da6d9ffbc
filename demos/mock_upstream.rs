//! A pretend upstream for trying the gateway by hand.
//!
//! Fails on a fixed schedule instead of at random, so breaker behaviour is
//! reproducible:
//!
//! ```text
//! cargo run --example mock_upstream -- --port 7001 --fail-every 3
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::any, Json, Router};
use clap::Parser;
use serde_json::{json, Value};

#[derive(Parser, Debug, Clone)]
struct Args {
    #[arg(long, default_value_t = 7001)]
    port: u16,

    /// Name reported in responses.
    #[arg(long, default_value = "users")]
    name: String,

    /// Answer 500 on every Nth request (0 disables).
    #[arg(long, default_value_t = 0)]
    fail_every: u64,

    /// Sleep this long before answering.
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,
}

struct Upstream {
    args: Args,
    served: AtomicU64,
}

async fn handle(State(upstream): State<Arc<Upstream>>, uri: axum::http::Uri) -> (StatusCode, Json<Value>) {
    let n = upstream.served.fetch_add(1, Ordering::SeqCst) + 1;
    if upstream.args.delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(upstream.args.delay_ms)).await;
    }

    let every = upstream.args.fail_every;
    if every > 0 && n % every == 0 {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "service": upstream.args.name, "error": "scheduled failure", "request": n })),
        );
    }

    (
        StatusCode::OK,
        Json(json!({ "service": upstream.args.name, "path": uri.path(), "request": n })),
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));
    let state = Arc::new(Upstream {
        args,
        served: AtomicU64::new(0),
    });

    let app = Router::new()
        .route("/", any(handle))
        .route("/{*path}", any(handle))
        .with_state(state);

    println!("mock upstream listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
