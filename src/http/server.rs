//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router that sends every path to the gateway
//! - Wire up middleware (request tracing)
//! - Serve with peer addresses attached and graceful shutdown

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::audit::AuditDispatcher;
use crate::config::GatewayConfig;
use crate::gateway::{BuildError, GatewayFront};
use crate::upstream::HyperUpstream;

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    front: Arc<GatewayFront>,
}

impl HttpServer {
    /// Build a server that forwards over the pooled hyper client.
    pub fn new(config: &GatewayConfig, audit: AuditDispatcher) -> Result<Self, BuildError> {
        let upstream = Arc::new(HyperUpstream::new(config.security.max_body_size));
        let front = GatewayFront::from_config(config, upstream, audit)?;
        Ok(Self::from_front(Arc::new(front)))
    }

    pub fn from_front(front: Arc<GatewayFront>) -> Self {
        let router = Self::build_router(front.clone());
        Self { router, front }
    }

    fn build_router(front: Arc<GatewayFront>) -> Router {
        Router::new()
            .route("/{*path}", any(gateway_handler))
            .route("/", any(gateway_handler))
            .with_state(front)
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
    }

    /// The Axum router, for serving elsewhere or driving with `oneshot`.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn front(&self) -> &GatewayFront {
        &self.front
    }

    /// Serve until `shutdown` fires, then let in-flight requests finish.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn gateway_handler(State(front): State<Arc<GatewayFront>>, request: Request<Body>) -> Response {
    // Absent when driven without a socket (tests).
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    front.handle(request, peer).await
}
