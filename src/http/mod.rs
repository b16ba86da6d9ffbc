//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, peer address, tracing)
//!     → request.rs (trace id, per-request context)
//!     → gateway (auth, limits, routing, forwarding)
//!     → response.rs (relay, fallback, trace id header)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestContext, TraceId, X_REQUEST_ID};
pub use response::X_GATEWAY_FALLBACK;
pub use server::HttpServer;
