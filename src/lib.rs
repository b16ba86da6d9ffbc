//! Resilient API gateway.
//!
//! Authenticates callers, rate-limits them per client, routes by path prefix
//! and forwards to upstream services through per-upstream circuit breakers
//! with bounded, timed retries.

pub mod audit;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod routing;
pub mod security;
pub mod upstream;

pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use gateway::{GatewayFront, ResilientForwarder};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
