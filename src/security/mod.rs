//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → auth.rs (check the pre-shared API key)
//!     → headers.rs (derive client key)
//!     → rate_limit.rs (per-client token bucket)
//!     → headers.rs (sanitize, add X-Forwarded-For) on the way upstream
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - Rejections never touch upstream or breaker state

pub mod auth;
pub mod headers;
pub mod rate_limit;

pub use auth::ApiKeyAuth;
pub use rate_limit::RateLimiter;
