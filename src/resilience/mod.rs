//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to upstream:
//!     → circuit_breaker.rs (fail fast if the upstream is known bad)
//!     → timeouts.rs (bound each attempt)
//!     → On failure: retries.rs (classify, back off, try again)
//!     → circuit_breaker.rs (one outcome report per forwarded request)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every upstream attempt has a deadline
//! - Only transient failures (timeouts, transport errors, 5xx) are retried
//! - Breaker state is per upstream, so one bad upstream degrades only its routes

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{Admission, BreakerRegistry, BreakerSnapshot, CircuitBreaker, CircuitState};
pub use retries::ForwardPolicy;
