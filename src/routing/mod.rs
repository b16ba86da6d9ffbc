//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → router.rs (route lookup)
//!     → matcher.rs (evaluate prefix conditions)
//!     → Return: matched Route or None
//!
//! Route compilation (at startup):
//!     RouteConfig[]
//!     → Parse upstream URLs and fallbacks
//!     → Freeze as immutable Router
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same path always resolves to the same route

pub mod matcher;
pub mod router;

pub use router::{Fallback, Route, Router, RouterError};
