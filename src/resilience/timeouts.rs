//! Per-attempt timeout enforcement.
//!
//! The in-flight call is dropped when the deadline passes, so an upstream that
//! hangs cannot hold the request beyond `per_try_timeout`.

use std::future::Future;
use std::time::Duration;

use crate::upstream::{UpstreamError, UpstreamResponse};

/// Run one upstream attempt with a hard deadline.
pub async fn with_timeout<F>(limit: Duration, call: F) -> Result<UpstreamResponse, UpstreamError>
where
    F: Future<Output = Result<UpstreamResponse, UpstreamError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(UpstreamError::Timeout(limit)),
    }
}
