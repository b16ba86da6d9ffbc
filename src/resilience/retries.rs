//! Retry policy.
//!
//! # Responsibilities
//! - Hold the per-call retry budget and per-try timeout
//! - Classify attempt outcomes as terminal or retryable
//!
//! # Design Decisions
//! - Connection errors, timeouts and 5xx are retryable
//! - 4xx is terminal: the request itself is wrong, not the upstream
//! - An oversized response body is terminal: the upstream did answer
//! - Attempts are sequential; the next starts only after the previous failed

use std::time::Duration;

use axum::http::StatusCode;

use crate::config::ForwarderConfig;
use crate::resilience::backoff::calculate_backoff;
use crate::upstream::{UpstreamError, UpstreamResponse};

/// How hard the forwarder tries for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardPolicy {
    /// Retries after the initial attempt; total attempts = max_retries + 1.
    pub max_retries: u32,
    pub per_try_timeout: Duration,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl ForwardPolicy {
    pub fn new(max_retries: u32, per_try_timeout: Duration) -> Self {
        Self {
            max_retries,
            per_try_timeout,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    pub fn from_config(config: &ForwarderConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            per_try_timeout: config.per_try_timeout(),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before the attempt numbered `attempt` (0-based).
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        calculate_backoff(
            attempt,
            self.base_delay.as_millis() as u64,
            self.max_delay.as_millis() as u64,
        )
    }
}

/// Returns true if the status must be retried.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
}

/// Outcome of a single attempt.
#[derive(Debug)]
pub enum AttemptOutcome {
    /// Stop retrying and hand this response back.
    Done(UpstreamResponse),
    /// Try again if attempts remain.
    Retry(UpstreamError),
    /// Stop retrying and fail, without counting against the upstream's health.
    Reject(UpstreamError),
}

/// Classify the result of one attempt.
pub fn classify(result: Result<UpstreamResponse, UpstreamError>) -> AttemptOutcome {
    match result {
        Ok(response) if is_retryable_status(response.status) => {
            AttemptOutcome::Retry(UpstreamError::ServerError(response.status))
        }
        Ok(response) => AttemptOutcome::Done(response),
        Err(e @ UpstreamError::ResponseTooLarge { .. }) => AttemptOutcome::Reject(e),
        Err(e) => AttemptOutcome::Retry(e),
    }
}
