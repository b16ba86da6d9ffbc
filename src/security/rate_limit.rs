//! Per-client token bucket rate limiting.
//!
//! Each client key owns a bucket holding at most `capacity` tokens. The bucket
//! is refilled in full once `window` has elapsed since the window started;
//! there is no continuous drip.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::observability::metrics;

/// Token state for one client.
#[derive(Debug, Clone, Copy)]
struct ClientBucket {
    tokens: u32,
    window_start: Instant,
}

impl ClientBucket {
    fn new(capacity: u32, now: Instant) -> Self {
        Self {
            tokens: capacity,
            window_start: now,
        }
    }

    fn try_acquire(&mut self, capacity: u32, window: Duration, now: Instant) -> bool {
        if now.saturating_duration_since(self.window_start) >= window {
            self.tokens = capacity;
            self.window_start = now;
        }

        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }
}

/// Owns one bucket per client key.
///
/// Buckets are never evicted; a key seen once is kept for the life of the
/// limiter.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: DashMap<String, ClientBucket>,
    capacity: u32,
    window: Duration,
    enabled: bool,
}

impl RateLimiter {
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            buckets: DashMap::new(),
            capacity,
            window,
            enabled: true,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            ..Self::new(config.capacity, config.window())
        }
    }

    /// Take one token for `client_key`. Returns false when the bucket is empty.
    pub fn allow(&self, client_key: &str) -> bool {
        self.allow_at(client_key, Instant::now())
    }

    /// Same as [`allow`](Self::allow) against an explicit clock reading.
    pub fn allow_at(&self, client_key: &str, now: Instant) -> bool {
        if !self.enabled {
            return true;
        }

        // The shard lock is held while the entry guard lives, so the
        // check-and-decrement is atomic per key.
        let allowed = match self.buckets.get_mut(client_key) {
            Some(mut bucket) => bucket.try_acquire(self.capacity, self.window, now),
            None => self
                .buckets
                .entry(client_key.to_string())
                .or_insert_with(|| ClientBucket::new(self.capacity, now))
                .try_acquire(self.capacity, self.window, now),
        };

        if !allowed {
            tracing::warn!(client = %client_key, "Rate limit exceeded");
            metrics::record_rate_limited();
        }
        allowed
    }

    /// Remaining tokens for a client, if it has been seen.
    pub fn remaining(&self, client_key: &str) -> Option<u32> {
        self.buckets.get(client_key).map(|b| b.tokens)
    }

    /// Number of tracked client keys.
    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }
}
