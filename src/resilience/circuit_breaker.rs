//! Circuit breaker for upstream protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: upstream assumed down, requests fail fast
//! - Half-Open: a single trial call tests whether the upstream recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= threshold
//! Open → Half-Open: first allow() after the cooldown (that call is the trial)
//! Half-Open → Closed: trial succeeds
//! Half-Open → Open: trial fails (fresh cooldown)
//! ```
//!
//! # Design Decisions
//! - One breaker per upstream, each behind its own mutex
//! - Outcomes reported while Open are stale and ignored
//! - A trial that never reports is replaced after one cooldown
//! - A denial carries its wait, computed under the same lock as the decision

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::config::BreakerConfig;
use crate::observability::metrics;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Gauge encoding: 0 = closed, 1 = half-open, 2 = open.
    pub fn as_gauge(self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }
}

/// Shortest wait a denied caller is told to observe.
const MIN_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Answer to "may this call proceed?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// Rejected; the breaker may admit a trial call after `retry_after`.
    Denied { retry_after: Duration },
}

impl Admission {
    pub fn is_allowed(self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub open_until: Option<Instant>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    open_until: Option<Instant>,
    trial_started: Option<Instant>,
}

/// Three-state circuit breaker for a single upstream.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold,
            cooldown,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                open_until: None,
                trial_started: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask whether a call may proceed. May move Open → Half-Open.
    pub fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    pub fn allow_at(&self, now: Instant) -> bool {
        self.admit_at(now).is_allowed()
    }

    /// Like [`allow`](Self::allow), but a denial says how long to wait.
    pub fn admit(&self) -> Admission {
        self.admit_at(Instant::now())
    }

    pub fn admit_at(&self, now: Instant) -> Admission {
        let mut inner = self.lock();
        let (state, open_until, trial_started) = (inner.state, inner.open_until, inner.trial_started);
        match state {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::Open => match open_until {
                Some(until) if now < until => denied(until, now),
                _ => {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_started = Some(now);
                    drop(inner);
                    self.transitioned(CircuitState::Open, CircuitState::HalfOpen);
                    Admission::Allowed
                }
            },
            CircuitState::HalfOpen => match trial_started {
                // Only one trial at a time, unless the outstanding one was abandoned.
                Some(started) if now < started + self.cooldown => denied(started + self.cooldown, now),
                _ => {
                    tracing::debug!(upstream = %self.name, "Replacing abandoned half-open trial");
                    inner.trial_started = Some(now);
                    Admission::Allowed
                }
            },
        }
    }

    /// Record the outcome of a call that `allow` admitted.
    pub fn report_outcome(&self, success: bool) {
        self.report_outcome_at(success, Instant::now())
    }

    pub fn report_outcome_at(&self, success: bool, now: Instant) {
        let mut inner = self.lock();
        let from = inner.state;

        match (inner.state, success) {
            (CircuitState::Closed, true) => {
                inner.consecutive_failures = 0;
            }
            (CircuitState::Closed, false) => {
                inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                if inner.consecutive_failures >= self.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.open_until = Some(now + self.cooldown);
                }
            }
            (CircuitState::HalfOpen, true) => {
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                inner.open_until = None;
                inner.trial_started = None;
            }
            (CircuitState::HalfOpen, false) => {
                inner.state = CircuitState::Open;
                inner.open_until = Some(now + self.cooldown);
                inner.trial_started = None;
            }
            (CircuitState::Open, _) => {
                tracing::trace!(upstream = %self.name, success, "Ignoring outcome reported while open");
            }
        }

        let to = inner.state;
        let failures = inner.consecutive_failures;
        drop(inner);

        if from != to {
            if to == CircuitState::Open {
                tracing::warn!(
                    upstream = %self.name,
                    failures,
                    threshold = self.failure_threshold,
                    cooldown = ?self.cooldown,
                    "Circuit breaker opened"
                );
            }
            self.transitioned(from, to);
        }
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            open_until: inner.open_until,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    fn transitioned(&self, from: CircuitState, to: CircuitState) {
        tracing::info!(upstream = %self.name, ?from, ?to, "Circuit breaker state change");
        metrics::record_breaker_state(&self.name, to);
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        // The state is plain data and always left consistent, so a poisoned
        // lock is still usable.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn denied(next_trial: Instant, now: Instant) -> Admission {
    Admission::Denied {
        retry_after: next_trial.saturating_duration_since(now).max(MIN_RETRY_AFTER),
    }
}

/// Owns one breaker per upstream key.
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    failure_threshold: u32,
    cooldown: Duration,
}

impl BreakerRegistry {
    pub fn new(config: &BreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            failure_threshold: config.failure_threshold,
            cooldown: config.cooldown(),
        }
    }

    /// Create a registry with breakers for the given upstreams already in place.
    pub fn with_upstreams<'a>(config: &BreakerConfig, upstreams: impl IntoIterator<Item = &'a str>) -> Self {
        let registry = Self::new(config);
        for key in upstreams {
            registry.get(key);
        }
        registry
    }

    /// Breaker for `upstream`, created on first use.
    pub fn get(&self, upstream: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.get(upstream) {
            return breaker.clone();
        }
        self.breakers
            .entry(upstream.to_string())
            .or_insert_with(|| {
                metrics::record_breaker_state(upstream, CircuitState::Closed);
                Arc::new(CircuitBreaker::new(upstream, self.failure_threshold, self.cooldown))
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Snapshot of every breaker, keyed by upstream.
    pub fn snapshots(&self) -> HashMap<String, BreakerSnapshot> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new("risk", 3, Duration::from_secs(10))
    }

    fn trip(cb: &CircuitBreaker, now: Instant) {
        for _ in 0..3 {
            assert!(cb.allow_at(now));
            cb.report_outcome_at(false, now);
        }
    }

    #[test]
    fn opens_after_threshold_failures() {
        let cb = breaker();
        let now = Instant::now();

        cb.report_outcome_at(false, now);
        cb.report_outcome_at(false, now);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow_at(now));

        cb.report_outcome_at(false, now);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow_at(now));
    }

    #[test]
    fn success_resets_failure_count() {
        let cb = breaker();
        let now = Instant::now();

        cb.report_outcome_at(false, now);
        cb.report_outcome_at(false, now);
        cb.report_outcome_at(true, now);
        assert_eq!(cb.snapshot().consecutive_failures, 0);

        cb.report_outcome_at(false, now);
        cb.report_outcome_at(false, now);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn denies_until_cooldown_then_half_opens() {
        let cb = breaker();
        let start = Instant::now();
        trip(&cb, start);

        assert!(!cb.allow_at(start + Duration::from_secs(1)));
        assert!(!cb.allow_at(start + Duration::from_millis(9_999)));
        assert_eq!(
            cb.admit_at(start + Duration::from_secs(4)),
            Admission::Denied {
                retry_after: Duration::from_secs(6)
            }
        );

        assert!(cb.allow_at(start + Duration::from_secs(11)));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn single_trial_call_in_half_open() {
        let cb = breaker();
        let start = Instant::now();
        trip(&cb, start);

        let trial_time = start + Duration::from_secs(10);
        assert!(cb.allow_at(trial_time));
        assert!(!cb.allow_at(trial_time));
        assert!(!cb.allow_at(trial_time + Duration::from_secs(1)));

        cb.report_outcome_at(true, trial_time + Duration::from_secs(1));
        let snap = cb.snapshot();
        assert_eq!(snap.state, CircuitState::Closed);
        assert_eq!(snap.consecutive_failures, 0);
        assert!(cb.allow_at(trial_time + Duration::from_secs(1)));
    }

    #[test]
    fn denial_during_half_open_waits_for_the_outstanding_trial() {
        let cb = breaker();
        let start = Instant::now();
        trip(&cb, start);

        let trial_time = start + Duration::from_secs(10);
        assert_eq!(cb.admit_at(trial_time), Admission::Allowed);
        assert_eq!(
            cb.admit_at(trial_time + Duration::from_secs(3)),
            Admission::Denied {
                retry_after: Duration::from_secs(7)
            }
        );
        assert_eq!(
            cb.admit_at(trial_time + Duration::from_millis(9_800)),
            Admission::Denied {
                retry_after: MIN_RETRY_AFTER
            }
        );
    }

    #[test]
    fn open_denial_never_asks_for_less_than_a_second() {
        let cb = breaker();
        let start = Instant::now();
        trip(&cb, start);

        assert_eq!(
            cb.admit_at(start + Duration::from_millis(9_999)),
            Admission::Denied {
                retry_after: MIN_RETRY_AFTER
            }
        );
    }

    #[test]
    fn half_open_failure_reopens_with_fresh_cooldown() {
        let cb = breaker();
        let start = Instant::now();
        trip(&cb, start);

        let trial_time = start + Duration::from_secs(12);
        assert!(cb.allow_at(trial_time));
        cb.report_outcome_at(false, trial_time);

        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow_at(trial_time + Duration::from_secs(9)));
        assert!(cb.allow_at(trial_time + Duration::from_secs(10)));
    }

    #[test]
    fn abandoned_trial_is_replaced_after_cooldown() {
        let cb = breaker();
        let start = Instant::now();
        trip(&cb, start);

        let trial_time = start + Duration::from_secs(10);
        assert!(cb.allow_at(trial_time));
        assert!(!cb.allow_at(trial_time + Duration::from_secs(5)));
        assert!(cb.allow_at(trial_time + Duration::from_secs(10)));
        assert!(!cb.allow_at(trial_time + Duration::from_secs(11)));
    }

    #[test]
    fn outcomes_while_open_are_ignored() {
        let cb = breaker();
        let start = Instant::now();
        trip(&cb, start);

        cb.report_outcome_at(false, start + Duration::from_secs(5));
        cb.report_outcome_at(true, start + Duration::from_secs(5));

        let snap = cb.snapshot();
        assert_eq!(snap.state, CircuitState::Open);
        assert_eq!(snap.open_until, Some(start + Duration::from_secs(10)));
    }

    #[test]
    fn registry_creates_breakers_lazily_and_shares_them() {
        let registry = BreakerRegistry::with_upstreams(&BreakerConfig::default(), ["http://a:1"]);
        assert_eq!(registry.len(), 1);

        let b1 = registry.get("http://b:2");
        let b2 = registry.get("http://b:2");
        assert!(Arc::ptr_eq(&b1, &b2));
        assert_eq!(registry.len(), 2);

        b1.report_outcome(false);
        assert_eq!(registry.snapshots()["http://b:2"].consecutive_failures, 1);
        assert_eq!(registry.snapshots()["http://a:1"].consecutive_failures, 0);
    }
}
