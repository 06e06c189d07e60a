//! Backoff and attempt counting for CSR retries.
//!
//! The policy is a pure function of the attempt count and the configured
//! limits; it performs no I/O and never sleeps. The lifecycle engine owns a
//! [`RetryState`] and consults the policy after each failed attempt.
//!
//! Intervals double on every failure. There is no ceiling unless
//! [`RetryPolicy::with_max_interval`] is used, so callers must keep
//! `max_attempts` small enough for the largest wait to stay reasonable.

use std::time::Duration;

use crate::constants::{DEFAULT_CSR_INITIAL_RETRY_INTERVAL, DEFAULT_CSR_MAX_RETRIES};

/// Retry configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    initial_interval: Duration,
    max_attempts: u32,
    max_interval: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_CSR_INITIAL_RETRY_INTERVAL, DEFAULT_CSR_MAX_RETRIES)
    }
}

impl RetryPolicy {
    /// Creates a policy that starts at `initial_interval` and gives up once
    /// `max_attempts` failures have been recorded.
    pub const fn new(initial_interval: Duration, max_attempts: u32) -> Self {
        Self {
            initial_interval,
            max_attempts,
            max_interval: None,
        }
    }

    /// Caps interval growth at `max_interval`.
    #[must_use]
    pub const fn with_max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = Some(max_interval);
        self
    }

    /// Delay before the first retry.
    pub const fn initial_interval(&self) -> Duration {
        self.initial_interval
    }

    /// Number of recorded failures after which retrying stops.
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Interval ceiling, if any.
    pub const fn max_interval(&self) -> Option<Duration> {
        self.max_interval
    }

    /// A state with zero attempts and the initial interval.
    pub fn initial_state(&self) -> RetryState {
        RetryState {
            attempts: 0,
            interval: self.initial_interval,
        }
    }

    /// Returns the interval to wait for the next retry and whether the attempt
    /// budget is exhausted.
    ///
    /// `exhausted` is `true` once `attempts >= max_attempts` and stays `true`
    /// for every later state, since attempts only grow until [`reset`](Self::reset).
    pub fn next_interval(&self, state: &RetryState) -> (Duration, bool) {
        (state.interval, state.attempts >= self.max_attempts)
    }

    /// Records one failure: one more attempt and a doubled interval.
    pub fn record_failure(&self, state: &mut RetryState) {
        state.attempts = state.attempts.saturating_add(1);
        let doubled = state.interval.saturating_mul(2);
        state.interval = match self.max_interval {
            Some(max) => doubled.min(max),
            None => doubled,
        };
    }

    /// Restores the initial state after a successful renewal.
    pub fn reset(&self, state: &mut RetryState) {
        *state = self.initial_state();
    }
}

/// Mutable retry bookkeeping owned by the lifecycle engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    attempts: u32,
    interval: Duration,
}

impl RetryState {
    /// Failures recorded since the last reset.
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Interval the next retry will wait.
    pub const fn interval(&self) -> Duration {
        self.interval
    }
}
