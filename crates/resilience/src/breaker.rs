//! Three-state circuit breaker.
//!
//! The open to half-open transition happens lazily inside [`CircuitBreaker::is_open`],
//! never via a background timer - deterministic under a paused test clock.

use std::time::Duration;
use tokio::time::Instant;

/// Breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls flow; failures are counted
    Closed,
    /// Calls are refused until the reset timeout elapses
    Open,
    /// One probe call decides: success closes, failure reopens
    HalfOpen,
}

/// Failure isolation for one upstream.
///
/// `is_open` is the only state-mutating query; `record_success` and
/// `record_failure` are the only other mutators.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: BreakerState,
    failures: u32,
    threshold: u32,
    reset_timeout: Duration,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    /// Create a closed breaker tripping after `threshold` consecutive
    /// failures, probing again after `reset_timeout`.
    pub fn new(threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            state: BreakerState::Closed,
            failures: 0,
            threshold,
            reset_timeout,
            opened_at: None,
        }
    }

    /// Whether calls must be refused right now.
    ///
    /// Queried while open after the reset timeout has elapsed, the breaker
    /// moves to half-open and lets one probe through.
    pub fn is_open(&mut self) -> bool {
        if self.state == BreakerState::Open {
            let elapsed = self
                .opened_at
                .map(|at| at.elapsed())
                .unwrap_or(Duration::ZERO);
            if elapsed >= self.reset_timeout {
                self.state = BreakerState::HalfOpen;
                return false;
            }
            return true;
        }
        false
    }

    /// Note a successful call: the failure counter resets and the breaker
    /// closes (a half-open probe succeeding closes it).
    pub fn record_success(&mut self) {
        self.failures = 0;
        self.state = BreakerState::Closed;
        self.opened_at = None;
    }

    /// Note a failed call. A half-open probe failing reopens immediately
    /// with a fresh timestamp; otherwise the counter climbs toward the
    /// threshold.
    pub fn record_failure(&mut self) {
        match self.state {
            BreakerState::HalfOpen => {
                self.state = BreakerState::Open;
                self.opened_at = Some(Instant::now());
            }
            _ => {
                self.failures += 1;
                if self.failures >= self.threshold {
                    self.state = BreakerState::Open;
                    self.opened_at = Some(Instant::now());
                }
            }
        }
    }

    /// Current state, without triggering the lazy transition.
    pub fn state(&self) -> BreakerState {
        self.state
    }

    /// Consecutive failures recorded since the last success.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}
