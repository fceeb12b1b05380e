//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Attempts allowed after the first failure
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Ceiling on any single delay, before jitter
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Attempt counter over a [`BackoffPolicy`].
///
/// `next_delay` returning `None` is the caller's stop signal - attempts
/// are exhausted. It is never an error by itself.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    policy: BackoffPolicy,
    attempt: u32,
}

impl ExponentialBackoff {
    /// Start a fresh attempt counter.
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Delay before the next retry: `min(base * 2^attempt, cap)` plus
    /// uniform jitter in [0, 25%] of that value. `None` once retries are
    /// exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.policy.max_retries {
            return None;
        }

        let base_ms = self.policy.base_delay.as_millis() as f64;
        let cap_ms = self.policy.max_delay.as_millis() as f64;
        let raw_ms = (base_ms * 2f64.powi(self.attempt as i32)).min(cap_ms);
        let jitter = raw_ms * rand::thread_rng().gen_range(0.0..=0.25);

        self.attempt += 1;
        Some(Duration::from_millis((raw_ms + jitter) as u64))
    }

    /// Attempts consumed so far.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Reset after a success, so a later failure starts the schedule over.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
