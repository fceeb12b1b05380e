//! Attempt accounting for guarded operations.

use crate::classify::ErrorClass;
use std::collections::HashMap;
use std::sync::Mutex;

/// Counters for one operation label.
#[derive(Debug, Clone, Default)]
pub struct OperationStats {
    /// Attempts made, success or failure
    pub attempts: u64,
    /// Successful attempts
    pub successes: u64,
    /// Failed attempts
    pub failures: u64,
    /// Failures by classified type
    pub failures_by_class: HashMap<ErrorClass, u64>,
    /// Text of the most recent failure
    pub last_error: Option<String>,
}

/// Shared observer accumulating per-operation attempt outcomes.
///
/// Interior-locked so one instance can be handed to every boundary in the
/// process; mutations are synchronous and never held across an await.
#[derive(Debug, Default)]
pub struct ResilienceMetrics {
    stats: Mutex<HashMap<String, OperationStats>>,
}

impl ResilienceMetrics {
    /// Create an empty observer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Note a successful attempt of `label`.
    pub fn record_success(&self, label: &str) {
        if let Ok(mut stats) = self.stats.lock() {
            let entry = stats.entry(label.to_string()).or_default();
            entry.attempts += 1;
            entry.successes += 1;
        }
    }

    /// Note a failed attempt of `label` with its classified type.
    pub fn record_failure(&self, label: &str, class: ErrorClass, message: &str) {
        if let Ok(mut stats) = self.stats.lock() {
            let entry = stats.entry(label.to_string()).or_default();
            entry.attempts += 1;
            entry.failures += 1;
            *entry.failures_by_class.entry(class).or_insert(0) += 1;
            entry.last_error = Some(message.to_string());
        }
    }

    /// Counters for one label, if it was ever attempted.
    pub fn stats_for(&self, label: &str) -> Option<OperationStats> {
        self.stats
            .lock()
            .ok()
            .and_then(|stats| stats.get(label).cloned())
    }

    /// Copy of every label's counters.
    pub fn snapshot(&self) -> HashMap<String, OperationStats> {
        self.stats
            .lock()
            .map(|stats| stats.clone())
            .unwrap_or_default()
    }
}
