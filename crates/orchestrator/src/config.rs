//! Run configuration.

use armada_resilience::BackoffPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for one orchestrator run.
///
/// Deserializable so the CLI can load it from a config file; every field
/// has a sensible default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Concurrency budget: how many agents run at once
    pub max_slots: usize,
    /// Dollar ceiling for the whole run
    pub budget_ceiling: f64,
    /// Model override passed to every agent
    pub model: Option<String>,
    /// Branch workspaces fork from and pull requests target
    pub base_branch: String,
    /// Namespace prefix for workspace branches
    pub branch_prefix: String,
    /// Per-invocation agent deadline, seconds
    pub agent_timeout_secs: u64,
    /// Retries after the first failure of a remote operation
    pub max_retries: u32,
    /// Consecutive failures before a breaker opens
    pub breaker_threshold: u32,
    /// Seconds an open breaker waits before probing again
    pub breaker_reset_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_slots: 3,
            budget_ceiling: 20.0,
            model: None,
            base_branch: "main".to_string(),
            branch_prefix: "armada".to_string(),
            agent_timeout_secs: 600,
            max_retries: 3,
            breaker_threshold: 5,
            breaker_reset_secs: 300,
        }
    }
}

impl RunConfig {
    /// Agent deadline as a duration.
    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }

    /// Breaker reset timeout as a duration.
    pub fn breaker_reset(&self) -> Duration {
        Duration::from_secs(self.breaker_reset_secs)
    }

    /// The backoff policy every boundary in this run uses.
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            max_retries: self.max_retries,
            ..BackoffPolicy::default()
        }
    }
}
