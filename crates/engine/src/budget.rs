//! Dollar budget gating for agent work.
//!
//! The gate runs before work starts, never after: a task is admitted only
//! when a conservative estimate of its cost fits under the ceiling.

use armada_core::OrchestrateError;

/// Tracks cumulative spend and realized per-task costs against a ceiling.
#[derive(Debug, Clone)]
pub struct BudgetTracker {
    ceiling: f64,
    spent: f64,
    history: Vec<f64>,
}

/// Summary statistics over the realized cost history.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BudgetStatistics {
    /// Cheapest recorded task
    pub min: f64,
    /// Most expensive recorded task
    pub max: f64,
    /// Arithmetic mean
    pub mean: f64,
    /// Median of the sorted history
    pub median: f64,
    /// 90th percentile of the sorted history
    pub p90: f64,
    /// Total recorded spend
    pub total: f64,
}

impl BudgetTracker {
    /// Create a tracker with the given dollar ceiling.
    pub fn new(ceiling: f64) -> Self {
        Self {
            ceiling,
            spent: 0.0,
            history: Vec::new(),
        }
    }

    /// The configured ceiling.
    pub fn ceiling(&self) -> f64 {
        self.ceiling
    }

    /// Cumulative recorded spend.
    pub fn spent(&self) -> f64 {
        self.spent
    }

    /// Budget still available.
    pub fn remaining(&self) -> f64 {
        (self.ceiling - self.spent).max(0.0)
    }

    /// Pre-flight gate: errors when `spent + estimated` would exceed the
    /// ceiling. Spending exactly to the ceiling is allowed.
    pub fn can_afford(&self, estimated: f64, task: Option<u64>) -> Result<(), OrchestrateError> {
        let projected = self.spent + estimated;
        if projected > self.ceiling {
            return Err(OrchestrateError::BudgetExceeded {
                spent: self.spent,
                ceiling: self.ceiling,
                overage: projected - self.ceiling,
                task,
            });
        }
        Ok(())
    }

    /// Record a realized cost after work completed.
    pub fn record_cost(&mut self, actual: f64) {
        self.history.push(actual);
        self.spent += actual;
    }

    /// Conservative estimate of the next task's cost.
    ///
    /// No history: the ceiling itself, forcing a one-task-at-a-time posture
    /// until data exists. One or two samples: the mean. Three or more: the
    /// 90th percentile, biased high so one expensive outlier does not
    /// under-provision the next.
    pub fn estimate_next_task_cost(&self) -> f64 {
        match self.history.len() {
            0 => self.ceiling,
            1 | 2 => self.history.iter().sum::<f64>() / self.history.len() as f64,
            n => {
                let mut sorted = self.history.clone();
                sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                let idx = ((0.9 * n as f64).ceil() as usize).saturating_sub(1);
                sorted[idx.min(n - 1)]
            }
        }
    }

    /// Whether `n` more tasks fit the remaining budget at the current
    /// estimate.
    pub fn can_afford_tasks(&self, n: usize) -> bool {
        self.estimate_next_task_cost() * n as f64 <= self.remaining()
    }

    /// Statistics over the cost history; all zero when empty.
    pub fn statistics(&self) -> BudgetStatistics {
        if self.history.is_empty() {
            return BudgetStatistics::default();
        }

        let mut sorted = self.history.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let n = sorted.len();
        let total: f64 = sorted.iter().sum();
        let median = if n % 2 == 0 {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        } else {
            sorted[n / 2]
        };
        let p90_idx = ((0.9 * n as f64).ceil() as usize).saturating_sub(1);

        BudgetStatistics {
            min: sorted[0],
            max: sorted[n - 1],
            mean: total / n as f64,
            median,
            p90: sorted[p90_idx.min(n - 1)],
            total,
        }
    }
}
