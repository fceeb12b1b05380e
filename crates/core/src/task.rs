//! Task model - the core unit of work in Armada.

use crate::domain::Domain;
use crate::Time;
use serde::{Deserialize, Serialize};

/// A task represents one independent work item: an issue pulled from the
/// tracker, or one step of a decomposed directive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Tracker issue number, or a synthetic id for decomposed tasks
    pub id: u64,

    /// Task title
    pub title: String,

    /// Detailed description
    pub body: String,

    /// Tracker labels
    pub labels: Vec<String>,

    /// Assigned semantic domain
    pub domain: Domain,

    /// Current status
    pub status: TaskStatus,

    /// Realized agent cost, set after execution succeeds
    pub cost_usd: Option<f64>,

    /// Ids of tasks that must complete before this one starts
    pub depends_on: Vec<u64>,

    /// Planner-assigned complexity, when decomposed from a directive
    pub complexity: Option<Complexity>,

    /// Error text when the task ended in failure
    pub error: Option<String>,

    /// Creation timestamp
    pub created_at: Time,

    /// Last update timestamp
    pub updated_at: Time,
}

impl Task {
    /// Create a pending task with no domain assigned yet.
    pub fn new(id: u64, title: impl Into<String>, body: impl Into<String>, labels: Vec<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            id,
            title: title.into(),
            body: body.into(),
            labels,
            domain: Domain::Unknown,
            status: TaskStatus::Pending,
            cost_usd: None,
            depends_on: Vec::new(),
            complexity: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Title and body joined, the text the conflict detector scans.
    pub fn combined_text(&self) -> String {
        format!("{}\n{}", self.title, self.body)
    }

    /// Whether the task reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// Task lifecycle. Tasks are never deleted, only driven to a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Queued, waiting for a slot
    Pending,
    /// Occupying a slot
    Running,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Rough size of a decomposed task, as judged by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    /// Small, mechanical change
    Low,
    /// Typical feature or fix
    Medium,
    /// Cross-cutting or risky change
    High,
}
