//! The agent execution seam.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

/// One agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    /// The task prompt
    pub prompt: String,
    /// Model override, when set
    pub model: Option<String>,
    /// Dollar ceiling hint passed through to the agent
    pub budget_ceiling: Option<f64>,
    /// Extra system prompt appended to the agent's own
    pub system_prompt: Option<String>,
    /// Directory the agent works in (an isolated workspace)
    pub work_dir: Option<PathBuf>,
    /// Hard deadline for the whole invocation
    pub timeout: Duration,
}

impl AgentRequest {
    /// A request with default limits.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: None,
            budget_ceiling: None,
            system_prompt: None,
            work_dir: None,
            timeout: Duration::from_secs(600),
        }
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the budget ceiling hint.
    pub fn with_budget_ceiling(mut self, ceiling: f64) -> Self {
        self.budget_ceiling = Some(ceiling);
        self
    }

    /// Set the appended system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Set the working directory.
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    /// Set the invocation timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// What a completed invocation produced.
#[derive(Debug, Clone)]
pub struct AgentResult {
    /// The agent's final message
    pub content: String,
    /// Session identifier, when the agent reports one
    pub session_id: Option<String>,
    /// Realized cost of the invocation
    pub cost_usd: f64,
    /// Wall-clock duration
    pub duration: Duration,
}

/// Executes agent invocations.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Run one invocation to completion.
    async fn invoke(&self, request: &AgentRequest) -> anyhow::Result<AgentResult>;
}
