//! Directive decomposition.
//!
//! A directive is a natural-language instruction ("add rate limiting to
//! the API and document it") that the planner turns into a set of
//! dependency-ordered tasks, each small enough for one agent.

use crate::runner::{AgentRequest, AgentRunner};
use armada_core::{Complexity, OrchestrateError};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

/// One task produced by decomposition.
///
/// `depends_on` holds 1-based positions into the same decomposition, not
/// task ids - the orchestrator assigns ids when it ingests the plan.
#[derive(Debug, Clone, Deserialize)]
pub struct DecomposedTask {
    /// Task title
    pub title: String,
    /// Task description
    #[serde(default)]
    pub body: String,
    /// Suggested labels
    #[serde(default)]
    pub labels: Vec<String>,
    /// 1-based positional references to prerequisite tasks
    #[serde(default)]
    pub depends_on: Vec<usize>,
    /// Planner's size judgement
    #[serde(default)]
    pub complexity: Option<Complexity>,
}

const DECOMPOSE_PROMPT: &str = r#"Decompose the following directive into independent engineering tasks.

Respond with a JSON array only, no prose. Each element:
{
  "title": "short imperative title",
  "body": "enough detail for an engineer unfamiliar with the directive, naming the files to touch",
  "labels": ["tracker", "labels"],
  "depends_on": [1],
  "complexity": "low" | "medium" | "high"
}

"depends_on" lists 1-based positions of tasks in this same array that must
finish first; use [] for independent tasks. Prefer tasks that touch
disjoint files.

Directive:
"#;

/// Decomposes directives through an agent.
#[derive(Clone)]
pub struct Planner {
    runner: Arc<dyn AgentRunner>,
    model: Option<String>,
}

impl Planner {
    /// Create a planner over the given runner.
    pub fn new(runner: Arc<dyn AgentRunner>) -> Self {
        Self {
            runner,
            model: None,
        }
    }

    /// Use a specific model for planning.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Decompose a directive into tasks.
    pub async fn decompose(&self, directive: &str) -> anyhow::Result<Vec<DecomposedTask>> {
        let mut request = AgentRequest::new(format!("{DECOMPOSE_PROMPT}{directive}"));
        if let Some(model) = &self.model {
            request = request.with_model(model.clone());
        }

        let result = self.runner.invoke(&request).await?;
        let tasks = parse_decomposition(&result.content)?;
        info!(count = tasks.len(), "directive decomposed");
        Ok(tasks)
    }
}

/// Parse and validate planner output.
///
/// The agent wraps its JSON in prose often enough that we slice from the
/// first `[` to the last `]` before parsing. Positional references
/// outside `1..=len` are a validation error.
pub fn parse_decomposition(content: &str) -> Result<Vec<DecomposedTask>, OrchestrateError> {
    let json = extract_json_array(content).ok_or_else(|| {
        OrchestrateError::Validation("planner output contains no JSON array".to_string())
    })?;

    let tasks: Vec<DecomposedTask> = serde_json::from_str(json)
        .map_err(|err| OrchestrateError::Validation(format!("planner output: {err}")))?;

    if tasks.is_empty() {
        return Err(OrchestrateError::Validation(
            "planner produced no tasks".to_string(),
        ));
    }

    for (position, task) in tasks.iter().enumerate() {
        for &dep in &task.depends_on {
            if dep == 0 || dep > tasks.len() {
                return Err(OrchestrateError::Validation(format!(
                    "task {} references position {dep}, outside 1..={}",
                    position + 1,
                    tasks.len()
                )));
            }
        }
    }

    Ok(tasks)
}

fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}
