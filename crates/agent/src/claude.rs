//! Headless agent subprocess runner.

use crate::runner::{AgentRequest, AgentResult, AgentRunner};
use armada_core::OrchestrateError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Instant;
use tokio::process::Command;
use tracing::debug;

/// Runs tasks through the `claude` CLI in print mode with JSON output.
pub struct ClaudeCliRunner {
    binary: String,
}

impl ClaudeCliRunner {
    /// Use the `claude` binary from PATH.
    pub fn new() -> Self {
        Self {
            binary: "claude".to_string(),
        }
    }

    /// Use a specific binary path.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for ClaudeCliRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// The CLI's JSON result envelope.
#[derive(Debug, Deserialize)]
struct CliResponse {
    #[serde(default)]
    result: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    total_cost_usd: f64,
    #[serde(default)]
    is_error: bool,
}

#[async_trait]
impl AgentRunner for ClaudeCliRunner {
    async fn invoke(&self, request: &AgentRequest) -> anyhow::Result<AgentResult> {
        let started = Instant::now();

        let mut cmd = Command::new(&self.binary);
        cmd.arg("-p")
            .arg(&request.prompt)
            .arg("--output-format")
            .arg("json");
        if let Some(model) = &request.model {
            cmd.arg("--model").arg(model);
        }
        if let Some(system_prompt) = &request.system_prompt {
            cmd.arg("--append-system-prompt").arg(system_prompt);
        }
        if let Some(ceiling) = request.budget_ceiling {
            cmd.arg("--max-budget-usd").arg(format!("{ceiling:.2}"));
        }
        if let Some(dir) = &request.work_dir {
            cmd.current_dir(dir);
        }
        cmd.kill_on_drop(true);

        debug!(binary = %self.binary, timeout_s = request.timeout.as_secs(), "invoking agent");

        let output = match tokio::time::timeout(request.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                return Err(OrchestrateError::Crash(format!(
                    "failed to spawn {}: {err}",
                    self.binary
                ))
                .into());
            }
            Err(_) => {
                return Err(OrchestrateError::Timeout(format!(
                    "agent exceeded {}s",
                    request.timeout.as_secs()
                ))
                .into());
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output.status.code().unwrap_or(-1);
            // Opaque boundary: the text is all we have, leave
            // classification to the error boundary.
            anyhow::bail!("agent exited with code {code}: {}", stderr.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let response: CliResponse = serde_json::from_str(stdout.trim()).map_err(|err| {
            OrchestrateError::Unknown(format!("unparseable agent output: {err}"))
        })?;

        if response.is_error {
            anyhow::bail!("{}", response.result);
        }

        Ok(AgentResult {
            content: response.result,
            session_id: response.session_id,
            cost_usd: response.total_cost_usd,
            duration: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_cli_envelope() {
        let raw = r#"{
            "result": "done, opened a PR",
            "session_id": "abc123",
            "total_cost_usd": 1.25,
            "is_error": false
        }"#;
        let response: CliResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.result, "done, opened a PR");
        assert_eq!(response.session_id.as_deref(), Some("abc123"));
        assert_eq!(response.total_cost_usd, 1.25);
        assert!(!response.is_error);
    }

    #[test]
    fn missing_fields_default() {
        let response: CliResponse = serde_json::from_str("{}").unwrap();
        assert!(response.result.is_empty());
        assert!(response.session_id.is_none());
        assert_eq!(response.total_cost_usd, 0.0);
    }

    #[tokio::test]
    async fn spawn_failure_is_a_structured_crash() {
        let runner = ClaudeCliRunner::with_binary("/nonexistent/agent-binary");
        let err = runner
            .invoke(&AgentRequest::new("hello"))
            .await
            .unwrap_err();
        let orchestrate = err.downcast_ref::<OrchestrateError>().unwrap();
        assert!(matches!(orchestrate, OrchestrateError::Crash(_)));
    }
}
