//! Issue tracker integration - the task source and result publication.
//!
//! Failures out of this crate are structured at the origin (status codes
//! are under our control here), so the resilience layer classifies them
//! by variant instead of by substring.

#![warn(missing_docs)]

use armada_core::OrchestrateError;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A work item as the tracker reports it.
#[derive(Debug, Clone)]
pub struct IssueRecord {
    /// Issue number
    pub id: u64,
    /// Issue title
    pub title: String,
    /// Issue body, empty when absent
    pub body: String,
    /// Label names
    pub labels: Vec<String>,
}

/// Yields the backlog to orchestrate.
#[async_trait]
pub trait TaskSource: Send + Sync {
    /// Fetch the current set of open work items.
    async fn fetch_tasks(&self) -> anyhow::Result<Vec<IssueRecord>>;
}

/// Publishes finished work for review.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Open a pull request for `branch`; returns its number.
    async fn create_pull_request(
        &self,
        branch: &str,
        title: &str,
        body: &str,
    ) -> anyhow::Result<u64>;
}

/// GitHub-style REST client implementing both seams.
pub struct GithubClient {
    http: reqwest::Client,
    api_base: String,
    repo: String,
    token: Option<String>,
    label: String,
    base_branch: String,
}

impl GithubClient {
    /// Client for `owner/name`, selecting issues carrying `label` and
    /// opening pull requests against `base_branch`.
    pub fn new(
        repo: impl Into<String>,
        label: impl Into<String>,
        base_branch: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: "https://api.github.com".to_string(),
            repo: repo.into(),
            token,
            label: label.into(),
            base_branch: base_branch.into(),
        }
    }

    /// Point at a different API host (enterprise installs, tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder
            .header("User-Agent", "armada")
            .header("Accept", "application/vnd.github+json");
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IssueResponse {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    labels: Vec<LabelResponse>,
    // Present when the "issue" is actually a pull request
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct LabelResponse {
    name: String,
}

#[derive(Debug, Serialize)]
struct PullRequestBody<'a> {
    title: &'a str,
    head: &'a str,
    base: &'a str,
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct PullRequestResponse {
    number: u64,
}

/// Map a tracker status code onto the error taxonomy.
fn status_error(status: StatusCode, detail: &str) -> OrchestrateError {
    if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::FORBIDDEN {
        OrchestrateError::RateLimit(format!("{status}: {detail}"))
    } else if status.is_server_error() {
        OrchestrateError::Network(format!("{status}: {detail}"))
    } else {
        OrchestrateError::Validation(format!("{status}: {detail}"))
    }
}

fn transport_error(err: reqwest::Error) -> OrchestrateError {
    if err.is_timeout() {
        OrchestrateError::Timeout(err.to_string())
    } else {
        OrchestrateError::Network(err.to_string())
    }
}

#[async_trait]
impl TaskSource for GithubClient {
    async fn fetch_tasks(&self) -> anyhow::Result<Vec<IssueRecord>> {
        let url = format!(
            "{}/repos/{}/issues?labels={}&state=open&per_page=100",
            self.api_base, self.repo, self.label
        );
        debug!(%url, "fetching backlog");

        let response = self
            .request(self.http.get(&url))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(status_error(status, &detail).into());
        }

        let issues: Vec<IssueResponse> = response.json().await.map_err(transport_error)?;
        let records: Vec<IssueRecord> = issues
            .into_iter()
            .filter(|issue| issue.pull_request.is_none())
            .map(|issue| IssueRecord {
                id: issue.number,
                title: issue.title,
                body: issue.body.unwrap_or_default(),
                labels: issue.labels.into_iter().map(|l| l.name).collect(),
            })
            .collect();

        info!(count = records.len(), label = %self.label, "backlog fetched");
        Ok(records)
    }
}

#[async_trait]
impl Publisher for GithubClient {
    async fn create_pull_request(
        &self,
        branch: &str,
        title: &str,
        body: &str,
    ) -> anyhow::Result<u64> {
        let url = format!("{}/repos/{}/pulls", self.api_base, self.repo);
        let payload = PullRequestBody {
            title,
            head: branch,
            base: &self.base_branch,
            body,
        };

        let response = self
            .request(self.http.post(&url).json(&payload))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(status_error(status, &detail).into());
        }

        let pr: PullRequestResponse = response.json().await.map_err(transport_error)?;
        info!(number = pr.number, %branch, "pull request opened");
        Ok(pr.number)
    }
}
