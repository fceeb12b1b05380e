//! Orchestration of a full run.

use crate::config::RunConfig;
use armada_agent::{AgentRequest, AgentRunner, Planner};
use armada_core::{RunId, Task, TaskStatus};
use armada_engine::{
    classify_domain, BudgetStatistics, BudgetTracker, DependencyGraph, Scheduler, SchedulerStatus,
};
use armada_remote::{IssueRecord, Publisher, TaskSource};
use armada_resilience::{with_error_boundary, CircuitBreaker, OperationStats, ResilienceMetrics};
use armada_workspace::{Workspace, WorkspaceOptions, WorkspaceProvisioner};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Terminal record of one task.
#[derive(Debug, Clone)]
pub struct TaskResult {
    /// Task id
    pub id: u64,
    /// Task title
    pub title: String,
    /// Terminal status
    pub status: TaskStatus,
    /// Realized agent cost
    pub cost_usd: Option<f64>,
    /// Pull request number, when published
    pub pull_request: Option<u64>,
    /// Error text, when failed
    pub error: Option<String>,
}

/// Everything a finished run reports.
#[derive(Debug)]
pub struct RunReport {
    /// The run's identity
    pub run_id: RunId,
    /// Tasks that completed and published
    pub completed: usize,
    /// Tasks that failed
    pub failed: usize,
    /// Tasks never started (unmet dependencies, or a draining run)
    pub skipped: Vec<u64>,
    /// Per-task records, completion order
    pub results: Vec<TaskResult>,
    /// Total realized spend
    pub total_cost_usd: f64,
    /// Cost statistics over the run
    pub budget: BudgetStatistics,
    /// Per-operation resilience counters
    pub operations: HashMap<String, OperationStats>,
    /// Why the run stopped early, when it did
    pub aborted: Option<String>,
}

/// What one spawned task execution reports back on the completion channel.
#[derive(Debug)]
struct TaskOutcome {
    id: u64,
    success: bool,
    cost_usd: Option<f64>,
    pull_request: Option<u64>,
    error: Option<String>,
    // Set when the whole run must stop admitting work
    fatal: Option<String>,
}

/// The run controller.
///
/// Shared state (scheduler, budget, breakers, metrics) sits behind
/// mutexes whose critical sections are strictly synchronous - never held
/// across an await - so concurrently completing tasks cannot observe a
/// half-updated structure.
#[derive(Clone)]
pub struct Orchestrator {
    config: RunConfig,
    run_id: RunId,
    scheduler: Arc<Mutex<Scheduler>>,
    budget: Arc<Mutex<BudgetTracker>>,
    agent_breaker: Arc<Mutex<CircuitBreaker>>,
    source_breaker: Arc<Mutex<CircuitBreaker>>,
    metrics: Arc<ResilienceMetrics>,
    runner: Arc<dyn AgentRunner>,
    provisioner: Arc<dyn WorkspaceProvisioner>,
    publisher: Arc<dyn Publisher>,
}

impl Orchestrator {
    /// Wire up a run controller.
    pub fn new(
        config: RunConfig,
        runner: Arc<dyn AgentRunner>,
        provisioner: Arc<dyn WorkspaceProvisioner>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        let scheduler = Arc::new(Mutex::new(Scheduler::new(config.max_slots)));
        let budget = Arc::new(Mutex::new(BudgetTracker::new(config.budget_ceiling)));
        let agent_breaker = Arc::new(Mutex::new(CircuitBreaker::new(
            config.breaker_threshold,
            config.breaker_reset(),
        )));
        let source_breaker = Arc::new(Mutex::new(CircuitBreaker::new(
            config.breaker_threshold,
            config.breaker_reset(),
        )));
        Self {
            config,
            run_id: RunId::new(),
            scheduler,
            budget,
            agent_breaker,
            source_breaker,
            metrics: Arc::new(ResilienceMetrics::new()),
            runner,
            provisioner,
            publisher,
        }
    }

    /// This run's identity.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Live scheduler view, including block reasons.
    pub fn scheduler_status(&self) -> SchedulerStatus {
        self.lock_scheduler().status()
    }

    /// Orchestrate the tracker backlog carrying the configured label.
    pub async fn run_backlog(&self, source: Arc<dyn TaskSource>) -> anyhow::Result<RunReport> {
        let records = with_error_boundary(
            || {
                let source = source.clone();
                async move { source.fetch_tasks().await }
            },
            "tracker",
            self.config.backoff_policy(),
            Some(self.source_breaker.as_ref()),
            Some(self.metrics.as_ref()),
        )
        .await?;

        info!(run = %self.run_id, count = records.len(), "backlog ingested");
        let tasks: Vec<Task> = records.into_iter().map(|r| self.ingest(r)).collect();
        self.run_tasks(tasks, None).await
    }

    /// Decompose a directive and orchestrate the resulting plan in
    /// dependency order.
    pub async fn run_directive(
        &self,
        planner: Planner,
        directive: &str,
    ) -> anyhow::Result<RunReport> {
        let directive_owned = directive.to_string();
        let decomposed = with_error_boundary(
            || {
                let planner = planner.clone();
                let directive = directive_owned.clone();
                async move { planner.decompose(&directive).await }
            },
            "planner",
            self.config.backoff_policy(),
            Some(self.agent_breaker.as_ref()),
            Some(self.metrics.as_ref()),
        )
        .await?;

        let mut graph = DependencyGraph::new();
        let mut tasks = Vec::with_capacity(decomposed.len());
        for (position, item) in decomposed.into_iter().enumerate() {
            let id = (position + 1) as u64;
            let mut task = Task::new(id, item.title, item.body, item.labels);
            task.depends_on = item.depends_on.iter().map(|&p| p as u64).collect();
            task.complexity = item.complexity;
            let classification = classify_domain(&task.title, &task.body, &task.labels);
            task.domain = classification.domain;
            graph.add_task(id, task.depends_on.clone());
            tasks.push(task);
        }

        // A cyclic plan aborts before anything starts.
        graph.execution_order()?;

        info!(run = %self.run_id, count = tasks.len(), "directive ingested");
        self.run_tasks(tasks, Some(graph)).await
    }

    fn ingest(&self, record: IssueRecord) -> Task {
        let mut task = Task::new(record.id, record.title, record.body, record.labels);
        let classification = classify_domain(&task.title, &task.body, &task.labels);
        info!(
            task = task.id,
            domain = %classification.domain,
            confidence = classification.confidence,
            "classified",
        );
        task.domain = classification.domain;
        task
    }

    /// The event-driven fill/complete loop.
    async fn run_tasks(
        &self,
        tasks: Vec<Task>,
        graph: Option<DependencyGraph>,
    ) -> anyhow::Result<RunReport> {
        let mut pending: HashMap<u64, Task> = tasks.into_iter().map(|t| (t.id, t)).collect();
        let mut done: HashSet<u64> = HashSet::new();
        let mut results: Vec<TaskResult> = Vec::new();
        let mut aborted: Option<String> = None;
        let mut draining = false;

        self.seed_queue(&mut pending, &graph, &done);

        let (tx, mut rx) = mpsc::unbounded_channel::<TaskOutcome>();
        self.launch_ready(&tx);

        loop {
            {
                let scheduler = self.lock_scheduler();
                let summary = scheduler.summary();
                if summary.running == 0 && (draining || summary.queued == 0) {
                    break;
                }
            }

            tokio::select! {
                maybe = rx.recv() => {
                    let Some(outcome) = maybe else { break };

                    if let Some(reason) = &outcome.fatal {
                        warn!(task = outcome.id, %reason, "aborting run, draining in-flight work");
                        aborted.get_or_insert_with(|| reason.clone());
                        draining = true;
                    }

                    let finished = self.lock_scheduler().complete(outcome.id, outcome.success);
                    if let Some(task) = finished {
                        if outcome.success {
                            done.insert(task.id);
                        }
                        results.push(TaskResult {
                            id: task.id,
                            title: task.title,
                            status: task.status,
                            cost_usd: outcome.cost_usd,
                            pull_request: outcome.pull_request,
                            error: outcome.error,
                        });
                    }

                    if !draining {
                        self.seed_queue(&mut pending, &graph, &done);
                        // Completion is the event that refills slots; no
                        // polling anywhere.
                        self.launch_ready(&tx);
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown requested, draining in-flight work");
                    draining = true;
                }
            }
        }

        let summary = self.lock_scheduler().summary();
        let mut skipped: Vec<u64> = pending.keys().copied().collect();
        skipped.extend(self.lock_scheduler().status().queued);
        skipped.sort_unstable();

        let (total_cost_usd, budget) = {
            let budget = self.lock_budget();
            (budget.spent(), budget.statistics())
        };

        let report = RunReport {
            run_id: self.run_id,
            completed: summary.completed,
            failed: summary.failed,
            skipped,
            results,
            total_cost_usd,
            budget,
            operations: self.metrics.snapshot(),
            aborted,
        };
        info!(
            run = %self.run_id,
            completed = report.completed,
            failed = report.failed,
            skipped = report.skipped.len(),
            cost = report.total_cost_usd,
            "run finished",
        );
        Ok(report)
    }

    /// Move every currently-ready pending task into the scheduler queue.
    fn seed_queue(
        &self,
        pending: &mut HashMap<u64, Task>,
        graph: &Option<DependencyGraph>,
        done: &HashSet<u64>,
    ) {
        let mut scheduler = self.lock_scheduler();
        let ready: Vec<u64> = match graph {
            Some(g) => g.ready_tasks(done),
            None => {
                let mut ids: Vec<u64> = pending.keys().copied().collect();
                ids.sort_unstable();
                ids
            }
        };
        for id in ready {
            if let Some(task) = pending.remove(&id) {
                scheduler.enqueue(task);
            }
        }
    }

    /// Fill free slots and spawn each newly started task.
    fn launch_ready(&self, tx: &mpsc::UnboundedSender<TaskOutcome>) {
        let started = self.lock_scheduler().fill_slots();
        for task in started {
            let this = self.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let outcome = this.execute_task(task).await;
                let _ = tx.send(outcome);
            });
        }
    }

    /// Execute one task end to end: budget gate, workspace, agent,
    /// publication, cleanup.
    async fn execute_task(&self, task: Task) -> TaskOutcome {
        let mut outcome = TaskOutcome {
            id: task.id,
            success: false,
            cost_usd: None,
            pull_request: None,
            error: None,
            fatal: None,
        };

        // Pre-flight gate; cost is never debited ahead of the call.
        let admission = {
            let budget = self.lock_budget();
            let estimate = budget.estimate_next_task_cost();
            budget.can_afford(estimate, Some(task.id))
        };
        if let Err(err) = admission {
            let reason = err.to_string();
            outcome.error = Some(reason.clone());
            outcome.fatal = Some(reason);
            return outcome;
        }

        let branch_name = format!("task-{}-{}", task.id, self.run_id.short());
        let ws_options = WorkspaceOptions {
            base_branch: self.config.base_branch.clone(),
            prefix: self.config.branch_prefix.clone(),
            force: false,
        };
        let workspace = match self.provisioner.create(&branch_name, &ws_options).await {
            Ok(ws) => ws,
            Err(err) => {
                outcome.error = Some(format!("workspace: {err}"));
                return outcome;
            }
        };

        let request = self.agent_request(&task, &workspace);
        let invocation = with_error_boundary(
            || {
                let runner = self.runner.clone();
                let request = request.clone();
                async move { runner.invoke(&request).await }
            },
            "agent",
            self.config.backoff_policy(),
            Some(self.agent_breaker.as_ref()),
            Some(self.metrics.as_ref()),
        )
        .await;

        match invocation {
            Ok(result) => {
                // Realized cost lands in the tracker only after success.
                self.lock_budget().record_cost(result.cost_usd);
                outcome.cost_usd = Some(result.cost_usd);

                let title = format!("{} (#{})", task.title, task.id);
                let body = format!(
                    "Automated change for task #{}.\n\n{}",
                    task.id, result.content
                );
                let published = with_error_boundary(
                    || {
                        let publisher = self.publisher.clone();
                        let branch = workspace.branch.clone();
                        let title = title.clone();
                        let body = body.clone();
                        async move { publisher.create_pull_request(&branch, &title, &body).await }
                    },
                    "publish",
                    self.config.backoff_policy(),
                    None,
                    Some(self.metrics.as_ref()),
                )
                .await;

                match published {
                    Ok(number) => {
                        outcome.pull_request = Some(number);
                        outcome.success = true;
                    }
                    Err(err) => {
                        outcome.error = Some(format!("publish: {err}"));
                    }
                }
            }
            Err(err) => {
                outcome.error = Some(err.to_string());
            }
        }

        if let Err(err) = self.provisioner.cleanup(&workspace.path).await {
            warn!(task = task.id, error = %err, "workspace cleanup failed");
        }

        outcome
    }

    fn agent_request(&self, task: &Task, workspace: &Workspace) -> AgentRequest {
        let prompt = format!(
            "You are working on task #{}: {}\n\n{}\n\nMake the change in the current \
             repository checkout, commit to the current branch, and stop.",
            task.id, task.title, task.body
        );
        let remaining = self.lock_budget().remaining();
        let mut request = AgentRequest::new(prompt)
            .with_work_dir(workspace.path.clone())
            .with_timeout(self.config.agent_timeout())
            .with_budget_ceiling(remaining);
        if let Some(model) = &self.config.model {
            request = request.with_model(model.clone());
        }
        request
    }

    fn lock_scheduler(&self) -> MutexGuard<'_, Scheduler> {
        self.scheduler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_budget(&self) -> MutexGuard<'_, BudgetTracker> {
        self.budget
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use armada_agent::{AgentResult, ClaudeCliRunner};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    struct StaticSource(Vec<IssueRecord>);

    #[async_trait]
    impl TaskSource for StaticSource {
        async fn fetch_tasks(&self) -> anyhow::Result<Vec<IssueRecord>> {
            Ok(self.0.clone())
        }
    }

    /// Plays back scripted responses, then "done" forever; records the
    /// prompts it saw.
    struct ScriptedRunner {
        script: Mutex<Vec<String>>,
        calls: Mutex<Vec<String>>,
        cost: f64,
        fail_marker: Option<String>,
    }

    impl ScriptedRunner {
        fn done(cost: f64) -> Self {
            Self {
                script: Mutex::new(Vec::new()),
                calls: Mutex::new(Vec::new()),
                cost,
                fail_marker: None,
            }
        }

        fn scripted(responses: Vec<&str>, cost: f64) -> Self {
            Self {
                script: Mutex::new(responses.into_iter().map(String::from).collect()),
                calls: Mutex::new(Vec::new()),
                cost,
                fail_marker: None,
            }
        }

        fn failing_on(marker: &str, cost: f64) -> Self {
            Self {
                script: Mutex::new(Vec::new()),
                calls: Mutex::new(Vec::new()),
                cost,
                fail_marker: Some(marker.to_string()),
            }
        }

        fn scripted_failing_on(responses: Vec<&str>, marker: &str, cost: f64) -> Self {
            Self {
                script: Mutex::new(responses.into_iter().map(String::from).collect()),
                calls: Mutex::new(Vec::new()),
                cost,
                fail_marker: Some(marker.to_string()),
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AgentRunner for ScriptedRunner {
        async fn invoke(&self, request: &AgentRequest) -> anyhow::Result<AgentResult> {
            self.calls.lock().unwrap().push(request.prompt.clone());
            if let Some(marker) = &self.fail_marker {
                if request.prompt.contains(marker) {
                    anyhow::bail!("agent exited with code 1: simulated failure");
                }
            }
            let content = {
                let mut script = self.script.lock().unwrap();
                if script.is_empty() {
                    "done".to_string()
                } else {
                    script.remove(0)
                }
            };
            Ok(AgentResult {
                content,
                session_id: Some("s".to_string()),
                cost_usd: self.cost,
                duration: Duration::from_millis(1),
            })
        }
    }

    /// Plain-directory workspaces; no git involved.
    struct TempProvisioner {
        root: std::path::PathBuf,
    }

    #[async_trait]
    impl WorkspaceProvisioner for TempProvisioner {
        async fn create(
            &self,
            branch_name: &str,
            options: &WorkspaceOptions,
        ) -> anyhow::Result<Workspace> {
            let branch = format!("{}/{}", options.prefix, branch_name);
            let path = self.root.join(branch.replace('/', "-"));
            tokio::fs::create_dir_all(&path).await?;
            Ok(Workspace {
                path,
                branch,
                commit: "deadbeef".to_string(),
            })
        }

        async fn cleanup(&self, path: &Path) -> anyhow::Result<()> {
            if path.exists() {
                tokio::fs::remove_dir_all(path).await?;
            }
            Ok(())
        }
    }

    struct CountingPublisher {
        next: AtomicU64,
    }

    #[async_trait]
    impl Publisher for CountingPublisher {
        async fn create_pull_request(
            &self,
            _branch: &str,
            _title: &str,
            _body: &str,
        ) -> anyhow::Result<u64> {
            Ok(self.next.fetch_add(1, Ordering::SeqCst))
        }
    }

    fn issue(id: u64, title: &str, body: &str, label: &str) -> IssueRecord {
        IssueRecord {
            id,
            title: title.to_string(),
            body: body.to_string(),
            labels: vec![label.to_string()],
        }
    }

    fn orchestrator(config: RunConfig, runner: Arc<dyn AgentRunner>, dir: &Path) -> Orchestrator {
        Orchestrator::new(
            config,
            runner,
            Arc::new(TempProvisioner {
                root: dir.to_path_buf(),
            }),
            Arc::new(CountingPublisher {
                next: AtomicU64::new(100),
            }),
        )
    }

    fn fast_config() -> RunConfig {
        RunConfig {
            max_retries: 0,
            ..RunConfig::default()
        }
    }

    #[tokio::test]
    async fn backlog_run_completes_compatible_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::done(0.5));
        let orch = orchestrator(fast_config(), runner, dir.path());

        let source = Arc::new(StaticSource(vec![
            issue(1, "Fix handler", "edit src/api/users.rs", "backend"),
            issue(2, "Polish styles", "edit styles/app.css", "frontend"),
            issue(3, "Stabilize suite", "edit tests/login.rs", "testing"),
        ]));

        let report = orch.run_backlog(source).await.unwrap();
        assert_eq!(report.completed, 3);
        assert_eq!(report.failed, 0);
        assert!(report.skipped.is_empty());
        assert!((report.total_cost_usd - 1.5).abs() < 1e-9);
        assert!(report.results.iter().all(|r| r.pull_request.is_some()));
        assert_eq!(report.operations["agent"].successes, 3);
        assert!(report.aborted.is_none());
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::failing_on("task #2", 0.5));
        let orch = orchestrator(fast_config(), runner, dir.path());

        let source = Arc::new(StaticSource(vec![
            issue(1, "Fix handler", "edit src/api/users.rs", "backend"),
            issue(2, "Polish styles", "edit styles/app.css", "frontend"),
            issue(3, "Stabilize suite", "edit tests/login.rs", "testing"),
        ]));

        let report = orch.run_backlog(source).await.unwrap();
        assert_eq!(report.completed, 2);
        assert_eq!(report.failed, 1);
        assert!(report.aborted.is_none());

        let failed = report.results.iter().find(|r| r.id == 2).unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert!(failed.error.as_deref().unwrap().contains("simulated failure"));
    }

    #[tokio::test]
    async fn budget_exhaustion_aborts_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::done(0.8));
        let config = RunConfig {
            max_slots: 1,
            budget_ceiling: 1.0,
            max_retries: 0,
            ..RunConfig::default()
        };
        let orch = orchestrator(config, runner, dir.path());

        let source = Arc::new(StaticSource(vec![
            issue(1, "First", "edit src/a.rs", "backend"),
            issue(2, "Second", "edit src/b.rs", "backend"),
            issue(3, "Third", "edit src/c.rs", "backend"),
        ]));

        let report = orch.run_backlog(source).await.unwrap();
        // First task fits (estimate == ceiling is allowed); the second is
        // refused pre-flight and stops admissions.
        assert_eq!(report.completed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, vec![3]);
        assert!(report.aborted.as_deref().unwrap().contains("budget exceeded"));
        assert!((report.total_cost_usd - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn directive_run_honors_dependency_order() {
        let dir = tempfile::tempdir().unwrap();
        let plan = r#"[
            {"title": "Add config", "body": "edit src/config.rs", "labels": ["backend"], "depends_on": []},
            {"title": "Wire config into UI", "body": "edit styles/panel.css", "labels": ["frontend"], "depends_on": [1]},
            {"title": "Cover with tests", "body": "edit tests/config.rs", "labels": ["testing"], "depends_on": [2]}
        ]"#;
        let runner = Arc::new(ScriptedRunner::scripted(vec![plan], 0.1));
        let orch = orchestrator(fast_config(), runner.clone(), dir.path());

        let planner = Planner::new(runner.clone());
        let report = orch.run_directive(planner, "add a config panel").await.unwrap();
        assert_eq!(report.completed, 3);
        assert!(report.skipped.is_empty());

        // First call is the planner; the rest must follow the chain.
        let prompts = runner.prompts();
        assert_eq!(prompts.len(), 4);
        assert!(prompts[1].contains("task #1"));
        assert!(prompts[2].contains("task #2"));
        assert!(prompts[3].contains("task #3"));
    }

    #[tokio::test]
    async fn cyclic_plan_aborts_before_starting() {
        let dir = tempfile::tempdir().unwrap();
        let plan = r#"[
            {"title": "A", "body": "", "depends_on": [2]},
            {"title": "B", "body": "", "depends_on": [1]}
        ]"#;
        let runner = Arc::new(ScriptedRunner::scripted(vec![plan], 0.1));
        let orch = orchestrator(fast_config(), runner.clone(), dir.path());

        let planner = Planner::new(runner.clone());
        let err = orch
            .run_directive(planner, "two tangled tasks")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("dependency cycle"));
        // Only the planner ran; no task was ever launched.
        assert_eq!(runner.prompts().len(), 1);
    }

    #[tokio::test]
    async fn failed_dependency_skips_dependents() {
        let dir = tempfile::tempdir().unwrap();
        let plan = r#"[
            {"title": "Base change", "body": "edit src/base.rs", "labels": ["backend"], "depends_on": []},
            {"title": "Follow-up", "body": "edit tests/base.rs", "labels": ["testing"], "depends_on": [1]}
        ]"#;
        // The scripted plan is consumed first; then task #1 fails.
        let runner = Arc::new(ScriptedRunner::scripted_failing_on(vec![plan], "task #1", 0.1));
        let orch = orchestrator(fast_config(), runner.clone(), dir.path());

        let planner = Planner::new(runner.clone());
        let report = orch
            .run_directive(planner, "base change plus follow-up")
            .await
            .unwrap();
        assert_eq!(report.completed, 0);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, vec![2]);
    }

    #[tokio::test]
    async fn default_runner_constructs() {
        // Smoke check that the real runner satisfies the trait object.
        let _runner: Arc<dyn AgentRunner> = Arc::new(ClaudeCliRunner::new());
    }
}
