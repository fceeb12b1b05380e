//! Armada CLI - parallel autonomous coding agents.

use anyhow::Result;
use armada_agent::{ClaudeCliRunner, Planner};
use armada_engine::DependencyGraph;
use armada_orchestrator::{Orchestrator, RunConfig, RunReport};
use armada_remote::GithubClient;
use armada_workspace::GitWorktreeProvisioner;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "armada")]
#[command(about = "Parallel autonomous coding-agent orchestrator", long_about = None)]
struct Cli {
    /// JSON run config; flags override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Orchestrate the backlog carrying a tracker label
    Run {
        /// Tracker repository, "owner/name"
        #[arg(long)]
        repo: String,
        /// Label selecting the backlog
        #[arg(long, default_value = "agent-ok")]
        label: String,
        /// Local checkout workspaces fork from
        #[arg(long, default_value = ".")]
        checkout: PathBuf,
        /// Concurrent agents
        #[arg(long)]
        slots: Option<usize>,
        /// Dollar ceiling for the run
        #[arg(long)]
        budget: Option<f64>,
        /// Model override
        #[arg(long)]
        model: Option<String>,
    },
    /// Decompose a directive and orchestrate the plan
    Directive {
        /// The natural-language directive
        directive: String,
        /// Tracker repository, "owner/name"
        #[arg(long)]
        repo: String,
        /// Local checkout workspaces fork from
        #[arg(long, default_value = ".")]
        checkout: PathBuf,
        /// Concurrent agents
        #[arg(long)]
        slots: Option<usize>,
        /// Dollar ceiling for the run
        #[arg(long)]
        budget: Option<f64>,
        /// Model override
        #[arg(long)]
        model: Option<String>,
    },
    /// Decompose a directive and print the plan without running it
    Plan {
        /// The natural-language directive
        directive: String,
        /// Model override
        #[arg(long)]
        model: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let base_config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            repo,
            label,
            checkout,
            slots,
            budget,
            model,
        } => {
            let config = merge_flags(base_config, slots, budget, model);
            info!(%label, slots = config.max_slots, budget = config.budget_ceiling, "starting backlog run");
            let client = Arc::new(GithubClient::new(
                repo,
                label,
                config.base_branch.clone(),
                tracker_token(),
            ));
            let orchestrator =
                build_orchestrator_with_publisher(&config, &checkout, client.clone());
            let report = orchestrator.run_backlog(client).await?;
            print_report(&report);
        }
        Commands::Directive {
            directive,
            repo,
            checkout,
            slots,
            budget,
            model,
        } => {
            let config = merge_flags(base_config, slots, budget, model);
            let orchestrator = build_orchestrator_with_publisher(
                &config,
                &checkout,
                Arc::new(GithubClient::new(
                    repo,
                    String::new(),
                    config.base_branch.clone(),
                    tracker_token(),
                )),
            );
            let planner = build_planner(&config);
            let report = orchestrator.run_directive(planner, &directive).await?;
            print_report(&report);
        }
        Commands::Plan { directive, model } => {
            let mut config = base_config;
            if model.is_some() {
                config.model = model;
            }
            let planner = build_planner(&config);
            let tasks = planner.decompose(&directive).await?;

            let mut graph = DependencyGraph::new();
            for (position, task) in tasks.iter().enumerate() {
                let deps = task.depends_on.iter().map(|&p| p as u64).collect();
                graph.add_task((position + 1) as u64, deps);
            }
            let order = graph.execution_order()?;

            println!("Plan ({} tasks)", tasks.len());
            for (position, task) in tasks.iter().enumerate() {
                let deps = if task.depends_on.is_empty() {
                    "-".to_string()
                } else {
                    format!("{:?}", task.depends_on)
                };
                println!("  {}. {} | deps: {}", position + 1, task.title, deps);
            }
            println!("Execution order: {order:?}");
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<RunConfig> {
    let Some(path) = path else {
        return Ok(RunConfig::default());
    };
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn merge_flags(
    mut config: RunConfig,
    slots: Option<usize>,
    budget: Option<f64>,
    model: Option<String>,
) -> RunConfig {
    if let Some(slots) = slots {
        config.max_slots = slots;
    }
    if let Some(budget) = budget {
        config.budget_ceiling = budget;
    }
    if model.is_some() {
        config.model = model;
    }
    config
}

fn tracker_token() -> Option<String> {
    std::env::var("GITHUB_TOKEN").ok()
}

fn build_planner(config: &RunConfig) -> Planner {
    let mut planner = Planner::new(Arc::new(ClaudeCliRunner::new()));
    if let Some(model) = &config.model {
        planner = planner.with_model(model.clone());
    }
    planner
}

fn build_orchestrator_with_publisher(
    config: &RunConfig,
    checkout: &Path,
    publisher: Arc<dyn armada_remote::Publisher>,
) -> Orchestrator {
    let provisioner = GitWorktreeProvisioner::new(
        checkout.to_path_buf(),
        checkout.join(".armada").join("worktrees"),
    );
    Orchestrator::new(
        config.clone(),
        Arc::new(ClaudeCliRunner::new()),
        Arc::new(provisioner),
        publisher,
    )
}

fn print_report(report: &RunReport) {
    println!("Run {} finished", report.run_id);
    println!(
        "  completed: {} | failed: {} | skipped: {}",
        report.completed,
        report.failed,
        report.skipped.len()
    );
    println!("  spend: ${:.2} (p90 ${:.2})", report.total_cost_usd, report.budget.p90);

    for result in &report.results {
        match (&result.pull_request, &result.error) {
            (Some(pr), _) => println!("  #{} {} -> PR #{}", result.id, result.title, pr),
            (None, Some(error)) => println!("  #{} {} -> {}", result.id, result.title, error),
            (None, None) => println!("  #{} {} -> {}", result.id, result.title, result.status),
        }
    }

    if let Some(reason) = &report.aborted {
        println!("  aborted: {reason}");
    }

    for (label, stats) in &report.operations {
        println!(
            "  [{}] attempts: {} ok: {} failed: {}",
            label, stats.attempts, stats.successes, stats.failures
        );
    }
}
