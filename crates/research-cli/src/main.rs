//! Command-line interface for research-rs
//!
//! ```bash
//! # Route one prompt through the configured fallback chain
//! research route -c orchestrator.json --type sentiment "Summarise the latest ACME headlines"
//!
//! # Fetch a handful of pages with at most 4 in flight
//! research fetch -j 4 --deadline-secs 30 https://example.com/a https://example.com/b
//!
//! # Inspect providers and derived chains without calling anything
//! research status -c orchestrator.json
//! ```

mod clients;
mod output;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use research_core::{Payload, Task, TaskType};
use research_fetch::{BatchSummary, CachedRunner, FetchCoordinator, FetchJob, HttpRunner, JobRunner};
use research_router::OrchestratorConfig;
use research_utils::LogFormat;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "research", version)]
#[command(about = "Route research tasks across LLM providers and run fetch batches", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute one task through the fallback router
    Route(RouteArgs),
    /// Fetch URLs concurrently under a batch deadline
    Fetch(FetchArgs),
    /// Show configured providers and fallback chains
    Status {
        /// Orchestrator config file
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[derive(Args, Debug)]
struct RouteArgs {
    /// Orchestrator config file
    #[arg(short, long)]
    config: PathBuf,

    /// Task type selecting the fallback chain
    #[arg(short = 't', long = "type", default_value = "general")]
    task_type: TaskType,

    /// Prompt text; read from stdin when omitted
    prompt: Option<String>,

    #[arg(long)]
    system: Option<String>,

    #[arg(long)]
    max_tokens: Option<u32>,

    #[arg(long)]
    temperature: Option<f32>,

    /// Overall deadline for the task
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,

    /// Stop after this many providers were actually called
    #[arg(long)]
    max_attempts: Option<usize>,

    /// Skip providers whose cost weight exceeds this
    #[arg(long)]
    budget: Option<f64>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Print per-provider metrics after the run
    #[arg(long)]
    metrics: bool,
}

#[derive(Args, Debug)]
struct FetchArgs {
    /// URLs to fetch
    #[arg(required = true)]
    urls: Vec<String>,

    /// Maximum jobs in flight
    #[arg(short = 'j', long, default_value_t = 4)]
    concurrency: usize,

    #[arg(long, default_value_t = 15)]
    job_timeout_secs: u64,

    #[arg(long, default_value_t = 60)]
    deadline_secs: u64,

    /// Cache successful bodies for this many seconds; 0 disables the cache
    #[arg(long, default_value_t = 0)]
    cache_ttl_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::from_env()
    };
    research_utils::init_tracing_with(format, &cli.log_level);

    match cli.command {
        Command::Route(args) => route(args).await,
        Command::Fetch(args) => fetch(args).await,
        Command::Status { config } => status(&config),
    }
}

fn load_config(path: &Path) -> anyhow::Result<OrchestratorConfig> {
    OrchestratorConfig::from_file(path)
        .with_context(|| format!("failed to load config from {}", path.display()))
}

async fn route(args: RouteArgs) -> anyhow::Result<()> {
    let config = load_config(&args.config)?;
    let router = config.into_builder(clients::from_env)?.build()?;

    let prompt = match args.prompt {
        Some(prompt) => prompt,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read prompt from stdin")?;
            buffer
        }
    };
    if prompt.trim().is_empty() {
        bail!("prompt is empty");
    }

    let mut payload = Payload::new(prompt);
    if let Some(system) = args.system {
        payload = payload.with_system(system);
    }
    if let Some(max_tokens) = args.max_tokens {
        payload = payload.with_max_tokens(max_tokens);
    }
    if let Some(temperature) = args.temperature {
        payload = payload.with_temperature(temperature);
    }

    let mut task =
        Task::new(args.task_type, payload).with_timeout(Duration::from_secs(args.timeout_secs));
    if let Some(max_attempts) = args.max_attempts {
        task = task.with_max_attempts(max_attempts);
    }
    if let Some(budget) = args.budget {
        task = task.with_budget_ceiling(budget);
    }

    info!(task_type = %args.task_type, "Routing task");
    let result = router.execute(&task).await;

    if args.metrics {
        eprintln!("{}", output::metrics(&router.metrics().snapshot()));
    }

    match result {
        Ok(result) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                if !result.failures.is_empty() {
                    eprintln!("{}", output::failures(&result.failures));
                }
                eprintln!("{}", output::route_summary(&result));
                println!("{}", result.content);
            }
            Ok(())
        }
        Err(err) => {
            if !err.failures().is_empty() {
                eprintln!("{}", output::failures(err.failures()));
            }
            Err(err.into())
        }
    }
}

async fn fetch(args: FetchArgs) -> anyhow::Result<()> {
    let runner: Arc<dyn JobRunner> = if args.cache_ttl_secs > 0 {
        Arc::new(CachedRunner::new(
            HttpRunner::new(),
            Duration::from_secs(args.cache_ttl_secs),
        ))
    } else {
        Arc::new(HttpRunner::new())
    };
    let coordinator = FetchCoordinator::new(runner);

    let job_timeout = Duration::from_secs(args.job_timeout_secs);
    let jobs = args
        .urls
        .into_iter()
        .map(|url| FetchJob::new(url).with_timeout(job_timeout))
        .collect();

    let outcomes = coordinator
        .run_batch_within(jobs, args.concurrency, Duration::from_secs(args.deadline_secs))
        .await;

    println!("{}", output::fetch_outcomes(&outcomes));
    println!("{}", output::batch_summary(&BatchSummary::from_outcomes(&outcomes)));
    Ok(())
}

fn status(path: &Path) -> anyhow::Result<()> {
    let config = load_config(path)?;
    let router = config.clone().into_builder(clients::offline)?.build()?;

    println!("{}", output::providers(&config));
    println!("{}", output::chains(router.policy()));
    Ok(())
}
