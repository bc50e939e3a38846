//! Simmer CLI Binary
//!
//! Runs one recipe batch against the configured endpoint and prints the result
//! as JSON.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use simmer::config::{ConfigLoader, SimmerConfig};
use simmer::history::{HistoryStore, InMemoryHistoryStore, SledHistoryStore};
use simmer::logging::{init_logging, LoggingConfig};
use simmer::orchestrator::{GenerationOrchestrator, Preferences};
use simmer::persistence::MemoryResultStore;
use simmer::progress::TracingProgressSink;
use simmer::provider::{CompletionOptions, OpenAiCompatibleClient};
use simmer::resilience::ResilientCaller;
use simmer::scheduler::{Collaborators, JobParams, JobScheduler, JobStatus};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Simmer CLI - batch recipe generation over a local LLM endpoint
#[derive(Parser)]
#[command(name = "simmer")]
#[command(about = "Generate diverse recipe batches through an OpenAI-compatible endpoint")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Workspace root directory (for simmer.toml)
    #[arg(long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Disable logging
    #[arg(long)]
    quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate one batch and print it
    Run {
        /// Owner whose history the batch is checked against
        #[arg(long, default_value = "local")]
        owner: String,
        /// Number of recipes
        #[arg(long, default_value_t = 5)]
        count: usize,
        #[arg(long, default_value_t = 4)]
        serving_size: u32,
        /// Ingredient that exactly one recipe must use
        #[arg(long)]
        must_include: Option<String>,
        /// Liked food (repeatable)
        #[arg(long = "like")]
        liked: Vec<String>,
        /// Disliked food (repeatable)
        #[arg(long = "dislike")]
        disliked: Vec<String>,
        /// Dietary restriction (repeatable)
        #[arg(long = "diet")]
        dietary: Vec<String>,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{:#}", e);
            process::exit(1);
        }
    };

    if let Err(e) = init_logging(Some(&build_logging_config(&cli, &config.logging))) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    let outcome = match &cli.command {
        Commands::Config => toml::to_string_pretty(&config)
            .context("Failed to render configuration"),
        Commands::Run {
            owner,
            count,
            serving_size,
            must_include,
            liked,
            disliked,
            dietary,
        } => {
            let mut params = JobParams::new(owner.clone(), *count);
            params.serving_size = *serving_size;
            params.must_include = must_include.clone();
            params.with_media = config.media.enabled;
            params.preferences = Preferences {
                liked_foods: liked.clone(),
                disliked_foods: disliked.clone(),
                dietary_restrictions: dietary.clone(),
            };
            run_batch(&config, params).await
        }
    };

    match outcome {
        Ok(output) => println!("{}", output),
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("{:#}", e);
            process::exit(1);
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<SimmerConfig> {
    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => ConfigLoader::load(&cli.workspace).context("Failed to load configuration")?,
    };
    Ok(config.validated()?)
}

/// CLI flags override the configuration file.
fn build_logging_config(cli: &Cli, base: &LoggingConfig) -> LoggingConfig {
    let mut config = base.clone();
    if cli.quiet {
        config.enabled = false;
    }
    if cli.verbose {
        config.level = "debug".to_string();
    }
    if let Some(level) = &cli.log_level {
        config.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.format = format.clone();
    }
    config
}

async fn run_batch(config: &SimmerConfig, params: JobParams) -> anyhow::Result<String> {
    let history: Arc<dyn HistoryStore> = match &config.history.path {
        Some(path) => Arc::new(
            SledHistoryStore::open(path)
                .with_context(|| format!("Failed to open history at {}", path.display()))?,
        ),
        None => Arc::new(InMemoryHistoryStore::new()),
    };
    let text = Arc::new(OpenAiCompatibleClient::new(&config.provider)?);
    let orchestrator = GenerationOrchestrator::new(
        text,
        ResilientCaller::new(&config.resilience),
        history,
        config.diversity.clone(),
        CompletionOptions {
            temperature: Some(config.provider.temperature),
            max_tokens: Some(config.provider.max_tokens),
        },
        config.history.window,
    );
    let results = Arc::new(MemoryResultStore::new());
    let scheduler = JobScheduler::new(
        config.scheduler.clone(),
        Collaborators {
            orchestrator: Arc::new(orchestrator),
            persistence: results.clone(),
            media: None,
            progress: Arc::new(TracingProgressSink),
        },
    );
    scheduler.start()?;

    let count = params.count;
    let job_id = scheduler.submit(params)?;
    info!(job_id = %job_id, count, "Batch submitted");

    let snapshot = scheduler
        .wait_for_terminal(&job_id, batch_deadline(config, count))
        .await?;
    scheduler.shutdown().await;

    if snapshot.status != JobStatus::Completed {
        bail!(
            "Job {} failed: {}",
            job_id,
            snapshot.error.unwrap_or_else(|| "unknown error".to_string())
        );
    }

    let stored = snapshot
        .result_ref
        .as_deref()
        .and_then(|reference| results.get(reference))
        .context("Completed job has no stored result")?;
    Ok(serde_json::to_string_pretty(&stored)?)
}

/// Upper bound on a batch: every item exhausting every attempt and backoff.
fn batch_deadline(config: &SimmerConfig, count: usize) -> Duration {
    let resilience = &config.resilience;
    let per_item_ms = resilience.max_attempts as u64
        * (resilience.per_attempt_timeout_ms + resilience.max_backoff_ms);
    Duration::from_millis(per_item_ms.saturating_mul(count as u64 + 1)) + Duration::from_secs(60)
}
