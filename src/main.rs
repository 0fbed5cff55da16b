//! Rubric: judge-scored RL training for text generation tasks.
//!
//! Subcommands:
//!
//! - `train`     -- Run the epoch/batch training loop against the runtime
//! - `benchmark` -- Score reference models on the validation split
//! - `split`     -- Show the deterministic validation/training partition

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rubric::config::{HarnessConfig, TaskKind};
use rubric::judge::JudgeClient;
use rubric::model::{CompletionReporter, LlmClient, ModelHandle};
use rubric::rollout::RolloutEngine;
use rubric::scenario::{load_scenarios, split_dataset, DatasetSplit, Scenario};
use rubric::training::{HttpBackend, TrainingBackend, TrainingDriver};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// Rubric: judge-scored RL training for text generation tasks
#[derive(Parser)]
#[command(name = "rubric", version, about)]
struct Cli {
    /// Path to a JSON configuration file (uses defaults if not provided).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Which task to train, overriding the config file.
    #[arg(long, global = true)]
    task: Option<TaskKind>,

    /// Dataset path or URL, overriding the config file.
    #[arg(long, global = true)]
    dataset: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train the policy model, pushing the best checkpoint by validation score.
    Train,

    /// Score reference models on the validation split.
    Benchmark {
        /// Inference model name to benchmark; repeat for several. Defaults to
        /// the configured reference models.
        #[arg(long = "model")]
        models: Vec<String>,
    },

    /// Print the validation/training partition.
    Split {
        /// How many scenarios of each split to list.
        #[arg(long, default_value_t = 5)]
        show: usize,
    },
}

// ---------------------------------------------------------------------------
// Entrypoint
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // Reads RUST_LOG, defaults to info.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => HarnessConfig::load(path)?,
        None => HarnessConfig::default(),
    };
    config.fill_from_env();
    if let Some(task) = cli.task {
        config.dataset.task = task;
    }
    if let Some(dataset) = cli.dataset {
        config.dataset.source = dataset;
    }

    match cli.command {
        Commands::Train => cmd_train(&config).await,
        Commands::Benchmark { models } => cmd_benchmark(&config, models).await,
        Commands::Split { show } => cmd_split(&config, show).await,
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn load_split(config: &HarnessConfig) -> Result<DatasetSplit<Scenario>> {
    let scenarios = load_scenarios(&config.dataset)
        .await
        .context("Failed to load scenarios")?;
    split_dataset(scenarios, &config.training)
}

fn build_driver(config: &HarnessConfig) -> Result<TrainingDriver<JudgeClient, HttpBackend>> {
    let judge = Arc::new(JudgeClient::new(&config.judge)?);
    let reporter = CompletionReporter::from_config(&config.report)?;
    let engine = RolloutEngine::new(judge, &config.rollout)?.with_reporter(reporter);
    let backend = HttpBackend::new(&config.backend)?;
    Ok(TrainingDriver::new(
        engine,
        backend,
        config.training.clone(),
        config.dataset.task,
    ))
}

async fn cmd_train(config: &HarnessConfig) -> Result<()> {
    tracing::info!(task = ?config.dataset.task, "Starting training");

    let dataset = load_split(config).await?;
    let driver = build_driver(config)?;

    let policy = &config.policy;
    let client = LlmClient::new(
        &policy.api_base,
        &policy.api_key,
        Duration::from_secs(policy.timeout_secs),
    )?;
    let model = ModelHandle::new(
        &policy.name,
        &policy.project,
        Some(policy.base_model.clone()),
        &policy.name,
        client,
    );
    driver.backend().register(&model).await?;

    let history = driver.train(&model, &dataset).await?;

    if let Some(last) = history.last() {
        let best = history
            .iter()
            .map(|m| m.val_mean_reward)
            .fold(f64::NEG_INFINITY, f64::max);
        tracing::info!(
            batches = history.len(),
            final_step = last.step,
            final_val_mean = last.val_mean_reward,
            best_val_mean = best,
            "Training complete"
        );
    } else {
        tracing::warn!("No batches were run; check batch_size, max_steps and dataset size");
    }
    Ok(())
}

async fn cmd_benchmark(config: &HarnessConfig, models: Vec<String>) -> Result<()> {
    let bench = &config.benchmark;
    let names = if models.is_empty() {
        bench.models.clone()
    } else {
        models
    };

    let handles = names
        .iter()
        .map(|inference_name| -> Result<ModelHandle> {
            let client = LlmClient::new(
                &bench.api_base,
                &bench.api_key,
                Duration::from_secs(bench.timeout_secs),
            )?;
            let name = inference_name.rsplit('/').next().unwrap_or(inference_name);
            Ok(ModelHandle::new(
                name,
                &config.policy.project,
                None,
                inference_name,
                client,
            ))
        })
        .collect::<Result<Vec<_>>>()?;

    let dataset = load_split(config).await?;
    let driver = build_driver(config)?;
    let results = driver.benchmark(&handles, &dataset.validation).await?;

    for r in &results {
        println!(
            "{:<24} mean reward {:>7.3}  ({} rollouts, {} dropped)",
            r.model, r.mean_reward, r.trajectories, r.dropped
        );
    }
    Ok(())
}

async fn cmd_split(config: &HarnessConfig, show: usize) -> Result<()> {
    let dataset = load_split(config).await?;

    println!("Dataset: {}", config.dataset.source);
    println!("  Task: {:?}", config.dataset.task);
    println!("  Seed: {}", config.training.shuffle_seed);
    println!("  Validation scenarios: {}", dataset.validation.len());
    println!("  Training scenarios: {}", dataset.training.len());
    println!();

    for (title, items) in [("Validation", &dataset.validation), ("Training", &dataset.training)] {
        println!("{title} (first {}):", show.min(items.len()));
        for scenario in items.iter().take(show) {
            println!("  {}", scenario.label());
        }
        println!();
    }
    Ok(())
}
