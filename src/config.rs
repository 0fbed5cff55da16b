use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Complete configuration for the rollout harness.
///
/// Every section falls back to its defaults, so a config file only needs the
/// fields it wants to change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub judge: JudgeConfig,
    pub policy: PolicyConfig,
    pub backend: BackendConfig,
    pub rollout: RolloutConfig,
    pub training: TrainingConfig,
    pub dataset: DatasetConfig,
    pub report: ReportConfig,
    pub benchmark: BenchmarkConfig,
}

/// Which generation task the harness trains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Document summarization scored by question answering.
    Summary,
    /// Job-offer listing scored by five rubric criteria.
    Listing,
}

impl TaskKind {
    /// Default `(validation, training)` trajectory-group sizes.
    pub fn default_group_sizes(self) -> (usize, usize) {
        match self {
            TaskKind::Summary => (2, 2),
            TaskKind::Listing => (2, 10),
        }
    }

    /// Whether a strictly better validation mean pushes the checkpoint.
    pub fn pushes_best_checkpoint(self) -> bool {
        matches!(self, TaskKind::Listing)
    }
}

/// Judge endpoint and client behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    /// Base URL of the OpenAI-compatible judge API.
    pub api_base: String,
    /// Bearer token for the judge API.
    pub api_key: String,
    /// Judge model or deployment name.
    pub model: String,
    /// Maximum judge calls in flight across all rollouts (default: 20).
    pub max_concurrency: usize,
    /// Memoised answers kept before LRU eviction (default: 1024).
    pub cache_capacity: usize,
    /// Attempts per judge call before returning the failure sentinel (default: 3).
    pub max_retries: usize,
    /// Fixed delay between attempts in milliseconds (default: 3000).
    pub retry_delay_ms: u64,
    /// Per-request timeout in seconds (default: 10).
    pub timeout_secs: u64,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".into(),
            api_key: String::new(),
            model: "gpt-4o-mini".into(),
            max_concurrency: 20,
            cache_capacity: 1024,
            max_retries: 3,
            retry_delay_ms: 3000,
            timeout_secs: 10,
        }
    }
}

/// The trainable model and where it is served.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Base URL of the inference server hosting the trainable model.
    pub api_base: String,
    pub api_key: String,
    /// Model name; also the name inference requests use.
    pub name: String,
    pub project: String,
    /// Weights the trainable model starts from.
    pub base_model: String,
    pub timeout_secs: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8000/v1".into(),
            api_key: String::new(),
            name: "job-offer-agent".into(),
            project: "job-offer-generation".into(),
            base_model: "Qwen/Qwen2.5-14B-Instruct".into(),
            timeout_secs: 120,
        }
    }
}

/// Training runtime endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:7999".into(),
            api_key: String::new(),
            timeout_secs: 600,
        }
    }
}

/// Rollout scoring knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloutConfig {
    /// Fraction of rollouts logged verbosely for spot checks (default: 0.05).
    pub verbose_sample_rate: f64,
    /// Deducted from context inclusion per duplicated skill (default: 0.1).
    pub duplicate_skill_penalty: f64,
    /// Summaries longer than this many characters skip summary judging (default: 3000).
    pub summary_max_chars: usize,
    /// Generation budget for summaries (default: 1000).
    pub summary_max_tokens: usize,
    /// Generation budget for job offers (default: 1500).
    pub listing_max_tokens: usize,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            verbose_sample_rate: 0.05,
            duplicate_skill_penalty: 0.1,
            summary_max_chars: 3000,
            summary_max_tokens: 1000,
            listing_max_tokens: 1500,
        }
    }
}

/// Epoch/batch driver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Training scenarios per batch (default: 10).
    pub batch_size: usize,
    /// Passes over the training set (default: 1).
    pub num_epochs: usize,
    /// Global step at which training stops (default: 1000).
    pub max_steps: u64,
    /// Learning rate handed to the runtime (default: 5e-5).
    pub learning_rate: f64,
    /// Rollouts per validation scenario; task default when unset.
    pub val_group_size: Option<usize>,
    /// Rollouts per training scenario; task default when unset.
    pub train_group_size: Option<usize>,
    /// Seed for the validation/training partition (default: 80).
    pub shuffle_seed: u64,
    /// Cap on the default validation size of 10% (default: 25).
    pub max_val_size: usize,
    /// Explicit validation size, overriding the default.
    pub val_size: Option<usize>,
    /// Explicit training size; defaults to everything after validation.
    pub train_size: Option<usize>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            num_epochs: 1,
            max_steps: 1000,
            learning_rate: 5e-5,
            val_group_size: None,
            train_group_size: None,
            shuffle_seed: 80,
            max_val_size: 25,
            val_size: None,
            train_size: None,
        }
    }
}

impl TrainingConfig {
    /// `(validation, training)` group sizes for `task`.
    pub fn group_sizes(&self, task: TaskKind) -> (usize, usize) {
        let (val, train) = task.default_group_sizes();
        (
            self.val_group_size.unwrap_or(val),
            self.train_group_size.unwrap_or(train),
        )
    }
}

/// Where scenarios come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Local JSON file path or `http(s)://` URL.
    pub source: String,
    pub task: TaskKind,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            source: "data/job_offer_dataset.json".into(),
            task: TaskKind::Listing,
        }
    }
}

/// Optional completion reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub api_base: String,
    /// Reporting is disabled while this is empty.
    pub api_key: String,
    pub project: String,
    pub timeout_secs: u64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            api_base: "https://app.openpipe.ai/api/v1".into(),
            api_key: String::new(),
            project: "job-offer-generation".into(),
            timeout_secs: 10,
        }
    }
}

/// Reference models scored by the `benchmark` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// OpenAI-compatible endpoint serving the reference models.
    pub api_base: String,
    pub api_key: String,
    /// Inference model names; the part after the last `/` names the model.
    pub models: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            api_base: "https://openrouter.ai/api/v1".into(),
            api_key: String::new(),
            models: vec![
                "openai/gpt-4o".into(),
                "openai/gpt-4o-mini".into(),
                "openai/gpt-4.1".into(),
            ],
            timeout_secs: 120,
        }
    }
}

impl HarnessConfig {
    /// Load a config from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Fill unset secrets and endpoints from environment variables.
    pub fn fill_from_env(&mut self) {
        self.fill_from(|key| std::env::var(key).ok());
    }

    fn fill_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let fallback = lookup("OPENAI_API_KEY");

        if self.judge.api_key.is_empty() {
            if let Some(key) = lookup("JUDGE_API_KEY").or_else(|| fallback.clone()) {
                self.judge.api_key = key;
            }
        }
        if let Some(base) = lookup("JUDGE_API_BASE") {
            self.judge.api_base = base;
        }
        if let Some(model) = lookup("JUDGE_MODEL") {
            self.judge.model = model;
        }
        if self.policy.api_key.is_empty() {
            if let Some(key) = lookup("POLICY_API_KEY").or(fallback) {
                self.policy.api_key = key;
            }
        }
        if self.backend.api_key.is_empty() {
            if let Some(key) = lookup("BACKEND_API_KEY") {
                self.backend.api_key = key;
            }
        }
        if self.report.api_key.is_empty() {
            if let Some(key) = lookup("REPORT_API_KEY") {
                self.report.api_key = key;
            }
        }
        if self.benchmark.api_key.is_empty() {
            if let Some(key) = lookup("BENCHMARK_API_KEY") {
                self.benchmark.api_key = key;
            }
        }
    }
}
