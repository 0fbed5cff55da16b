//! Boundary to the training runtime.
//!
//! The runtime stores trajectories, applies gradient updates and manages
//! checkpoints. The harness only needs the handful of calls in
//! [`TrainingBackend`]; [`HttpBackend`] speaks them as JSON over HTTP.

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::BackendConfig;
use crate::model::ModelHandle;
use crate::trajectory::{Trajectory, TrajectoryGroup};

/// Which split a batch of logged trajectories belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Val,
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Split::Train => write!(f, "train"),
            Split::Val => write!(f, "val"),
        }
    }
}

/// Optimiser settings for one training call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrainConfig {
    pub learning_rate: f64,
}

/// The operations the driver needs from the training runtime.
///
/// Calls after `register` apply to the most recently registered model.
#[allow(async_fn_in_trait)]
pub trait TrainingBackend: Send + Sync {
    async fn register(&self, model: &ModelHandle) -> Result<()>;

    /// The registered model's current global training step.
    async fn get_step(&self) -> Result<u64>;

    async fn train(&self, groups: &[TrajectoryGroup], config: &TrainConfig) -> Result<()>;

    async fn log(&self, groups: &[TrajectoryGroup], split: Split) -> Result<()>;

    /// Drop every checkpoint but the latest.
    async fn delete_checkpoints(&self) -> Result<()>;

    /// Copy the latest checkpoint to remote storage.
    async fn push_checkpoint(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
struct ModelRef {
    model: String,
    project: String,
}

#[derive(Serialize)]
struct GroupPayload<'a> {
    trajectories: &'a [Trajectory],
    advantages: Vec<f64>,
    mean_reward: f64,
}

impl<'a> GroupPayload<'a> {
    fn from_groups(groups: &'a [TrajectoryGroup]) -> Vec<Self> {
        groups
            .iter()
            .map(|g| GroupPayload {
                trajectories: &g.trajectories,
                advantages: g.advantages(),
                mean_reward: g.mean_reward(),
            })
            .collect()
    }
}

#[derive(Deserialize)]
struct StepResponse {
    step: u64,
}

/// [`TrainingBackend`] over a JSON HTTP API.
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    registered: Mutex<Option<ModelRef>>,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build reqwest client for the training backend")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            registered: Mutex::new(None),
        })
    }

    fn current(&self) -> Result<ModelRef> {
        let guard = self
            .registered
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard
            .clone()
            .context("no model registered with the training backend")
    }

    async fn post(&self, route: &str, body: &serde_json::Value) -> Result<reqwest::Response> {
        let url = format!("{}{route}", self.base_url);
        debug!(url = %url, "training backend request");

        let mut req = self.http.post(&url).json(body);
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }
        let resp = req
            .send()
            .await
            .with_context(|| format!("Failed to reach training backend at {url}"))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status = %status, route, body = %text, "Training backend returned error");
            bail!("Training backend {route} returned {status}: {text}");
        }
        Ok(resp)
    }

    fn with_model(model: &ModelRef, mut body: serde_json::Value) -> serde_json::Value {
        if let Some(obj) = body.as_object_mut() {
            obj.insert("model".into(), model.model.clone().into());
            obj.insert("project".into(), model.project.clone().into());
        }
        body
    }
}

impl TrainingBackend for HttpBackend {
    async fn register(&self, model: &ModelHandle) -> Result<()> {
        let model_ref = ModelRef {
            model: model.name.clone(),
            project: model.project.clone(),
        };
        let body = Self::with_model(
            &model_ref,
            serde_json::json!({
                "base_model": model.base_model,
                "trainable": model.is_trainable(),
            }),
        );
        self.post("/register", &body).await?;

        info!(model = %model.name, project = %model.project, "Registered model with training backend");
        *self
            .registered
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(model_ref);
        Ok(())
    }

    async fn get_step(&self) -> Result<u64> {
        let model = self.current()?;
        let resp = self
            .post("/step", &Self::with_model(&model, serde_json::json!({})))
            .await?;
        let parsed: StepResponse = resp
            .json()
            .await
            .context("Failed to parse training backend step response")?;
        Ok(parsed.step)
    }

    async fn train(&self, groups: &[TrajectoryGroup], config: &TrainConfig) -> Result<()> {
        let model = self.current()?;
        let body = Self::with_model(
            &model,
            serde_json::json!({
                "learning_rate": config.learning_rate,
                "groups": GroupPayload::from_groups(groups),
            }),
        );
        self.post("/train", &body).await?;
        info!(model = %model.model, groups = groups.len(), "Train step accepted");
        Ok(())
    }

    async fn log(&self, groups: &[TrajectoryGroup], split: Split) -> Result<()> {
        let model = self.current()?;
        let body = Self::with_model(
            &model,
            serde_json::json!({
                "split": split,
                "groups": GroupPayload::from_groups(groups),
            }),
        );
        self.post("/log", &body).await?;
        Ok(())
    }

    async fn delete_checkpoints(&self) -> Result<()> {
        let model = self.current()?;
        self.post("/checkpoints/delete", &Self::with_model(&model, serde_json::json!({})))
            .await?;
        Ok(())
    }

    async fn push_checkpoint(&self) -> Result<()> {
        let model = self.current()?;
        self.post("/checkpoints/push", &Self::with_model(&model, serde_json::json!({})))
            .await?;
        info!(model = %model.model, "Checkpoint pushed");
        Ok(())
    }
}
