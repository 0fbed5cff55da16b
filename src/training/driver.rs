//! Epoch/batch driver.
//!
//! ```text
//! start = backend.get_step()
//! for epoch in 0..num_epochs:
//!   shuffle training scenarios
//!   for batch in 0..num_batches:
//!     step = start + epoch * num_batches + batch     (stop at max_steps)
//!     concurrently roll out every validation scenario and the batch slice
//!     log validation groups, delete old checkpoints, train on the batch
//!     push the checkpoint if validation strictly improved (listing only)
//! ```
//!
//! Rollouts that fail are logged and dropped; a truncated generation gets one
//! more attempt first. Groups left empty are dropped too, so the runtime only
//! ever sees groups it can compute advantages for.

use anyhow::{bail, Result};
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{info, warn};

use crate::config::{TaskKind, TrainingConfig};
use crate::judge::Judge;
use crate::model::{CompletionModel, ModelHandle};
use crate::rollout::{RolloutEngine, RolloutError};
use crate::scenario::{DatasetSplit, Scenario};
use crate::trajectory::{mean_reward, Trajectory, TrajectoryGroup};

use super::backend::{Split, TrainConfig, TrainingBackend};

/// What happened in one training batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchMetrics {
    pub epoch: usize,
    pub step: u64,
    pub val_mean_reward: f64,
    pub train_mean_reward: f64,
    pub val_trajectories: usize,
    pub train_trajectories: usize,
    /// Rollouts that produced no trajectory.
    pub dropped: usize,
    /// Whether this batch pushed a new best checkpoint.
    pub pushed: bool,
}

/// Validation score of one reference model.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkResult {
    pub model: String,
    pub mean_reward: f64,
    pub trajectories: usize,
    pub dropped: usize,
}

/// Batches per epoch: limited by the training set and by the steps left
/// before `max_steps`.
pub fn batches_per_epoch(
    train_len: usize,
    batch_size: usize,
    start_step: u64,
    max_steps: u64,
    num_epochs: usize,
) -> usize {
    if batch_size == 0 || num_epochs == 0 {
        return 0;
    }
    let by_data = train_len / batch_size;
    let by_steps = max_steps.saturating_sub(start_step) / num_epochs as u64;
    by_data.min(usize::try_from(by_steps).unwrap_or(usize::MAX))
}

pub struct TrainingDriver<J, B> {
    engine: RolloutEngine<J>,
    backend: B,
    config: TrainingConfig,
    task: TaskKind,
}

impl<J: Judge, B: TrainingBackend> TrainingDriver<J, B> {
    pub fn new(engine: RolloutEngine<J>, backend: B, config: TrainingConfig, task: TaskKind) -> Self {
        Self {
            engine,
            backend,
            config,
            task,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Train `model` (already registered with the backend) on `dataset`.
    pub async fn train<M: CompletionModel>(
        &self,
        model: &M,
        dataset: &DatasetSplit<Scenario>,
    ) -> Result<Vec<BatchMetrics>> {
        let config = &self.config;
        if config.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        if config.num_epochs == 0 {
            bail!("num_epochs must be at least 1");
        }

        let (val_group_size, train_group_size) = config.group_sizes(self.task);
        let start_step = self.backend.get_step().await?;
        let num_batches = batches_per_epoch(
            dataset.training.len(),
            config.batch_size,
            start_step,
            config.max_steps,
            config.num_epochs,
        );

        info!(
            model = model.name(),
            task = ?self.task,
            start_step,
            num_epochs = config.num_epochs,
            num_batches,
            batch_size = config.batch_size,
            val_scenarios = dataset.validation.len(),
            val_group_size,
            train_group_size,
            "Starting training"
        );

        let mut training = dataset.training.clone();
        let mut best = 0.0_f64;
        let mut history = Vec::new();

        'epochs: for epoch in 0..config.num_epochs {
            let mut rng = StdRng::seed_from_u64(config.shuffle_seed.wrapping_add(epoch as u64));
            training.shuffle(&mut rng);

            for batch in 0..num_batches {
                let step = start_step + (epoch * num_batches + batch) as u64;
                if step >= config.max_steps {
                    break 'epochs;
                }

                let start = batch * config.batch_size;
                let batch_scenarios: Vec<Scenario> = training[start..start + config.batch_size]
                    .iter()
                    .map(|s| s.at_step(step))
                    .collect();
                let val_scenarios: Vec<Scenario> =
                    dataset.validation.iter().map(|s| s.at_step(step)).collect();

                let ((val_groups, val_dropped), (train_groups, train_dropped)) = futures::join!(
                    self.gather(model, &val_scenarios, val_group_size),
                    self.gather(model, &batch_scenarios, train_group_size),
                );

                let val_mean = mean_reward(&val_groups);
                self.backend.log(&val_groups, Split::Val).await?;
                self.backend.delete_checkpoints().await?;

                if train_groups.is_empty() {
                    warn!(epoch, step, "No training groups survived, skipping train call");
                } else {
                    self.backend
                        .train(
                            &train_groups,
                            &TrainConfig {
                                learning_rate: config.learning_rate,
                            },
                        )
                        .await?;
                }

                let pushed = self.task.pushes_best_checkpoint() && val_mean > best;
                if pushed {
                    info!(step, val_mean, previous_best = best, "New best validation score");
                    best = val_mean;
                    self.backend.push_checkpoint().await?;
                }

                let metrics = BatchMetrics {
                    epoch,
                    step,
                    val_mean_reward: val_mean,
                    train_mean_reward: mean_reward(&train_groups),
                    val_trajectories: val_groups.iter().map(TrajectoryGroup::len).sum(),
                    train_trajectories: train_groups.iter().map(TrajectoryGroup::len).sum(),
                    dropped: val_dropped + train_dropped,
                    pushed,
                };
                info!(
                    epoch,
                    step,
                    val_mean = metrics.val_mean_reward,
                    train_mean = metrics.train_mean_reward,
                    train_trajectories = metrics.train_trajectories,
                    dropped = metrics.dropped,
                    pushed,
                    "Batch completed"
                );
                history.push(metrics);
            }
        }

        info!(batches = history.len(), best_val_mean = best, "Training finished");
        Ok(history)
    }

    /// Score each reference model on the validation set, log the result as a
    /// validation split and push it.
    pub async fn benchmark(
        &self,
        models: &[ModelHandle],
        validation: &[Scenario],
    ) -> Result<Vec<BenchmarkResult>> {
        let (group_size, _) = self.config.group_sizes(self.task);
        let mut results = Vec::with_capacity(models.len());

        for model in models {
            self.backend.register(model).await?;
            let (groups, dropped) = self.gather(model, validation, group_size).await;

            let result = BenchmarkResult {
                model: model.name.clone(),
                mean_reward: mean_reward(&groups),
                trajectories: groups.iter().map(TrajectoryGroup::len).sum(),
                dropped,
            };
            self.backend.log(&groups, Split::Val).await?;
            self.backend.push_checkpoint().await?;

            info!(
                model = %result.model,
                mean_reward = result.mean_reward,
                trajectories = result.trajectories,
                dropped,
                "Benchmark completed"
            );
            results.push(result);
        }
        Ok(results)
    }

    /// Roll out `group_size` candidates per scenario, all concurrently.
    /// Returns the non-empty groups and the number of dropped rollouts.
    async fn gather<M: CompletionModel>(
        &self,
        model: &M,
        scenarios: &[Scenario],
        group_size: usize,
    ) -> (Vec<TrajectoryGroup>, usize) {
        let groups = join_all(scenarios.iter().map(|scenario| async move {
            join_all((0..group_size).map(|_| self.rollout_with_retry(model, scenario))).await
        }))
        .await;

        let mut dropped = 0;
        let mut kept = Vec::with_capacity(groups.len());
        for (scenario, results) in scenarios.iter().zip(groups) {
            let mut trajectories = Vec::with_capacity(results.len());
            for result in results {
                match result {
                    Ok(t) => trajectories.push(t),
                    Err(e) => {
                        warn!(scenario = %scenario.label(), error = ?e, "Dropping failed rollout");
                        dropped += 1;
                    }
                }
            }
            if !trajectories.is_empty() {
                kept.push(TrajectoryGroup::new(trajectories));
            }
        }
        (kept, dropped)
    }

    async fn rollout_with_retry<M: CompletionModel>(
        &self,
        model: &M,
        scenario: &Scenario,
    ) -> Result<Trajectory, RolloutError> {
        match self.engine.rollout(model, scenario).await {
            Err(e) if e.is_truncated() => {
                warn!(scenario = %scenario.label(), "Generation truncated, retrying once");
                self.engine.rollout(model, scenario).await
            }
            other => other,
        }
    }
}
