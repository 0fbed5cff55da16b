//! The rollout engine: one scenario in, one scored trajectory out.
//!
//! A rollout walks a linear state machine:
//!
//!   Init -> Generating -> Judging(1) -> ... -> Judging(k) -> Scored
//!
//! Generation is a single call to the trainable model. Judging is delegated
//! to a [`RolloutTask`] strategy that issues its judge calls sequentially
//! through a [`JudgeSession`] and folds the answers into a reward and a fixed
//! set of metrics. The engine owns no mutable state, so `rollout` can be
//! called concurrently from many tasks against one shared judge.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::RolloutConfig;
use crate::judge::{Judge, JudgeRequest};
use crate::model::{ChatMessage, CompletionModel, CompletionRecord, CompletionReporter};
use crate::scenario::Scenario;
use crate::trajectory::Trajectory;

use super::listing::ListingTask;
use super::summary::SummaryTask;

// ---------------------------------------------------------------------------
// State and errors
// ---------------------------------------------------------------------------

/// Where a rollout is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloutState {
    Init,
    Generating,
    /// Waiting on the k-th judge call (1-based).
    Judging(usize),
    Scored,
}

impl fmt::Display for RolloutState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RolloutState::Init => write!(f, "init"),
            RolloutState::Generating => write!(f, "generating"),
            RolloutState::Judging(k) => write!(f, "judging({k})"),
            RolloutState::Scored => write!(f, "scored"),
        }
    }
}

fn transition(label: &str, state: RolloutState) {
    debug!(scenario = label, state = %state, "rollout transition");
}

/// Why a rollout produced no trajectory.
///
/// Judge failures never surface here: they degrade to per-criterion defaults.
#[derive(Debug, thiserror::Error)]
pub enum RolloutError {
    /// The model stopped because it hit its output budget.
    #[error("generation truncated at the {max_output_tokens}-token limit")]
    Truncated { max_output_tokens: usize },

    /// The generation call itself failed.
    #[error("generation failed")]
    Generation(#[source] anyhow::Error),
}

impl RolloutError {
    pub fn is_truncated(&self) -> bool {
        matches!(self, RolloutError::Truncated { .. })
    }
}

// ---------------------------------------------------------------------------
// Task strategy
// ---------------------------------------------------------------------------

/// Reward and metrics produced by a task's judging protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    pub reward: f64,
    pub metrics: BTreeMap<String, f64>,
}

/// Sequential judge access for one rollout.
///
/// Every call advances the rollout to the next `Judging(k)` state.
pub struct JudgeSession<'a, J> {
    judge: &'a J,
    label: &'a str,
    calls: usize,
}

impl<'a, J: Judge> JudgeSession<'a, J> {
    pub fn new(judge: &'a J, label: &'a str) -> Self {
        Self {
            judge,
            label,
            calls: 0,
        }
    }

    pub async fn ask(&mut self, request: JudgeRequest) -> String {
        self.calls += 1;
        transition(self.label, RolloutState::Judging(self.calls));
        self.judge.judge(request).await
    }

    /// Judge calls issued so far.
    pub fn calls(&self) -> usize {
        self.calls
    }

    pub fn label(&self) -> &str {
        self.label
    }
}

/// A generation task: how to prompt for a candidate and how to score it.
#[allow(async_fn_in_trait)]
pub trait RolloutTask: Send + Sync {
    type Scenario: Send + Sync;

    fn name(&self) -> &'static str;

    /// System and user prompt for the trainable model.
    fn messages(&self, scenario: &Self::Scenario) -> Vec<ChatMessage>;

    fn max_output_tokens(&self) -> usize;

    /// Every key `score` puts into the metrics map.
    fn metric_keys(&self) -> &'static [&'static str];

    /// A candidate that bypasses generation entirely.
    fn fixed_candidate(&self, _scenario: &Self::Scenario) -> Option<String> {
        None
    }

    /// Run the judging protocol over `candidate`.
    async fn score<J: Judge>(
        &self,
        session: &mut JudgeSession<'_, J>,
        scenario: &Self::Scenario,
        candidate: &str,
    ) -> Score;

    /// Metadata attached to the completion report, or `None` to skip
    /// reporting for this task.
    fn report_metadata(&self, _scenario: &Self::Scenario, _score: &Score) -> Option<Map<String, Value>> {
        None
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Turns scenarios into scored trajectories.
pub struct RolloutEngine<J> {
    judge: Arc<J>,
    summary: SummaryTask,
    listing: ListingTask,
    verbose_sample_rate: f64,
    reporter: Option<CompletionReporter>,
}

impl<J: Judge> RolloutEngine<J> {
    pub fn new(judge: Arc<J>, config: &RolloutConfig) -> Result<Self> {
        Ok(Self {
            judge,
            summary: SummaryTask::new(config)?,
            listing: ListingTask::new(config),
            verbose_sample_rate: config.verbose_sample_rate,
            reporter: None,
        })
    }

    /// Report every generated completion that the task opts into.
    pub fn with_reporter(mut self, reporter: Option<CompletionReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn judge(&self) -> &Arc<J> {
        &self.judge
    }

    /// Roll out one scenario against `model`.
    pub async fn rollout<M: CompletionModel>(
        &self,
        model: &M,
        scenario: &Scenario,
    ) -> Result<Trajectory, RolloutError> {
        let label = scenario.label();
        match scenario {
            Scenario::Summary(s) => self.run(&self.summary, model, s, &label).await,
            Scenario::Listing(l) => self.run(&self.listing, model, l, &label).await,
        }
    }

    async fn run<T, M>(
        &self,
        task: &T,
        model: &M,
        scenario: &T::Scenario,
        label: &str,
    ) -> Result<Trajectory, RolloutError>
    where
        T: RolloutTask,
        M: CompletionModel,
    {
        transition(label, RolloutState::Init);
        let mut messages = task.messages(scenario);

        let requested_at = Utc::now();
        let (candidate, generated) = match task.fixed_candidate(scenario) {
            Some(text) => (text, None),
            None => {
                transition(label, RolloutState::Generating);
                let max_output_tokens = task.max_output_tokens();
                let choice = model
                    .complete(&messages, max_output_tokens)
                    .await
                    .map_err(RolloutError::Generation)?;
                if choice.is_truncated() {
                    warn!(
                        scenario = label,
                        model = model.name(),
                        max_output_tokens,
                        "generation truncated"
                    );
                    return Err(RolloutError::Truncated { max_output_tokens });
                }
                (choice.message.content.clone(), Some(choice))
            }
        };
        let received_at = Utc::now();

        let mut session = JudgeSession::new(self.judge.as_ref(), label);
        let score = task.score(&mut session, scenario, &candidate).await;
        transition(label, RolloutState::Scored);
        debug_assert!(
            task.metric_keys().iter().all(|k| score.metrics.contains_key(*k)),
            "task {} left metrics unset",
            task.name()
        );

        if self.sampled() {
            let excerpt: String = candidate.chars().take(500).collect();
            info!(
                scenario = label,
                task = task.name(),
                reward = score.reward,
                metrics = ?score.metrics,
                judge_calls = session.calls(),
                candidate = %excerpt,
                "sampled rollout"
            );
        }

        let finish_reason = generated.as_ref().and_then(|c| c.finish_reason.clone());
        if let (Some(reporter), Some(choice)) = (&self.reporter, generated) {
            if let Some(metadata) = task.report_metadata(scenario, &score) {
                reporter
                    .report(CompletionRecord {
                        requested_at,
                        received_at,
                        model: model.name().to_string(),
                        messages: messages.clone(),
                        choice,
                        metadata,
                    })
                    .await;
            }
        }

        messages.push(ChatMessage::assistant(candidate));
        Ok(Trajectory::new(messages, score.reward, score.metrics, finish_reason))
    }

    fn sampled(&self) -> bool {
        self.verbose_sample_rate > 0.0 && rand::random::<f64>() < self.verbose_sample_rate
    }
}
