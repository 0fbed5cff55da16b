//! Summarization scoring.
//!
//! A summary is worth as many reference questions as a judge can answer
//! correctly from it alone. For every question the judge first answers from
//! the summary, then a second judge compares that answer to the golden one
//! and replies `1` or `0`. The same pair of calls is made against the full
//! document to give the baseline the summary is measured against.
//!
//! Summaries containing Han ideographs or longer than the configured
//! character limit are not judged: they score zero on every question while
//! the full-document baseline still runs.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::debug;

use crate::config::RolloutConfig;
use crate::judge::{parse_binary, Judge, JudgeRequest};
use crate::model::prompt::{answer_question_prompt, compare_answers_prompt, summary_prompt};
use crate::model::ChatMessage;
use crate::scenario::{QaPair, SummaryScenario};

use super::engine::{JudgeSession, RolloutTask, Score};

pub const SUMMARY_METRICS: &[&str] = &["len", "percent", "percent_diff", "percent_full", "word_count"];

pub struct SummaryTask {
    max_chars: usize,
    max_output_tokens: usize,
    han: Regex,
}

impl SummaryTask {
    pub fn new(config: &RolloutConfig) -> Result<Self> {
        Ok(Self {
            max_chars: config.summary_max_chars,
            max_output_tokens: config.summary_max_tokens,
            han: Regex::new(r"\p{Han}").context("failed to compile Han script pattern")?,
        })
    }

    /// Whether `summary` may be judged at all.
    pub fn accepts(&self, summary: &str) -> bool {
        !self.han.is_match(summary) && summary.chars().count() <= self.max_chars
    }

    /// Answer `qa` from `context`, then grade the answer against the golden
    /// one in light of the full `document`.
    async fn answer_and_compare<J: Judge>(
        session: &mut JudgeSession<'_, J>,
        context: &str,
        document: &str,
        qa: &QaPair,
    ) -> f64 {
        let answer = session
            .ask(JudgeRequest::new(answer_question_prompt(context, &qa.question)))
            .await;
        let verdict = session
            .ask(JudgeRequest::new(compare_answers_prompt(
                document,
                &qa.question,
                &answer,
                &qa.answer,
            )))
            .await;
        parse_binary(&verdict)
    }
}

impl RolloutTask for SummaryTask {
    type Scenario = SummaryScenario;

    fn name(&self) -> &'static str {
        "summary"
    }

    fn messages(&self, scenario: &SummaryScenario) -> Vec<ChatMessage> {
        summary_prompt(scenario)
    }

    fn max_output_tokens(&self) -> usize {
        self.max_output_tokens
    }

    fn metric_keys(&self) -> &'static [&'static str] {
        SUMMARY_METRICS
    }

    fn fixed_candidate(&self, scenario: &SummaryScenario) -> Option<String> {
        scenario.use_full().then(|| scenario.document().to_string())
    }

    async fn score<J: Judge>(
        &self,
        session: &mut JudgeSession<'_, J>,
        scenario: &SummaryScenario,
        summary: &str,
    ) -> Score {
        let allowed = self.accepts(summary);
        if !allowed {
            debug!(
                scenario = session.label(),
                chars = summary.chars().count(),
                "summary rejected by guard, skipping summary-based judging"
            );
        }

        let document = scenario.document();
        let mut matched = 0.0;
        let mut matched_full = 0.0;
        for qa in scenario.questions() {
            if allowed {
                matched += Self::answer_and_compare(session, summary, document, qa).await;
            }
            matched_full += Self::answer_and_compare(session, document, document, qa).await;
        }

        let n = scenario.questions().len() as f64;
        let percent = matched / n;
        let percent_full = matched_full / n;

        let metrics = BTreeMap::from([
            ("percent".to_string(), percent),
            ("percent_full".to_string(), percent_full),
            ("percent_diff".to_string(), percent - percent_full),
            ("word_count".to_string(), summary.split_whitespace().count() as f64),
            ("len".to_string(), summary.chars().count() as f64),
        ]);

        Score {
            reward: matched,
            metrics,
        }
    }
}
