//! Job-offer scoring.
//!
//! Five criteria are judged in a fixed order, each worth 20% of the total:
//!
//! | criterion              | judge answer                                    | default |
//! |------------------------|-------------------------------------------------|---------|
//! | `language_consistency` | `{"answer": "YES" \| "NO"}`                     | 0.0     |
//! | `xml_format`           | `{"valid_xml": bool, "has_required_tags": bool}` | 0.0     |
//! | `context_inclusion`    | `{"missing_skills": [..], "duplicate_skills": [..]}` | 0.0 |
//! | `skill_relevance`      | `{"new_skills": [..], "irrelevant_new_skills": [..]}` | 0.5 |
//! | `skill_completeness`   | `{"missing_essential_skills": [{"skill", "importance"}]}` | 0.5 |
//!
//! The default applies whenever the judge answer cannot be used, including
//! the client's failure sentinel. The reward is the weighted total scaled to
//! 0..10.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::RolloutConfig;
use crate::judge::{extract_as, Judge, JudgeRequest};
use crate::model::prompt::{
    context_inclusion_judge_prompt, language_judge_prompt, listing_prompt,
    skill_completeness_judge_prompt, skill_relevance_judge_prompt, xml_judge_prompt,
};
use crate::model::ChatMessage;
use crate::scenario::ListingScenario;

use super::engine::{JudgeSession, RolloutTask, Score};

pub const CRITERIA: [&str; 5] = [
    "language_consistency",
    "xml_format",
    "context_inclusion",
    "skill_relevance",
    "skill_completeness",
];

pub const LISTING_METRICS: &[&str] = &[
    "context_inclusion",
    "language_consistency",
    "skill_completeness",
    "skill_relevance",
    "total_score",
    "xml_format",
];

const CRITERION_WEIGHT: f64 = 0.2;
const REWARD_SCALE: f64 = 10.0;

// ---------------------------------------------------------------------------
// Judge answers
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LanguageVerdict {
    answer: String,
}

#[derive(Debug, Deserialize)]
struct XmlVerdict {
    valid_xml: bool,
    has_required_tags: bool,
}

#[derive(Debug, Deserialize)]
struct InclusionVerdict {
    missing_skills: Vec<String>,
    #[serde(default)]
    duplicate_skills: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RelevanceVerdict {
    new_skills: Vec<String>,
    #[serde(default)]
    irrelevant_new_skills: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MissingSkill {
    #[allow(dead_code)]
    skill: String,
    importance: f64,
}

#[derive(Debug, Deserialize)]
struct CompletenessVerdict {
    missing_essential_skills: Vec<MissingSkill>,
}

/// Score `raw` with `f`, or fall back to `default` when it does not parse.
fn score_or<T: DeserializeOwned>(criterion: &str, raw: &str, default: f64, f: impl FnOnce(T) -> f64) -> f64 {
    match extract_as::<T>(raw) {
        Ok(verdict) => f(verdict),
        Err(e) => {
            debug!(criterion, error = %e, "unusable judge answer, using default");
            default
        }
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

pub struct ListingTask {
    duplicate_penalty: f64,
    max_output_tokens: usize,
}

impl ListingTask {
    pub fn new(config: &RolloutConfig) -> Self {
        Self {
            duplicate_penalty: config.duplicate_skill_penalty,
            max_output_tokens: config.listing_max_tokens,
        }
    }

    fn language_score(raw: &str) -> f64 {
        score_or("language_consistency", raw, 0.0, |v: LanguageVerdict| {
            if v.answer.trim() == "YES" {
                1.0
            } else {
                0.0
            }
        })
    }

    fn xml_score(raw: &str) -> f64 {
        score_or("xml_format", raw, 0.0, |v: XmlVerdict| {
            if v.valid_xml && v.has_required_tags {
                1.0
            } else {
                0.0
            }
        })
    }

    fn inclusion_score(&self, raw: &str, required: usize) -> f64 {
        score_or("context_inclusion", raw, 0.0, |v: InclusionVerdict| {
            let missing = v.missing_skills.len().min(required);
            let included = (required - missing) as f64 / required as f64;
            let penalty = self.duplicate_penalty * v.duplicate_skills.len() as f64;
            (included - penalty).clamp(0.0, 1.0)
        })
    }

    fn relevance_score(raw: &str) -> f64 {
        score_or("skill_relevance", raw, 0.5, |v: RelevanceVerdict| {
            let added = v.new_skills.len();
            if added == 0 {
                return 1.0;
            }
            let irrelevant = v.irrelevant_new_skills.len().min(added);
            (added - irrelevant) as f64 / added as f64
        })
    }

    fn completeness_score(raw: &str) -> f64 {
        score_or("skill_completeness", raw, 0.5, |v: CompletenessVerdict| {
            let missing: f64 = v
                .missing_essential_skills
                .iter()
                .map(|s| s.importance.clamp(0.0, 1.0))
                .sum();
            1.0 - missing.min(1.0)
        })
    }
}

impl RolloutTask for ListingTask {
    type Scenario = ListingScenario;

    fn name(&self) -> &'static str {
        "listing"
    }

    fn messages(&self, scenario: &ListingScenario) -> Vec<ChatMessage> {
        listing_prompt(scenario)
    }

    fn max_output_tokens(&self) -> usize {
        self.max_output_tokens
    }

    fn metric_keys(&self) -> &'static [&'static str] {
        LISTING_METRICS
    }

    async fn score<J: Judge>(
        &self,
        session: &mut JudgeSession<'_, J>,
        scenario: &ListingScenario,
        offer: &str,
    ) -> Score {
        let mut scores = BTreeMap::new();

        let raw = session
            .ask(JudgeRequest::new(language_judge_prompt(scenario.language(), offer)).max_output_tokens(50))
            .await;
        scores.insert("language_consistency", Self::language_score(&raw));

        let raw = session
            .ask(JudgeRequest::new(xml_judge_prompt(offer)).max_output_tokens(100))
            .await;
        scores.insert("xml_format", Self::xml_score(&raw));

        let skills = scenario.skills();
        let inclusion = if skills.is_empty() {
            1.0
        } else {
            let raw = session
                .ask(JudgeRequest::new(context_inclusion_judge_prompt(skills, offer)).max_output_tokens(200))
                .await;
            self.inclusion_score(&raw, skills.len())
        };
        scores.insert("context_inclusion", inclusion);

        let raw = session
            .ask(
                JudgeRequest::new(skill_relevance_judge_prompt(scenario.job_title(), skills, offer))
                    .max_output_tokens(300),
            )
            .await;
        scores.insert("skill_relevance", Self::relevance_score(&raw));

        let raw = session
            .ask(
                JudgeRequest::new(skill_completeness_judge_prompt(
                    scenario.job_title(),
                    scenario.language(),
                    offer,
                ))
                .max_output_tokens(300),
            )
            .await;
        scores.insert("skill_completeness", Self::completeness_score(&raw));

        let total: f64 = CRITERIA.iter().map(|c| scores[c] * CRITERION_WEIGHT).sum();

        let mut metrics: BTreeMap<String, f64> =
            scores.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        metrics.insert("total_score".into(), total);

        Score {
            reward: total * REWARD_SCALE,
            metrics,
        }
    }

    fn report_metadata(&self, scenario: &ListingScenario, score: &Score) -> Option<Map<String, Value>> {
        let mut metadata = Map::new();
        metadata.insert("step".into(), Value::from(scenario.step()));
        metadata.insert("language".into(), Value::from(scenario.language()));
        metadata.insert("job_title".into(), Value::from(scenario.job_title()));
        for criterion in CRITERIA {
            if let Some(v) = score.metrics.get(criterion) {
                metadata.insert(criterion.into(), Value::from(*v));
            }
        }
        if let Some(total) = score.metrics.get("total_score") {
            metadata.insert("final_score".into(), Value::from(*total));
        }
        Some(metadata)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::judge::JUDGE_FAILURE;
    use crate::rollout::RolloutEngine;
    use crate::scenario::Scenario;
    use crate::testing::{ScriptedJudge, ScriptedModel};

    fn scenario(skills: &[&str]) -> Scenario {
        ListingScenario::new(
            "Software Engineer",
            "en",
            skills.iter().map(|s| s.to_string()).collect(),
        )
        .unwrap()
        .into()
    }

    /// Routes each criterion's prompt to a canned answer.
    fn judge(
        language: &'static str,
        xml: &'static str,
        inclusion: &'static str,
        relevance: &'static str,
        completeness: &'static str,
    ) -> ScriptedJudge {
        ScriptedJudge::new(move |prompt| {
            let answer = if prompt.starts_with("Is this text written in") {
                language
            } else if prompt.starts_with("Is this valid XML format") {
                xml
            } else if prompt.starts_with("Check which of the provided skills") {
                inclusion
            } else if prompt.contains("Evaluate ONLY the NEW skills") {
                relevance
            } else if prompt.contains("CRITICAL skills missing") {
                completeness
            } else {
                "unexpected prompt"
            };
            answer.to_string()
        })
    }

    async fn run(judge: ScriptedJudge, scenario: &Scenario) -> (crate::trajectory::Trajectory, Arc<ScriptedJudge>) {
        let judge = Arc::new(judge);
        let engine = RolloutEngine::new(judge.clone(), &RolloutConfig::default()).unwrap();
        let model = ScriptedModel::replying("<job_offer><title>Software Engineer</title></job_offer>");
        let traj = engine.rollout(&model, scenario).await.unwrap();
        (traj, judge)
    }

    #[tokio::test]
    async fn test_perfect_offer() {
        let (traj, judge) = run(
            judge(
                r#"{"answer": "YES"}"#,
                r#"{"valid_xml": true, "has_required_tags": true}"#,
                r#"```json
{"missing_skills": [], "duplicate_skills": []}
```"#,
                r#"{"new_skills": ["Docker", "AWS"], "irrelevant_new_skills": []}"#,
                r#"{"missing_essential_skills": []}"#,
            ),
            &scenario(&["Python", "Git"]),
        )
        .await;

        for c in CRITERIA {
            assert_eq!(traj.metric(c), Some(1.0), "{c}");
        }
        assert!((traj.metric("total_score").unwrap() - 1.0).abs() < 1e-9);
        assert!((traj.reward - 10.0).abs() < 1e-9);
        assert_eq!(judge.call_count(), 5);

        let budgets: Vec<usize> = judge.calls().iter().map(|c| c.max_output_tokens).collect();
        assert_eq!(budgets, vec![50, 100, 200, 300, 300]);
        assert!(judge.calls().iter().all(|c| c.temperature == 0.0));
    }

    #[tokio::test]
    async fn test_defaults_when_every_judge_fails() {
        let (traj, judge) = run(ScriptedJudge::constant(JUDGE_FAILURE), &scenario(&["Python"])).await;

        assert_eq!(traj.metric("language_consistency"), Some(0.0));
        assert_eq!(traj.metric("xml_format"), Some(0.0));
        assert_eq!(traj.metric("context_inclusion"), Some(0.0));
        assert_eq!(traj.metric("skill_relevance"), Some(0.5));
        assert_eq!(traj.metric("skill_completeness"), Some(0.5));
        assert!((traj.metric("total_score").unwrap() - 0.2).abs() < 1e-9);
        assert!((traj.reward - 2.0).abs() < 1e-9);
        assert_eq!(judge.call_count(), 5);
    }

    #[tokio::test]
    async fn test_empty_skills_skip_inclusion_judge() {
        let (traj, judge) = run(ScriptedJudge::constant("not json"), &scenario(&[])).await;

        assert_eq!(traj.metric("context_inclusion"), Some(1.0));
        assert_eq!(judge.call_count(), 4);
        assert!(judge
            .calls()
            .iter()
            .all(|c| !c.prompt.starts_with("Check which of the provided skills")));
        // 0 + 0 + 1 + 0.5 + 0.5
        assert!((traj.metric("total_score").unwrap() - 0.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_total_is_mean_of_criteria() {
        let (traj, _) = run(
            judge(
                r#"{"answer": "NO"}"#,
                r#"{"valid_xml": true, "has_required_tags": false}"#,
                r#"{"missing_skills": ["Git"], "duplicate_skills": ["Python"]}"#,
                r#"{"new_skills": ["Docker", "AWS", "Knitting", "Kubernetes"], "irrelevant_new_skills": ["Knitting"]}"#,
                r#"{"missing_essential_skills": [{"skill": "Testing", "importance": 0.4}]}"#,
            ),
            &scenario(&["Python", "Git"]),
        )
        .await;

        assert_eq!(traj.metric("language_consistency"), Some(0.0));
        assert_eq!(traj.metric("xml_format"), Some(0.0));
        // 1/2 included, minus 0.1 for the duplicate.
        assert!((traj.metric("context_inclusion").unwrap() - 0.4).abs() < 1e-9);
        assert!((traj.metric("skill_relevance").unwrap() - 0.75).abs() < 1e-9);
        assert!((traj.metric("skill_completeness").unwrap() - 0.6).abs() < 1e-9);

        let mean: f64 = CRITERIA.iter().map(|c| traj.metric(c).unwrap()).sum::<f64>() / 5.0;
        assert!((traj.metric("total_score").unwrap() - mean).abs() < 1e-9);
        assert!((traj.reward - mean * 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_criterion_edges() {
        let task = ListingTask::new(&RolloutConfig::default());

        // Nothing new added counts as fully relevant.
        assert_eq!(ListingTask::relevance_score(r#"{"new_skills": []}"#), 1.0);
        // Wrong type falls back to the default.
        assert_eq!(ListingTask::relevance_score(r#"{"new_skills": 3}"#), 0.5);
        // Importance beyond 1 saturates.
        assert_eq!(
            ListingTask::completeness_score(
                r#"{"missing_essential_skills": [{"skill": "a", "importance": 0.8}, {"skill": "b", "importance": 0.9}]}"#
            ),
            0.0
        );
        // Penalties never push below zero.
        assert_eq!(
            task.inclusion_score(r#"{"missing_skills": ["a"], "duplicate_skills": ["b", "c"]}"#, 1),
            0.0
        );
        // Missing key is a parse failure.
        assert_eq!(ListingTask::xml_score(r#"{"valid_xml": true}"#), 0.0);
        assert_eq!(ListingTask::language_score(r#"{"answer": " YES "}"#), 1.0);
        assert_eq!(ListingTask::language_score(r#"{"answer": "yes"}"#), 0.0);
    }

    #[test]
    fn test_report_metadata() {
        let task = ListingTask::new(&RolloutConfig::default());
        let scenario = ListingScenario::new("Chef", "fr", Vec::new()).unwrap().with_step(12);
        let score = Score {
            reward: 5.0,
            metrics: BTreeMap::from([
                ("language_consistency".to_string(), 1.0),
                ("total_score".to_string(), 0.5),
            ]),
        };

        let metadata = task.report_metadata(&scenario, &score).unwrap();
        assert_eq!(metadata["step"], 12);
        assert_eq!(metadata["job_title"], "Chef");
        assert_eq!(metadata["language_consistency"], 1.0);
        assert_eq!(metadata["final_score"], 0.5);
    }
}
