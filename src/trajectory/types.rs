//! Trajectory data types handed from the rollout engine to the training
//! runtime.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::ChatMessage;

use super::advantage::compute_group_advantages;

// ---------------------------------------------------------------------------
// Trajectory
// ---------------------------------------------------------------------------

/// One scored rollout: the conversation that produced a candidate, its
/// scalar reward and the per-criterion metrics behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    /// Unique identifier (UUID v4).
    pub id: String,
    /// System prompt, user prompt, assistant candidate.
    pub messages: Vec<ChatMessage>,
    pub reward: f64,
    /// Fixed key set per task.
    pub metrics: BTreeMap<String, f64>,
    /// Finish reason reported by the generation endpoint, if any.
    pub finish_reason: Option<String>,
}

impl Trajectory {
    pub fn new(
        messages: Vec<ChatMessage>,
        reward: f64,
        metrics: BTreeMap<String, f64>,
        finish_reason: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            messages,
            reward,
            metrics,
            finish_reason,
        }
    }

    /// The assistant's candidate, i.e. the last message.
    pub fn candidate(&self) -> Option<&str> {
        self.messages
            .last()
            .filter(|m| m.role == "assistant")
            .map(|m| m.content.as_str())
    }

    pub fn metric(&self, key: &str) -> Option<f64> {
        self.metrics.get(key).copied()
    }
}

// ---------------------------------------------------------------------------
// Trajectory group
// ---------------------------------------------------------------------------

/// The rollouts sampled for one scenario.
///
/// The runtime compares trajectories within a group, so a group only makes
/// sense when every member answers the same scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryGroup {
    pub trajectories: Vec<Trajectory>,
}

impl TrajectoryGroup {
    pub fn new(trajectories: Vec<Trajectory>) -> Self {
        Self { trajectories }
    }

    pub fn len(&self) -> usize {
        self.trajectories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trajectories.is_empty()
    }

    pub fn rewards(&self) -> Vec<f64> {
        self.trajectories.iter().map(|t| t.reward).collect()
    }

    /// Mean reward across the group, 0.0 when empty.
    pub fn mean_reward(&self) -> f64 {
        if self.trajectories.is_empty() {
            return 0.0;
        }
        self.trajectories.iter().map(|t| t.reward).sum::<f64>() / self.trajectories.len() as f64
    }

    /// Group-relative advantage of each trajectory, in order.
    pub fn advantages(&self) -> Vec<f64> {
        compute_group_advantages(&self.rewards())
    }
}

/// Mean reward over every trajectory of every group, 0.0 when there are none.
pub fn mean_reward(groups: &[TrajectoryGroup]) -> f64 {
    let (sum, count) = groups
        .iter()
        .flat_map(|g| g.trajectories.iter())
        .fold((0.0, 0usize), |(s, n), t| (s + t.reward, n + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn traj(reward: f64) -> Trajectory {
        Trajectory::new(
            vec![
                ChatMessage::system("sys"),
                ChatMessage::user("user"),
                ChatMessage::assistant("candidate"),
            ],
            reward,
            BTreeMap::from([("total_score".to_string(), reward / 10.0)]),
            Some("stop".into()),
        )
    }

    #[test]
    fn test_trajectory_ids_are_unique() {
        let a = traj(1.0);
        let b = traj(1.0);
        assert_ne!(a.id, b.id);
        assert!(Uuid::parse_str(&a.id).is_ok());
    }

    #[test]
    fn test_candidate_and_metric() {
        let t = traj(5.0);
        assert_eq!(t.candidate(), Some("candidate"));
        assert_eq!(t.metric("total_score"), Some(0.5));
        assert_eq!(t.metric("missing"), None);

        let no_answer = Trajectory::new(vec![ChatMessage::user("u")], 0.0, BTreeMap::new(), None);
        assert_eq!(no_answer.candidate(), None);
    }

    #[test]
    fn test_group_mean_and_advantages() {
        let group = TrajectoryGroup::new(vec![traj(2.0), traj(4.0)]);
        assert_eq!(group.len(), 2);
        assert!((group.mean_reward() - 3.0).abs() < 1e-9);

        let advs = group.advantages();
        assert!((advs[0] + 1.0).abs() < 1e-9);
        assert!((advs[1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_group() {
        let group = TrajectoryGroup::default();
        assert!(group.is_empty());
        assert_eq!(group.mean_reward(), 0.0);
        assert!(group.advantages().is_empty());
    }

    #[test]
    fn test_mean_reward_across_groups() {
        let groups = vec![
            TrajectoryGroup::new(vec![traj(1.0), traj(2.0)]),
            TrajectoryGroup::new(vec![traj(6.0)]),
        ];
        assert!((mean_reward(&groups) - 3.0).abs() < 1e-9);
        assert_eq!(mean_reward(&[]), 0.0);
    }
}
