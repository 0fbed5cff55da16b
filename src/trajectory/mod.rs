//! Scored rollouts and their grouping.
//!
//! - [`types::Trajectory`] -- one rollout's messages, reward and metrics.
//! - [`types::TrajectoryGroup`] -- the rollouts sampled for one scenario.
//! - [`advantage`] -- group-relative advantage estimation.

pub mod advantage;
pub mod types;

pub use advantage::compute_group_advantages;
pub use types::{mean_reward, Trajectory, TrajectoryGroup};
