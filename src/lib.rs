//! Rubric: judge-scored reinforcement learning for text generation.
//!
//! A trainable model writes candidates (document summaries or job offers),
//! an LLM judge scores each one against a task-specific rubric, and the
//! scored trajectories are fed to an external training runtime.

pub mod config;
pub mod judge;
pub mod model;
pub mod rollout;
pub mod scenario;
pub mod training;
pub mod trajectory;

#[cfg(test)]
mod testing;
