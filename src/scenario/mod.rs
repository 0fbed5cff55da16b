//! Scenarios: what a single rollout works on, and where they come from.
//!
//! - [`types`] -- validated, immutable [`Scenario`] variants.
//! - [`dataset`] -- loading raw records and the seeded validation/training
//!   split.

pub mod dataset;
pub mod types;

pub use dataset::{load_scenarios, split_dataset, DatasetSplit};
pub use types::{ListingScenario, QaPair, Scenario, ScenarioError, SummaryScenario};
