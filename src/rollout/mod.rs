//! Rollouts: generate a candidate for a scenario and score it with judges.
//!
//! - [`engine`] -- the [`RolloutEngine`], its state machine and the
//!   [`RolloutTask`] strategy seam.
//! - [`summary`] -- question-answering reward for document summaries.
//! - [`listing`] -- five-criterion rubric reward for job offers.

pub mod engine;
pub mod listing;
pub mod summary;

pub use engine::{JudgeSession, RolloutEngine, RolloutError, RolloutState, RolloutTask, Score};
pub use listing::{ListingTask, LISTING_METRICS};
pub use summary::{SummaryTask, SUMMARY_METRICS};
