//! Training: the runtime boundary and the loop that feeds it.
//!
//! - [`backend`] -- the [`TrainingBackend`] trait and its HTTP implementation.
//! - [`driver`] -- epochs, batches, validation and best-checkpoint gating.

pub mod backend;
pub mod driver;

pub use backend::{HttpBackend, Split, TrainConfig, TrainingBackend};
pub use driver::{batches_per_epoch, BatchMetrics, BenchmarkResult, TrainingDriver};
