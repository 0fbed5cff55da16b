//! Model client abstractions for interacting with LLM APIs.
//!
//! This module provides:
//! - [`api::LlmClient`] -- OpenAI-compatible chat completion client shared by
//!   the judge and the trainable model.
//! - [`api::CompletionModel`] / [`api::ModelHandle`] -- the generation seam
//!   the rollout engine calls through.
//! - [`prompt`] -- generation and judge prompt templates.
//! - [`report`] -- optional mirroring of scored completions to a
//!   request-logging service.

pub mod api;
pub mod prompt;
pub mod report;

pub use api::{ChatMessage, ChatResponse, Choice, CompletionModel, LlmClient, ModelHandle, Usage};
pub use report::{CompletionRecord, CompletionReporter};
