//! Automated judges.
//!
//! - [`client`] -- the shared [`JudgeClient`] (concurrency bound, LRU cache,
//!   retry with sentinel) and the [`Judge`] trait the rollout engine uses.
//! - [`parse`] -- fence stripping and tolerant JSON extraction of judge
//!   answers.

pub mod client;
pub mod parse;

pub use client::{is_failure, Judge, JudgeClient, JudgeRequest, JUDGE_FAILURE};
pub use parse::{extract_as, extract_field, extract_json, parse_binary, strip_fences, ParseFailure};
