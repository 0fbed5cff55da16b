//! Judge client: bounded, memoised, retrying chat completions.
//!
//! Every rollout shares one [`JudgeClient`] through an `Arc`. The client
//! enforces a process-wide in-flight limit with a semaphore, memoises answers
//! keyed by `(prompt, temperature, max_output_tokens)` in an LRU cache, and
//! retries failed calls with a fixed delay. Cache entries are created before
//! the call goes out, so concurrent identical requests share one call. It never returns an error: after
//! the last attempt it hands back [`JUDGE_FAILURE`], which every caller
//! treats like any other unparseable judge output.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use lru::LruCache;
use tokio::sync::{OnceCell, Semaphore};
use tracing::{debug, error, warn};

use crate::config::JudgeConfig;
use crate::model::api::{ChatMessage, LlmClient};

/// Returned in place of a completion once all retries are exhausted.
pub const JUDGE_FAILURE: &str = "ERROR: Get judge completion failed";

/// Default sampling temperature for judge calls.
pub const DEFAULT_TEMPERATURE: f64 = 0.0;

/// Default output budget for judge calls.
pub const DEFAULT_MAX_OUTPUT_TOKENS: usize = 600;

/// Whether `text` is the client's failure sentinel.
pub fn is_failure(text: &str) -> bool {
    text.starts_with("ERROR:")
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// One judge question.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeRequest {
    pub prompt: String,
    pub temperature: f64,
    pub max_output_tokens: usize,
}

impl JudgeRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }

    pub fn max_output_tokens(mut self, max_output_tokens: usize) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    prompt: String,
    temperature_bits: u64,
    max_output_tokens: usize,
}

impl From<&JudgeRequest> for CacheKey {
    fn from(request: &JudgeRequest) -> Self {
        Self {
            prompt: request.prompt.clone(),
            temperature_bits: request.temperature.to_bits(),
            max_output_tokens: request.max_output_tokens,
        }
    }
}

// ---------------------------------------------------------------------------
// Judge trait
// ---------------------------------------------------------------------------

/// An automated evaluator: prompt in, text out, never fails.
///
/// The rollout engine depends on this trait rather than on [`JudgeClient`]
/// so tests can script judge answers.
#[allow(async_fn_in_trait)]
pub trait Judge: Send + Sync {
    async fn judge(&self, request: JudgeRequest) -> String;
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

type Slot = Arc<OnceCell<String>>;

/// HTTP-backed [`Judge`] with a concurrency bound, LRU memoisation and retry.
pub struct JudgeClient {
    llm: LlmClient,
    model: String,
    semaphore: Semaphore,
    cache: Mutex<LruCache<CacheKey, Slot>>,
    max_retries: usize,
    retry_delay: Duration,
}

impl JudgeClient {
    /// Build a client from configuration.
    pub fn new(config: &JudgeConfig) -> Result<Self> {
        let llm = LlmClient::new(
            &config.api_base,
            &config.api_key,
            Duration::from_secs(config.timeout_secs),
        )
        .context("failed to build judge HTTP client")?;

        let capacity = NonZeroUsize::new(config.cache_capacity)
            .context("judge cache capacity must be greater than zero")?;

        Ok(Self {
            llm,
            model: config.model.clone(),
            semaphore: Semaphore::new(config.max_concurrency.max(1)),
            cache: Mutex::new(LruCache::new(capacity)),
            max_retries: config.max_retries.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        })
    }

    /// Drop every memoised answer.
    pub fn clear_cache(&self) {
        self.lock_cache().clear();
        debug!("judge cache cleared");
    }

    /// Number of memoised answers.
    pub fn cache_len(&self) -> usize {
        self.lock_cache().len()
    }

    /// Permits currently free for new judge calls.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, LruCache<CacheKey, Slot>> {
        // A poisoned cache only means another task panicked mid-insert; the
        // map itself is still consistent.
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The slot for `key`, created empty on a miss.
    fn slot(&self, key: &CacheKey) -> Slot {
        let mut cache = self.lock_cache();
        if let Some(slot) = cache.get(key) {
            return Arc::clone(slot);
        }
        let slot = Slot::default();
        cache.put(key.clone(), Arc::clone(&slot));
        slot
    }

    /// Drop `slot` from the cache if it is still the entry for `key`.
    fn forget(&self, key: &CacheKey, slot: &Slot) {
        let mut cache = self.lock_cache();
        if cache.peek(key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            cache.pop(key);
        }
    }

    async fn attempt(&self, request: &JudgeRequest) -> Result<String> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .context("judge semaphore closed")?;

        let response = self
            .llm
            .chat_completion(
                &self.model,
                &[ChatMessage::user(request.prompt.as_str())],
                Some(request.temperature),
                request.max_output_tokens,
            )
            .await?;

        Ok(response.into_first_choice()?.message.content.trim().to_string())
    }
}

impl JudgeClient {
    async fn fetch(&self, request: &JudgeRequest) -> String {
        for attempt in 1..=self.max_retries {
            match self.attempt(request).await {
                Ok(text) => return text,
                Err(e) if attempt < self.max_retries => {
                    warn!(
                        attempt,
                        max_retries = self.max_retries,
                        error = %e,
                        "judge completion failed, retrying"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    error!(
                        attempts = self.max_retries,
                        error = %e,
                        "judge completion failed after all retries"
                    );
                }
            }
        }

        JUDGE_FAILURE.to_string()
    }
}

impl Judge for JudgeClient {
    async fn judge(&self, request: JudgeRequest) -> String {
        let key = CacheKey::from(&request);
        let slot = self.slot(&key);
        if let Some(hit) = slot.get() {
            debug!(prompt_len = request.prompt.len(), "judge cache hit");
            return hit.clone();
        }

        let text = slot.get_or_init(|| self.fetch(&request)).await.clone();
        if text == JUDGE_FAILURE {
            // Failures are shared with concurrent waiters but never memoised.
            self.forget(&key, &slot);
        }
        text
    }
}
