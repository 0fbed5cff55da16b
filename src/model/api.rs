//! OpenAI-compatible LLM API client.
//!
//! Provides typed request/response structures, the [`LlmClient`] used by both
//! the judge and the trainable model, and the [`CompletionModel`] seam the
//! rollout engine generates through.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// A single message in a chat conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message author: `"system"`, `"user"`, or `"assistant"`.
    pub role: String,
    /// The textual content of the message.
    pub content: String,
}

impl ChatMessage {
    /// Convenience constructor for a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Convenience constructor for a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Convenience constructor for an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// A single completion choice returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    /// Zero-based index of this choice within the response.
    #[serde(default)]
    pub index: usize,
    /// The generated message.
    pub message: ChatMessage,
    /// The reason the model stopped generating (e.g. `"stop"`, `"length"`).
    pub finish_reason: Option<String>,
}

impl Choice {
    /// Whether generation stopped because it hit the output token limit.
    pub fn is_truncated(&self) -> bool {
        self.finish_reason.as_deref() == Some("length")
    }
}

/// Token usage statistics for a request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt.
    pub prompt_tokens: usize,
    /// Tokens generated in the completion.
    pub completion_tokens: usize,
    /// Total tokens (prompt + completion).
    pub total_tokens: usize,
}

/// A chat completion response from the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Unique identifier for this completion.
    #[serde(default)]
    pub id: String,
    /// The list of generated choices.
    pub choices: Vec<Choice>,
    /// Token usage statistics. Some providers omit it.
    #[serde(default)]
    pub usage: Usage,
}

impl ChatResponse {
    /// Consume the response and return its first choice.
    pub fn into_first_choice(self) -> Result<Choice> {
        self.choices
            .into_iter()
            .next()
            .context("chat completion response contained no choices")
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for an OpenAI-compatible chat completions API.
///
/// Wraps [`reqwest::Client`] with the base URL and API key needed to call
/// `/chat/completions`.
#[derive(Debug, Clone)]
pub struct LlmClient {
    api_base: String,
    api_key: String,
    http: reqwest::Client,
}

impl LlmClient {
    /// Create a new client pointing at `base_url` with a per-request timeout.
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            api_base: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http,
        })
    }

    /// The normalised base URL (no trailing slash).
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Send a chat completion request and return the parsed response.
    ///
    /// Calls `POST {base_url}/chat/completions`. Any non-2xx status or an
    /// unparseable body is an error.
    pub async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: Option<f64>,
        max_tokens: usize,
    ) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.api_base);
        debug!(model, ?temperature, max_tokens, "sending chat completion request");

        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
            "max_tokens": max_tokens,
        });
        if let Some(temperature) = temperature {
            body["temperature"] = serde_json::json!(temperature);
        }

        let mut request = self.http.post(&url).json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let resp = request
            .send()
            .await
            .context("failed to send chat completion request")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("chat completion API returned {status}: {text}");
        }

        let chat_response: ChatResponse = resp
            .json()
            .await
            .context("failed to parse chat completion response")?;

        debug!(
            model,
            prompt_tokens = chat_response.usage.prompt_tokens,
            completion_tokens = chat_response.usage.completion_tokens,
            "chat completion succeeded"
        );

        Ok(chat_response)
    }
}

// ---------------------------------------------------------------------------
// Generation seam
// ---------------------------------------------------------------------------

/// Anything the rollout engine can generate a candidate from.
///
/// Implemented by [`ModelHandle`] for live inference and by scripted models
/// in tests.
#[allow(async_fn_in_trait)]
pub trait CompletionModel: Send + Sync {
    /// Name used for logging and reporting.
    fn name(&self) -> &str;

    /// Generate one choice for `messages`, capped at `max_output_tokens`.
    async fn complete(&self, messages: &[ChatMessage], max_output_tokens: usize) -> Result<Choice>;
}

/// A model registered with the training runtime and served for inference.
#[derive(Debug, Clone)]
pub struct ModelHandle {
    /// Model name within its project (e.g. `"job-offer-agent"`).
    pub name: String,
    /// Project the model belongs to.
    pub project: String,
    /// Base model weights the trainable model starts from, if trainable.
    pub base_model: Option<String>,
    /// Name passed as `model` on inference requests.
    pub inference_model_name: String,
    client: LlmClient,
}

impl ModelHandle {
    pub fn new(
        name: impl Into<String>,
        project: impl Into<String>,
        base_model: Option<String>,
        inference_model_name: impl Into<String>,
        client: LlmClient,
    ) -> Self {
        Self {
            name: name.into(),
            project: project.into(),
            base_model,
            inference_model_name: inference_model_name.into(),
            client,
        }
    }

    /// Whether this handle points at weights the runtime can train.
    pub fn is_trainable(&self) -> bool {
        self.base_model.is_some()
    }
}

impl CompletionModel for ModelHandle {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, messages: &[ChatMessage], max_output_tokens: usize) -> Result<Choice> {
        let response = self
            .client
            .chat_completion(&self.inference_model_name, messages, None, max_output_tokens)
            .await
            .with_context(|| format!("generation failed for model {}", self.name))?;

        let choice = response.into_first_choice()?;
        info!(
            model = %self.name,
            finish_reason = choice.finish_reason.as_deref().unwrap_or("unknown"),
            chars = choice.message.content.len(),
            "generation completed"
        );
        Ok(choice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_chat_message_constructors() {
        let sys = ChatMessage::system("You are helpful.");
        assert_eq!(sys.role, "system");
        assert_eq!(sys.content, "You are helpful.");

        let usr = ChatMessage::user("Hello");
        assert_eq!(usr.role, "user");

        let asst = ChatMessage::assistant("Hi there");
        assert_eq!(asst.role, "assistant");
    }

    #[test]
    fn test_choice_truncation_flag() {
        let mut choice = Choice {
            index: 0,
            message: ChatMessage::assistant("partial"),
            finish_reason: Some("length".into()),
        };
        assert!(choice.is_truncated());

        choice.finish_reason = Some("stop".into());
        assert!(!choice.is_truncated());

        choice.finish_reason = None;
        assert!(!choice.is_truncated());
    }

    #[test]
    fn test_response_without_usage_parses() {
        let json = r#"{"choices":[{"message":{"role":"assistant","content":"ok"},"finish_reason":"stop"}]}"#;
        let parsed: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.usage.total_tokens, 0);
        let choice = parsed.into_first_choice().unwrap();
        assert_eq!(choice.message.content, "ok");
    }

    #[test]
    fn test_empty_choices_is_error() {
        let resp = ChatResponse {
            id: "x".into(),
            choices: Vec::new(),
            usage: Usage::default(),
        };
        assert!(resp.into_first_choice().is_err());
    }

    #[tokio::test]
    async fn test_model_handle_completes_against_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "served-name",
                "max_tokens": 1500,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-1",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "<job_offer/>"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = LlmClient::new(
            &format!("{}/v1/", server.uri()),
            "sk-test",
            Duration::from_secs(5),
        )
        .unwrap();
        let model = ModelHandle::new("agent", "proj", None, "served-name", client);

        let choice = model
            .complete(&[ChatMessage::user("write")], 1500)
            .await
            .unwrap();
        assert_eq!(choice.message.content, "<job_offer/>");
        assert!(!model.is_trainable());
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let client = LlmClient::new(&server.uri(), "", Duration::from_secs(5)).unwrap();
        let err = client
            .chat_completion("m", &[ChatMessage::user("hi")], Some(0.0), 10)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("429"));
    }
}
