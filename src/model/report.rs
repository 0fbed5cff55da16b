//! Completion reporting to an external request-logging service.
//!
//! Each scored listing rollout can be mirrored to a logging endpoint so that
//! generations, judge scores and the training step they came from can be
//! browsed outside the training runtime. Reporting is best effort: failures
//! are logged and never reach the rollout.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::ReportConfig;
use crate::model::api::{ChatMessage, Choice};

/// One generation request/response pair plus its scoring metadata.
#[derive(Debug, Clone)]
pub struct CompletionRecord {
    pub requested_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub choice: Choice,
    /// Scenario identity and scores, flattened into the request metadata.
    pub metadata: Map<String, Value>,
}

#[derive(Serialize)]
struct ReportPayload {
    requested_at: i64,
    received_at: i64,
    req_payload: Value,
    resp_payload: Value,
    status_code: u16,
}

/// Posts [`CompletionRecord`]s to `{api_base}/report`.
#[derive(Debug, Clone)]
pub struct CompletionReporter {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    project: String,
}

impl CompletionReporter {
    /// Build a reporter, or `None` when no API key is configured.
    pub fn from_config(config: &ReportConfig) -> Result<Option<Self>> {
        if config.api_key.is_empty() {
            return Ok(None);
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build reqwest client for reporting")?;

        Ok(Some(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            project: config.project.clone(),
        }))
    }

    /// Send a record, swallowing (but logging) any failure.
    pub async fn report(&self, record: CompletionRecord) {
        if let Err(e) = self.try_report(record).await {
            warn!(error = %e, "Error reporting completion");
        }
    }

    async fn try_report(&self, record: CompletionRecord) -> Result<()> {
        let mut metadata = record.metadata;
        metadata.insert("project".into(), Value::String(self.project.clone()));

        let payload = ReportPayload {
            requested_at: record.requested_at.timestamp_millis(),
            received_at: record.received_at.timestamp_millis(),
            req_payload: serde_json::json!({
                "model": record.model,
                "messages": record.messages,
                "metadata": metadata,
            }),
            resp_payload: serde_json::json!({
                "choices": [record.choice],
            }),
            status_code: 200,
        };

        let resp = self
            .http
            .post(format!("{}/report", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .context("failed to send completion report")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("report endpoint returned {status}: {text}");
        }

        debug!("completion reported");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record() -> CompletionRecord {
        let mut metadata = Map::new();
        metadata.insert("step".into(), Value::from(7));
        metadata.insert("final_score".into(), Value::from(0.8));
        CompletionRecord {
            requested_at: Utc::now(),
            received_at: Utc::now(),
            model: "job-offer-agent".into(),
            messages: vec![ChatMessage::user("write an offer")],
            choice: Choice {
                index: 0,
                message: ChatMessage::assistant("<job_offer/>"),
                finish_reason: Some("stop".into()),
            },
            metadata,
        }
    }

    #[test]
    fn test_no_key_means_no_reporter() {
        let config = ReportConfig::default();
        assert!(CompletionReporter::from_config(&config).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_posts_record_with_project_and_step() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/report"))
            .and(header("authorization", "Bearer rk"))
            .and(body_partial_json(serde_json::json!({
                "status_code": 200,
                "req_payload": {
                    "model": "job-offer-agent",
                    "metadata": {"project": "job-offer-generation", "step": 7}
                }
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let config = ReportConfig {
            api_base: format!("{}/api/v1", server.uri()),
            api_key: "rk".into(),
            project: "job-offer-generation".into(),
            timeout_secs: 5,
        };
        let reporter = CompletionReporter::from_config(&config).unwrap().unwrap();
        reporter.report(record()).await;
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let config = ReportConfig {
            api_base: server.uri(),
            api_key: "rk".into(),
            project: "p".into(),
            timeout_secs: 5,
        };
        let reporter = CompletionReporter::from_config(&config).unwrap().unwrap();
        assert!(reporter.try_report(record()).await.is_err());
        reporter.report(record()).await;
    }
}
