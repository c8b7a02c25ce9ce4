/// Gemini text-generation client used by the query planner and chart inference.
/// One attempt per call; callers decide what a failure means for the request.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;

use crate::config::GeminiConfig;
use crate::middleware::metrics::record_model_call;

// ============================================================================
// Request/Response Models
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
}

// ============================================================================
// Model client contract
// ============================================================================

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("model endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed model response: {0}")]
    MalformedResponse(String),

    #[error("model returned no text")]
    EmptyResponse,
}

impl ModelError {
    fn outcome_label(&self) -> &'static str {
        match self {
            ModelError::Request(_) => "request_error",
            ModelError::Status { .. } => "status_error",
            ModelError::MalformedResponse(_) => "malformed",
            ModelError::EmptyResponse => "empty",
        }
    }
}

/// Anything that turns a prompt into raw text
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ModelError>;

    fn model_id(&self) -> &str;
}

// ============================================================================
// Gemini Service
// ============================================================================

pub struct GeminiService {
    config: GeminiConfig,
    http_client: reqwest::Client,
}

impl GeminiService {
    pub fn new(config: GeminiConfig) -> Result<Self, ModelError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self { config, http_client })
    }

    async fn send(&self, prompt: &str) -> Result<String, ModelError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
            },
        };

        let response = self
            .http_client
            .post(self.config.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ModelError::MalformedResponse(e.to_string()))?;

        if let Some(usage) = &parsed.usage_metadata {
            tracing::debug!(
                "Gemini usage: tokens_in={}, tokens_out={}",
                usage.prompt_token_count.unwrap_or(0),
                usage.candidates_token_count.unwrap_or(0)
            );
        }

        let candidate = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or(ModelError::EmptyResponse)?;

        let text: String = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            tracing::warn!(
                "Gemini returned no text (finish_reason={})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            );
            return Err(ModelError::EmptyResponse);
        }

        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl LanguageModel for GeminiService {
    async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
        let start_time = Instant::now();
        let result = self.send(prompt).await;
        let latency_ms = start_time.elapsed().as_millis() as u64;

        match &result {
            Ok(text) => {
                record_model_call("success");
                tracing::info!(
                    "Gemini call: model={}, prompt_chars={}, reply_chars={}, latency={}ms",
                    self.config.model,
                    prompt.len(),
                    text.len(),
                    latency_ms
                );
            }
            Err(e) => {
                record_model_call(e.outcome_label());
                tracing::error!(
                    "Gemini call failed: model={}, latency={}ms, error={}",
                    self.config.model,
                    latency_ms,
                    e
                );
            }
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }
}
