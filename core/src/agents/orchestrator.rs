use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::config::StudioConfig;
use super::prompts::{build_messages, Domain};
use super::resolver::{ProviderConfig, ProviderUsed};
use crate::errors::ProviderError;
use crate::sessions::ChatTurn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiUsageMetrics {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// One generation call: bounded prior context plus the new instruction.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub context: Vec<ChatTurn>,
    pub instruction: String,
    pub domain: Domain,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationResult {
    pub text: String,
    pub provider_used: ProviderUsed,
    pub degraded: bool,
    pub model: String,
    pub usage: Option<AiUsageMetrics>,
}

/// A single request/response exchange against one candidate. Implementations
/// never retry; the chain decides what happens after a failure.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn generate(
        &self,
        config: &ProviderConfig,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, ProviderError>;
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
pub struct HttpProviderClient {
    client: Client,
    max_tokens: u32,
    temperature: f32,
}

impl HttpProviderClient {
    pub fn new(timeout: Duration, max_tokens: u32, temperature: f32) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("FilmStudio-Core/0.1")
            .build()
            .context("failed to construct HTTP client")?;
        Ok(Self {
            client,
            max_tokens,
            temperature,
        })
    }

    pub fn from_config(config: &StudioConfig) -> anyhow::Result<Self> {
        Self::new(config.request_timeout, config.max_tokens, config.temperature)
    }

    fn payload(&self, config: &ProviderConfig, request: &GenerationRequest) -> Value {
        serde_json::json!({
            "model": config.model,
            "messages": build_messages(request),
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        })
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn generate(
        &self,
        config: &ProviderConfig,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, ProviderError> {
        if config.is_offline {
            return Err(ProviderError::Unavailable(
                "offline candidate has no endpoint".into(),
            ));
        }
        let url = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        let mut http = self.client.post(url);
        if let Some(key) = &config.api_key {
            http = http.bearer_auth(key);
        }

        let response = http.json(&self.payload(config, request)).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }
        let body: Value = response.json().await?;

        let content = extract_content(&body);
        if content.trim().is_empty() {
            return Err(ProviderError::Unavailable(
                "provider returned an empty completion".into(),
            ));
        }

        Ok(GenerationResult {
            text: content,
            provider_used: config.used(),
            degraded: false,
            model: body
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or(config.model.as_str())
                .to_string(),
            usage: extract_openai_usage(&body),
        })
    }
}

pub fn classify_status(status: StatusCode, body: &str) -> ProviderError {
    let snippet: String = body.chars().take(200).collect();
    let detail = if snippet.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {snippet}")
    };
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        ProviderError::Auth(detail)
    } else {
        ProviderError::Unavailable(detail)
    }
}

/// Pull the first choice's message content. Content may be a plain string or
/// a list of parts carrying `text` or `content`.
pub fn extract_content(body: &Value) -> String {
    let content = body
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|msg| msg.get("content"));
    match content {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| match part {
                Value::String(text) => Some(text.as_str()),
                other => other
                    .get("text")
                    .or_else(|| other.get("content"))
                    .and_then(Value::as_str),
            })
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string(),
        _ => String::new(),
    }
}

fn extract_openai_usage(body: &Value) -> Option<AiUsageMetrics> {
    let field = |usage: &Value, name: &str| {
        usage
            .get(name)
            .and_then(Value::as_u64)
            .map(|v| v as u32)
    };
    body.get("usage").map(|usage| AiUsageMetrics {
        prompt_tokens: field(usage, "prompt_tokens"),
        completion_tokens: field(usage, "completion_tokens"),
        total_tokens: field(usage, "total_tokens"),
    })
}
