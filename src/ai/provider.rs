//! OpenAI-compatible chat-completion provider
//!
//! Works with any endpoint speaking the `/chat/completions` format (OpenAI,
//! Azure-style proxies, LiteLLM, Ollama's OpenAI shim). The base URL is the
//! API root, e.g. `https://api.openai.com/v1`.

use super::traits::{ChatMessage, CompletionProvider, CompletionRequest};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest slice of an error body kept in the error message
const ERROR_BODY_SNIPPET: usize = 300;

/// HTTP client for the chat-completions API.
///
/// Cheaply cloneable (shares the reqwest client internally).
#[derive(Clone)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// OpenAI-compatible error response
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl OpenAiProvider {
    /// Create a provider with an explicit endpoint, model, key and request timeout.
    pub fn new(base_url: &str, model: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = ChatCompletionBody {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request
                .json_mode
                .then_some(ResponseFormat { kind: "json_object" }),
        };

        let url = self.endpoint();
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to reach completion API at {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if let Ok(ErrorResponse {
                error: Some(detail),
            }) = serde_json::from_str::<ErrorResponse>(&text)
            {
                anyhow::bail!(
                    "Completion API error ({}): {}",
                    status.as_u16(),
                    detail.message
                );
            }
            let snippet: String = text.chars().take(ERROR_BODY_SNIPPET).collect();
            anyhow::bail!("Completion API returned {}: {}", status.as_u16(), snippet);
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse completion API response")?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .context("Completion API returned no content")?;

        tracing::debug!(model = %self.model, chars = content.len(), "Completion received");
        Ok(content)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Stand-in used when no API key is configured
#[derive(Debug, Clone, Default)]
pub struct DisabledProvider;

#[async_trait]
impl CompletionProvider for DisabledProvider {
    async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
        anyhow::bail!("LLM is not configured (set OPENAI_API_KEY)")
    }

    fn model_name(&self) -> &str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }
}
