//! CompletionProvider trait definition
//!
//! Same pattern as `CrmStore`: async trait + Send + Sync so the service can
//! hold an `Arc<dyn CompletionProvider>`.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a chat-completion conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A provider-agnostic completion request
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the provider for a JSON object response
    pub json_mode: bool,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: 0.7,
            max_tokens: 500,
            json_mode: false,
        }
    }

    /// Single user-message request
    pub fn prompt(text: impl Into<String>) -> Self {
        Self::new(vec![ChatMessage::user(text)])
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

/// Abstract interface for a chat-completion backend.
///
/// # Implementations
///
/// - [`OpenAiProvider`](super::OpenAiProvider): any OpenAI-compatible
///   `/chat/completions` endpoint
/// - [`DisabledProvider`](super::DisabledProvider): used when no API key is
///   configured; every call fails so callers take their fallback path
/// - [`MockCompletionProvider`](super::MockCompletionProvider): scripted
///   responses for tests
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Run a completion and return the assistant's text.
    ///
    /// # Errors
    ///
    /// Network failure, non-2xx status, timeout or an empty choice list.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// Model identifier, for logs and health output
    fn model_name(&self) -> &str;

    /// False when the provider can never succeed (no credentials)
    fn is_enabled(&self) -> bool {
        true
    }
}
