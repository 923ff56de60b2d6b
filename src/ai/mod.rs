//! AI-assisted analytics
//!
//! Same layout as the other pluggable backends (trait + impl + mock):
//! - `CompletionProvider` trait: async chat-completion interface
//! - `OpenAiProvider`: any OpenAI-compatible `/chat/completions` API
//! - `DisabledProvider`: used when no API key is configured
//! - `MockCompletionProvider`: scripted responses for tests
//!
//! `InsightService` runs each `/api/ai/*` endpoint on top of the store,
//! with local fallbacks from `analytics` and `scoring` when the model fails.

pub mod analytics;
pub mod chat;
pub mod prompts;
pub mod provider;
pub mod scoring;
pub mod service;
pub mod traits;

pub use provider::{DisabledProvider, OpenAiProvider};
pub use service::InsightService;
pub use traits::{ChatMessage, CompletionProvider, CompletionRequest, Role};

#[cfg(test)]
pub(crate) mod mock;
#[cfg(test)]
pub(crate) use mock::MockCompletionProvider;

use crate::LlmConfig;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

/// Provider for the configured LLM; disabled when no API key is set
pub fn build_provider(config: &LlmConfig) -> Result<Arc<dyn CompletionProvider>> {
    match config.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        Some(key) => {
            let provider = OpenAiProvider::new(
                &config.base_url,
                &config.model,
                key,
                Duration::from_secs(config.timeout_secs),
            )?;
            tracing::info!(
                model = %config.model,
                base_url = %config.base_url,
                "LLM completions enabled"
            );
            Ok(Arc::new(provider))
        }
        None => {
            tracing::warn!("OPENAI_API_KEY not set, AI endpoints will use local fallbacks");
            Ok(Arc::new(DisabledProvider))
        }
    }
}
