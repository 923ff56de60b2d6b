//! Scripted completion provider for tests
//!
//! Responses are returned in the order they were queued; every request is
//! recorded so tests can assert on prompts and parameters.

use super::traits::{CompletionProvider, CompletionRequest};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::Mutex;

/// Mock provider returning queued responses or failures.
///
/// When the queue is empty every call fails, which exercises the callers'
/// fallback paths.
#[derive(Debug, Default)]
pub struct MockCompletionProvider {
    responses: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockCompletionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response
    pub fn with_response(mut self, content: impl Into<String>) -> Self {
        self.responses.get_mut().push_back(Ok(content.into()));
        self
    }

    /// Queue a failure
    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.responses.get_mut().push_back(Err(message.into()));
        self
    }

    /// Requests received so far
    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl CompletionProvider for MockCompletionProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.requests.lock().await.push(request.clone());
        match self.responses.lock().await.pop_front() {
            Some(Ok(content)) => Ok(content),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => Err(anyhow::anyhow!("no scripted completion left")),
        }
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_responses_in_order_then_exhausted() {
        let provider = MockCompletionProvider::new()
            .with_response("uno")
            .with_failure("caído")
            .with_response("dos");
        let req = CompletionRequest::prompt("x");

        assert_eq!(provider.complete(&req).await.unwrap(), "uno");
        assert!(provider.complete(&req).await.is_err());
        assert_eq!(provider.complete(&req).await.unwrap(), "dos");
        assert!(provider.complete(&req).await.is_err());
        assert_eq!(provider.requests().await.len(), 4);
    }
}
