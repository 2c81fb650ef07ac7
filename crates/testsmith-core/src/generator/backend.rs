//! The completion service seam.

use async_trait::async_trait;
use testsmith_llm::{AnthropicClient, Completion, LlmError};

use crate::domain::GenerateError;

/// Anything that turns a prompt into a completion with token usage.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<Completion, GenerateError>;
}

#[async_trait]
impl CompletionBackend for AnthropicClient {
    async fn complete(&self, prompt: &str) -> Result<Completion, GenerateError> {
        AnthropicClient::complete(self, prompt)
            .await
            .map_err(GenerateError::from)
    }
}

impl From<LlmError> for GenerateError {
    fn from(err: LlmError) -> Self {
        if err.is_unavailable() {
            GenerateError::Unavailable(err.to_string())
        } else {
            GenerateError::Backend(err.to_string())
        }
    }
}
