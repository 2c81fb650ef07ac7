//! Error types for testsmith-llm

use thiserror::Error;

/// Errors that can occur while talking to the completion API
#[derive(Error, Debug)]
pub enum LlmError {
    /// No API key configured
    #[error("Anthropic API key is not configured (set ANTHROPIC_API_KEY)")]
    NotConfigured,

    /// Transport-level failure (DNS, TLS, connect, timeout)
    #[error("HTTP error: {0}")]
    Http(String),

    /// The API answered with a non-success status
    #[error("completion API returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, truncated
        body: String,
    },

    /// The response body did not have the expected shape
    #[error("malformed completion response: {0}")]
    Malformed(String),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LlmError {
    /// Whether this error means no request could ever succeed without
    /// operator action (as opposed to a transient upstream failure).
    pub fn is_unavailable(&self) -> bool {
        matches!(self, LlmError::NotConfigured)
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Http(err.to_string())
    }
}
