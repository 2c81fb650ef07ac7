//! Anthropic Messages API client
//!
//! Sends a single user prompt and returns the generated text together with
//! the exact token usage reported by the API.

use crate::error::LlmError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Default Messages API endpoint
pub const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Default `anthropic-version` header value
pub const DEFAULT_API_VERSION: &str = "2023-06-01";

/// Default model identifier
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";

/// Longest error body kept in [`LlmError::Status`]
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Completion API configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Messages API URL
    pub api_url: String,
    /// API key; never written back out
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Model identifier
    pub model: String,
    /// Value of the `anthropic-version` header
    pub api_version: String,
    /// Upper bound on generated tokens per request
    pub max_tokens: u32,
    /// Whole-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Optional system prompt sent with every request
    pub system_prompt: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        LlmConfig {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            max_tokens: 1024,
            request_timeout_secs: 60,
            system_prompt: None,
        }
    }
}

impl LlmConfig {
    /// Defaults overridden by the process environment
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup.
    ///
    /// Recognised keys: `ANTHROPIC_API_KEY`, `ANTHROPIC_API_URL`,
    /// `ANTHROPIC_MODEL` (falling back to `MODEL`) and `ANTHROPIC_VERSION`
    /// (falling back to `VERSION`). Empty values are ignored.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("ANTHROPIC_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(url) = get("ANTHROPIC_API_URL") {
            self.api_url = url;
        }
        if let Some(model) = get("ANTHROPIC_MODEL").or_else(|| get("MODEL")) {
            self.model = model;
        }
        if let Some(version) = get("ANTHROPIC_VERSION").or_else(|| get("VERSION")) {
            self.api_version = version;
        }
        self
    }

    /// Set the API key
    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }

    /// Whether a non-empty API key is present
    pub fn has_credentials(&self) -> bool {
        self.api_key
            .as_deref()
            .map(|k| !k.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Generated text plus token accounting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    /// Concatenated text blocks
    pub text: String,
    /// Prompt tokens billed
    pub input_tokens: u64,
    /// Completion tokens billed
    pub output_tokens: u64,
    /// Model that served the request, if reported
    pub model: Option<String>,
    /// Why generation stopped, if reported
    pub stop_reason: Option<String>,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<RequestMessage<'a>>,
}

#[derive(Serialize)]
struct RequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize, Default)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

/// Parse a Messages API success body
pub(crate) fn parse_response(body: &str) -> Result<Completion> {
    let response: MessagesResponse = serde_json::from_str(body)?;

    let text = response
        .content
        .iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text.as_deref())
        .collect::<Vec<_>>()
        .join("");

    if text.is_empty() {
        return Err(LlmError::Malformed(
            "response contained no text content".to_string(),
        ));
    }

    let usage = response.usage.unwrap_or_default();
    Ok(Completion {
        text,
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        model: response.model,
        stop_reason: response.stop_reason,
    })
}

fn truncate_body(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

/// Messages API client
pub struct AnthropicClient {
    config: LlmConfig,
    http_client: reqwest::Client,
}

impl AnthropicClient {
    /// Create a new client
    pub fn new(config: LlmConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("testsmith-llm/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(AnthropicClient {
            config,
            http_client,
        })
    }

    /// Create client from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(LlmConfig::from_env())
    }

    /// Active configuration
    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Whether requests can be attempted at all
    pub fn is_configured(&self) -> bool {
        self.config.has_credentials()
    }

    /// Send one user prompt and return the completion.
    ///
    /// Never retries; callers decide what a failure means.
    pub async fn complete(&self, prompt: &str) -> Result<Completion> {
        let api_key = match self.config.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => key,
            _ => return Err(LlmError::NotConfigured),
        };

        let request = MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            system: self.config.system_prompt.as_deref(),
            messages: vec![RequestMessage {
                role: "user",
                content: prompt,
            }],
        };

        debug!(
            model = %self.config.model,
            prompt_chars = prompt.len(),
            "sending completion request"
        );

        let response = self
            .http_client
            .post(&self.config.api_url)
            .header("x-api-key", api_key)
            .header("anthropic-version", &self.config.api_version)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "completion request rejected");
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let completion = parse_response(&body)?;
        debug!(
            input_tokens = completion.input_tokens,
            output_tokens = completion.output_tokens,
            "completion received"
        );
        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = LlmConfig::default();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.max_tokens, 1024);
        assert!(config.api_key.is_none());
        assert!(!config.has_credentials());
    }

    #[test]
    fn test_env_overrides_prefer_prefixed_keys() {
        let config = LlmConfig::default().with_env_overrides(lookup(&[
            ("ANTHROPIC_API_KEY", "sk-test"),
            ("ANTHROPIC_MODEL", "claude-a"),
            ("MODEL", "claude-b"),
            ("VERSION", "2024-01-01"),
        ]));
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.model, "claude-a");
        assert_eq!(config.api_version, "2024-01-01");
        assert!(config.has_credentials());
    }

    #[test]
    fn test_env_overrides_ignore_empty_values() {
        let config = LlmConfig::default().with_env_overrides(lookup(&[
            ("ANTHROPIC_API_KEY", "  "),
            ("ANTHROPIC_API_URL", ""),
        ]));
        assert!(config.api_key.is_none());
        assert_eq!(config.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn test_api_key_not_serialized() {
        let config = LlmConfig::default().with_api_key("sk-secret");
        let json = serde_json::to_string(&config).expect("serialize");
        assert!(!json.contains("sk-secret"));
    }

    #[test]
    fn test_parse_response_concatenates_text_blocks() {
        let body = r#"{
            "id": "msg_1",
            "type": "message",
            "model": "claude-3-5-sonnet-20241022",
            "content": [
                {"type": "text", "text": "import pytest\n"},
                {"type": "tool_use", "id": "t1", "name": "x", "input": {}},
                {"type": "text", "text": "def test_add():\n    assert True\n"}
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 120, "output_tokens": 45}
        }"#;
        let completion = parse_response(body).expect("parse");
        assert!(completion.text.starts_with("import pytest\ndef test_add"));
        assert_eq!(completion.input_tokens, 120);
        assert_eq!(completion.output_tokens, 45);
        assert_eq!(completion.stop_reason.as_deref(), Some("end_turn"));
    }

    #[test]
    fn test_parse_response_missing_usage_defaults_to_zero() {
        let body = r#"{"content": [{"type": "text", "text": "x = 1"}]}"#;
        let completion = parse_response(body).expect("parse");
        assert_eq!(completion.input_tokens, 0);
        assert_eq!(completion.output_tokens, 0);
    }

    #[test]
    fn test_parse_response_without_text_is_malformed() {
        let body = r#"{"content": []}"#;
        match parse_response(body) {
            Err(LlmError::Malformed(_)) => {}
            other => panic!("expected Malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_truncate_body_respects_char_boundaries() {
        let body = "é".repeat(MAX_ERROR_BODY_CHARS + 10);
        assert_eq!(truncate_body(&body).chars().count(), MAX_ERROR_BODY_CHARS);
    }

    #[tokio::test]
    async fn test_complete_without_key_fails_fast() {
        let client = AnthropicClient::new(LlmConfig::default()).expect("client");
        assert!(!client.is_configured());
        match client.complete("write a test").await {
            Err(LlmError::NotConfigured) => {}
            other => panic!("expected NotConfigured, got {:?}", other),
        }
    }
}
