//! testsmith-llm: completion client for candidate test generation
//!
//! This crate talks to the Anthropic Messages API. It sends one prompt per
//! call, never retries, and reports exact token usage so that callers can
//! account for every generation attempt.
//!
//! ## Layer 0 - External collaborators
//!
//! Focus: a thin, typed wrapper around a single HTTP endpoint.

pub mod client;
pub mod error;

pub use client::{
    AnthropicClient, Completion, LlmConfig, DEFAULT_API_URL, DEFAULT_API_VERSION, DEFAULT_MODEL,
};
pub use error::LlmError;

/// Result type for testsmith-llm operations
pub type Result<T> = std::result::Result<T, LlmError>;
