//! Sandbox errors.
//!
//! Only infrastructure problems are errors; a failing or timed-out test is a
//! normal [`testsmith_core::ExecutionResult`].

use testsmith_core::SynthError;

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("runner command is empty")]
    EmptyCommand,

    #[error("could not prepare sandbox directory: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("runner `{0}` not found")]
    RunnerNotFound(String),

    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to collect runner output: {0}")]
    Output(#[source] std::io::Error),
}

impl From<SandboxError> for SynthError {
    fn from(err: SandboxError) -> Self {
        SynthError::Sandbox(err.to_string())
    }
}

/// Result type for sandbox operations.
pub type Result<T> = std::result::Result<T, SandboxError>;
