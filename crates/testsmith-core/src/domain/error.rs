//! Error taxonomy for testsmith.

/// Failures reported by a candidate generator.
///
/// `Unavailable` means no attempt can succeed without operator action (no
/// credential configured); `Backend` covers transport failures and
/// non-success responses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerateError {
    #[error("generator unavailable: {0}")]
    Unavailable(String),

    #[error("generator error: {0}")]
    Backend(String),
}

/// testsmith errors.
#[derive(Debug, thiserror::Error)]
pub enum SynthError {
    #[error("parse error at line {line}, column {column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("parser initialisation failed: {0}")]
    Language(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Generate(#[from] GenerateError),

    #[error("sandbox error: {0}")]
    Sandbox(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SynthError {
    /// Whether this error aborts a whole request rather than a single unit.
    pub fn is_request_level(&self) -> bool {
        matches!(
            self,
            SynthError::Parse { .. } | SynthError::Language(_) | SynthError::InvalidConfig(_)
        )
    }
}

/// Result type for testsmith operations.
pub type Result<T> = std::result::Result<T, SynthError>;
