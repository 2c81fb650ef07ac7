//! Runtime configuration.
//!
//! Loaded once at start (TOML file, then environment overrides) and treated
//! as read-only afterwards.
//!
//! ```toml
//! [policy]
//! max_attempts = 3
//! regenerate_on_assertion = true
//!
//! [sandbox]
//! timeout_secs = 10
//! program = "pytest"
//!
//! [llm]
//! model = "claude-3-5-sonnet-20241022"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use testsmith_llm::LlmConfig;

use crate::controller::VerifyPolicy;
use crate::domain::{Result, SynthError};

/// How candidate tests are run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSettings {
    /// Wall-clock limit per run in seconds.
    pub timeout_secs: u64,
    /// Test runner executable.
    pub program: String,
    /// Runner arguments; the test file name comes first.
    pub args: Vec<String>,
    /// Content written to placeholder files the test opens.
    pub placeholder_content: String,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            program: "pytest".to_string(),
            args: ["test_module.py", "-v", "--tb=short", "--disable-warnings"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            placeholder_content: "dummy content\n".to_string(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    pub policy: VerifyPolicy,
    pub sandbox: SandboxSettings,
    pub llm: LlmConfig,
}

impl SynthConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: SynthConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup.
    ///
    /// `TESTSMITH_MAX_ATTEMPTS`, `TESTSMITH_TIMEOUT_SECS` and
    /// `TESTSMITH_MAX_CONCURRENCY` tune the loop; completion settings are
    /// read by [`LlmConfig::with_env_overrides`].
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(n) = parse_var(&lookup, "TESTSMITH_MAX_ATTEMPTS")? {
            self.policy.max_attempts = n;
        }
        if let Some(n) = parse_var(&lookup, "TESTSMITH_TIMEOUT_SECS")? {
            self.sandbox.timeout_secs = n;
        }
        if let Some(n) = parse_var(&lookup, "TESTSMITH_MAX_CONCURRENCY")? {
            self.policy.max_concurrent_units = n;
        }
        self.llm = self.llm.with_env_overrides(&lookup);
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        self.policy.validate()?;
        if self.sandbox.timeout_secs == 0 {
            return Err(SynthError::InvalidConfig(
                "sandbox.timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.sandbox.program.trim().is_empty() {
            return Err(SynthError::InvalidConfig(
                "sandbox.program must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.sandbox.timeout_secs)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SynthError::InvalidConfig(format!("{key} is not a valid number: {raw}"))),
    }
}
