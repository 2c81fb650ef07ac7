//! Runner command and sandbox layout.

use serde::{Deserialize, Serialize};
use testsmith_core::SandboxSettings;

/// File the parent module is written to.
pub const MODULE_FILE: &str = "module.py";

/// File the candidate test is written to.
pub const TEST_FILE: &str = "test_module.py";

/// Configuration for the pytest sandbox.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SandboxConfig {
    /// Command to execute (first element is executable), run inside the sandbox.
    pub command: Vec<String>,

    /// Content of placeholder files the test opens.
    pub placeholder_content: String,

    /// Line prepended to the test so `module.<name>` references resolve.
    pub test_prelude: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self::from(&SandboxSettings::default())
    }
}

impl From<&SandboxSettings> for SandboxConfig {
    fn from(settings: &SandboxSettings) -> Self {
        let mut command = Vec::with_capacity(settings.args.len() + 1);
        command.push(settings.program.clone());
        command.extend(settings.args.iter().cloned());
        Self {
            command,
            placeholder_content: settings.placeholder_content.clone(),
            test_prelude: "import module\n".to_string(),
        }
    }
}

impl SandboxConfig {
    /// Sandbox running an arbitrary command instead of pytest.
    pub fn custom(command: Vec<String>) -> Self {
        Self {
            command,
            ..Self::default()
        }
    }

    pub fn program(&self) -> Option<&str> {
        self.command.first().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_runs_pytest_on_test_file() {
        let config = SandboxConfig::default();
        assert_eq!(
            config.command,
            vec!["pytest", "test_module.py", "-v", "--tb=short", "--disable-warnings"]
        );
        assert_eq!(config.placeholder_content, "dummy content\n");
        assert_eq!(config.program(), Some("pytest"));
    }

    #[test]
    fn test_from_settings() {
        let settings = SandboxSettings {
            program: "python3".to_string(),
            args: vec!["-m".to_string(), "pytest".to_string()],
            ..SandboxSettings::default()
        };
        let config = SandboxConfig::from(&settings);
        assert_eq!(config.command, vec!["python3", "-m", "pytest"]);
    }
}
