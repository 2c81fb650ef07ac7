//! testsmith sandbox
//!
//! Runs a candidate test next to its parent module in a fresh temporary
//! directory with pytest, under a wall-clock limit, and removes the
//! directory afterwards.

pub mod config;
pub mod error;
pub mod runner;
pub mod workspace;

pub use config::{SandboxConfig, MODULE_FILE, TEST_FILE};
pub use error::{Result, SandboxError};
pub use runner::run_command;
pub use workspace::SandboxDir;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use testsmith_core::{ExecutionResult, SandboxSettings, TestExecutor};
use tracing::info_span;
use tracing::Instrument;

/// One finished sandbox run.
#[derive(Debug, Clone)]
pub struct SandboxRun {
    pub result: ExecutionResult,
    /// Where the run happened; already removed.
    pub root: PathBuf,
}

/// Pytest-backed [`TestExecutor`].
#[derive(Debug, Clone, Default)]
pub struct PytestSandbox {
    config: SandboxConfig,
}

impl PytestSandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn from_settings(settings: &SandboxSettings) -> Self {
        Self::new(SandboxConfig::from(settings))
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Materialize the sandbox, run the command and tear the sandbox down.
    pub async fn run(&self, module_text: &str, test_text: &str, timeout: Duration) -> Result<SandboxRun> {
        let sandbox = SandboxDir::prepare(&self.config, module_text, test_text).await?;
        let root = sandbox.path().to_path_buf();
        let span = info_span!("sandbox.run", root = %root.display());
        let result = run_command(&self.config.command, &root, timeout)
            .instrument(span)
            .await;
        drop(sandbox);
        Ok(SandboxRun {
            result: result?,
            root,
        })
    }
}

#[async_trait]
impl TestExecutor for PytestSandbox {
    async fn execute(
        &self,
        module_text: &str,
        test_text: &str,
        timeout: Duration,
    ) -> testsmith_core::Result<ExecutionResult> {
        let run = self.run(module_text, test_text, timeout).await?;
        Ok(run.result)
    }
}
