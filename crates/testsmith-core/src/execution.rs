//! Test execution seam.
//!
//! The controller only knows [`TestExecutor`]; the pytest sandbox lives in
//! its own crate and implements it.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{ExecutionResult, Result};

/// Runs a candidate test against its parent module in isolation.
#[async_trait]
pub trait TestExecutor: Send + Sync {
    /// Execute `test_text` next to `module_text`.
    ///
    /// A timeout or a failing test is an `Ok` result; `Err` is reserved
    /// for infrastructure failures (no directory, runner missing).
    async fn execute(
        &self,
        module_text: &str,
        test_text: &str,
        timeout: Duration,
    ) -> Result<ExecutionResult>;
}
