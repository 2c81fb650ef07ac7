//! Runner process execution.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use testsmith_core::ExecutionResult;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Result, SandboxError};

/// Run `command` inside `cwd`, killing it once `timeout` elapses.
///
/// Output is stdout followed by stderr. A timeout is a normal result with
/// `timed_out` set and no exit code.
pub async fn run_command(command: &[String], cwd: &Path, timeout: Duration) -> Result<ExecutionResult> {
    let start = Instant::now();

    let (exe, args) = command.split_first().ok_or(SandboxError::EmptyCommand)?;

    let child = Command::new(exe)
        .args(args)
        .current_dir(cwd)
        .env("PYTHONDONTWRITEBYTECODE", "1")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                SandboxError::RunnerNotFound(exe.clone())
            } else {
                SandboxError::Spawn {
                    program: exe.clone(),
                    source,
                }
            }
        })?;

    let limit_ms = timeout.as_millis() as u64;
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => output.map_err(SandboxError::Output)?,
        Err(_) => {
            // Dropping the wait future drops the child, which kills it.
            warn!(program = %exe, limit_ms, "test run timed out");
            return Ok(ExecutionResult::timeout(
                format!("test run timed out after {} ms", limit_ms),
                limit_ms,
            ));
        }
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));

    debug!(
        program = %exe,
        exit_code = ?output.status.code(),
        duration_ms,
        "test run finished"
    );

    Ok(ExecutionResult {
        exit_code: output.status.code(),
        output: text,
        timed_out: false,
        duration_ms,
    })
}
