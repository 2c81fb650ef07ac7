//! Candidates, execution results, failure analyses and per-unit verdicts.

use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::digest::sha256_hex;
use crate::text::cached_regex;

/// Generated test code for one unit, as returned and after post-processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateTest {
    /// Text exactly as the generator returned it.
    pub raw_text: String,
    /// Text after the rewrite pipeline; this is what gets executed.
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl CandidateTest {
    /// SHA-256 of the post-processed text.
    pub fn digest(&self) -> String {
        sha256_hex(self.text.as_bytes())
    }
}

/// Outcome of one sandboxed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Process exit code; `None` when the process was killed.
    pub exit_code: Option<i32>,
    /// Combined stdout and stderr.
    pub output: String,
    /// The wall-clock limit was hit and the process was terminated.
    pub timed_out: bool,
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// Result for a run that was killed at `limit_ms`.
    pub fn timeout(output: String, limit_ms: u64) -> Self {
        Self {
            exit_code: None,
            output,
            timed_out: true,
            duration_ms: limit_ms,
        }
    }

    /// Exit status 0, not timed out and no failure markers in the output.
    pub fn passed(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0) && !has_failure_markers(&self.output)
    }
}

/// Whether runner output reports failed or errored tests.
pub fn has_failure_markers(output: &str) -> bool {
    static MARKERS: OnceLock<Regex> = OnceLock::new();
    cached_regex(
        &MARKERS,
        r"(?m)^(?:FAILED|ERROR)\b|\b\d+ (?:failed|errors?)\b|no tests ran",
    )
    .is_match(output)
}

/// Failure taxonomy, in classification order for the output-derived kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    GeneratorUnavailable,
    GeneratorError,
    GenerationError,
    ImportError,
    NameError,
    AttributeError,
    SyntaxError,
    AssertionError,
    FixtureError,
    MockError,
    Timeout,
    ExecutionError,
    Unknown,
}

impl FailureKind {
    /// Whether another generation attempt can possibly help.
    pub fn is_retryable(self) -> bool {
        !matches!(self, FailureKind::GeneratorUnavailable)
    }

    pub fn label(self) -> &'static str {
        match self {
            FailureKind::GeneratorUnavailable => "GeneratorUnavailable",
            FailureKind::GeneratorError => "GeneratorError",
            FailureKind::GenerationError => "GenerationError",
            FailureKind::ImportError => "ImportError",
            FailureKind::NameError => "NameError",
            FailureKind::AttributeError => "AttributeError",
            FailureKind::SyntaxError => "SyntaxError",
            FailureKind::AssertionError => "AssertionError",
            FailureKind::FixtureError => "FixtureError",
            FailureKind::MockError => "MockError",
            FailureKind::Timeout => "Timeout",
            FailureKind::ExecutionError => "ExecutionError",
            FailureKind::Unknown => "unknown",
        }
    }

    /// Canned hints attached to every analysis of this kind.
    pub fn default_fixes(self) -> &'static [&'static str] {
        match self {
            FailureKind::GeneratorUnavailable => &["Configure ANTHROPIC_API_KEY and retry the request"],
            FailureKind::GeneratorError | FailureKind::GenerationError => &[
                "Retry generation; the previous request produced no usable test",
            ],
            FailureKind::ImportError => &[
                "Import the unit under test with `from module import <name>`",
                "Only import third-party packages that the module itself imports",
                "Add every helper and constant the function uses to the module import",
            ],
            FailureKind::NameError => &[
                "Define or import every name the test references",
                "Call the function under test by its exact name",
            ],
            FailureKind::AttributeError => &[
                "Do not assume attributes that the returned object does not have",
                "Patch the attribute on the object the module actually uses",
            ],
            FailureKind::SyntaxError => &[
                "Return only valid Python test code with no prose or Markdown",
                "Check indentation and bracket balance",
            ],
            FailureKind::AssertionError => &[
                "Recompute the expected value from the function body",
                "Assert on behaviour the function actually guarantees",
            ],
            FailureKind::FixtureError => &[
                "Define the `app` and `client` fixtures with @pytest.fixture",
                "Register every blueprint on an isolated Flask application",
            ],
            FailureKind::MockError => &[
                "Patch network calls (requests, HTTP clients) with unittest.mock.patch",
                "Never reach external services from a unit test",
            ],
            FailureKind::Timeout => &[
                "Remove infinite loops and blocking calls",
                "Mock sleeps, network and subprocess calls",
            ],
            FailureKind::ExecutionError => &["Retry; the sandbox could not run the test"],
            FailureKind::Unknown => &["Inspect the runner output and simplify the test"],
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classified failure with hints for the next regeneration prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureAnalysis {
    pub kind: FailureKind,
    pub message: String,
    pub suggested_fixes: Vec<String>,
    /// Whether a full regeneration is the expected remedy.
    pub needs_regeneration: bool,
}

impl FailureAnalysis {
    /// Analysis with the canned hints for `kind`.
    pub fn of(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            suggested_fixes: kind.default_fixes().iter().map(|s| s.to_string()).collect(),
            needs_regeneration: !matches!(
                kind,
                FailureKind::AssertionError | FailureKind::GeneratorUnavailable
            ),
        }
    }
}

/// One generate-execute-classify cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based ordinal.
    pub attempt: u32,
    /// Absent when generation failed.
    pub candidate: Option<CandidateTest>,
    /// Absent when nothing was executed.
    pub execution: Option<ExecutionResult>,
    /// Absent when the attempt succeeded.
    pub analysis: Option<FailureAnalysis>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub started_at: DateTime<Utc>,
}

impl AttemptRecord {
    pub fn succeeded(&self) -> bool {
        self.analysis.is_none() && self.execution.as_ref().is_some_and(ExecutionResult::passed)
    }
}

/// Terminal status of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictStatus {
    Success,
    Failed,
}

/// Final, externally reported outcome for one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitVerdict {
    pub function: String,
    pub attempts: Vec<AttemptRecord>,
    pub status: VerdictStatus,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl UnitVerdict {
    pub fn is_success(&self) -> bool {
        self.status == VerdictStatus::Success
    }

    /// Analysis of the terminal attempt, if it failed.
    pub fn last_analysis(&self) -> Option<&FailureAnalysis> {
        self.attempts.last().and_then(|a| a.analysis.as_ref())
    }

    /// The candidate of the terminal attempt, if one was generated.
    pub fn final_candidate(&self) -> Option<&CandidateTest> {
        self.attempts.last().and_then(|a| a.candidate.as_ref())
    }
}

/// One-shot generation output for a unit (no execution).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SynthesizedTest {
    pub function: String,
    pub function_code: String,
    pub candidate: Option<CandidateTest>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Generation failure, when `candidate` is absent.
    pub error: Option<FailureAnalysis>,
}
