//! Failure classifier for pytest output.
//!
//! Maps raw runner output onto [`FailureKind`] by first match over an
//! ordered rule table, attaching the matching line as the message.

use std::sync::OnceLock;

use regex::Regex;

use crate::domain::{ExecutionResult, FailureAnalysis, FailureKind};
use crate::text::excerpt;

/// Longest message kept on an analysis.
const MAX_MESSAGE_CHARS: usize = 500;

/// Classification order; the first matching rule wins.
const RULES: &[(FailureKind, &str)] = &[
    (
        FailureKind::ImportError,
        r"ModuleNotFoundError|ImportError|cannot import name|No module named",
    ),
    (FailureKind::NameError, r"NameError|is not defined"),
    (FailureKind::AttributeError, r"AttributeError|has no attribute"),
    (FailureKind::SyntaxError, r"SyntaxError|IndentationError|TabError"),
    (FailureKind::AssertionError, r"(?m)AssertionError|^E\s+assert\b"),
    (FailureKind::FixtureError, r"fixture '[^']+' not found"),
    (
        FailureKind::MockError,
        r"ConnectionError|requests\.exceptions|Max retries exceeded|urlopen|Failed to establish a new connection",
    ),
    (FailureKind::Timeout, r"TimeoutExpired|TimeoutError|[Tt]imed out"),
];

fn rules() -> &'static [(FailureKind, Regex)] {
    static COMPILED: OnceLock<Vec<(FailureKind, Regex)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        RULES
            .iter()
            .map(|(kind, pattern)| {
                (
                    *kind,
                    Regex::new(pattern).expect("classifier pattern must compile"),
                )
            })
            .collect()
    })
}

/// Classify runner output. Pure: same output, same analysis.
pub fn classify(output: &str) -> FailureAnalysis {
    for (kind, pattern) in rules() {
        if pattern.is_match(output) {
            let message = output
                .lines()
                .find(|line| pattern.is_match(line))
                .map(clean_line)
                .filter(|line| !line.is_empty())
                .unwrap_or_else(|| kind.label().to_string());
            return FailureAnalysis::of(*kind, excerpt(&message, MAX_MESSAGE_CHARS));
        }
    }
    FailureAnalysis::of(FailureKind::Unknown, excerpt(&unknown_message(output), MAX_MESSAGE_CHARS))
}

/// Analyze a finished run: a killed run is a timeout regardless of output.
pub fn analyze(result: &ExecutionResult) -> FailureAnalysis {
    if result.timed_out {
        return FailureAnalysis::of(
            FailureKind::Timeout,
            format!("test run exceeded {} ms and was terminated", result.duration_ms),
        );
    }
    classify(&result.output)
}

/// Strip pytest's `E ` gutter and surrounding whitespace.
fn clean_line(line: &str) -> String {
    let trimmed = line.trim();
    trimmed
        .strip_prefix("E ")
        .map(str::trim)
        .unwrap_or(trimmed)
        .to_string()
}

fn unknown_message(output: &str) -> String {
    output
        .lines()
        .filter(|line| line.trim_start().starts_with("E "))
        .map(clean_line)
        .next()
        .or_else(|| {
            output
                .lines()
                .rev()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "test run failed without output".to_string())
}
