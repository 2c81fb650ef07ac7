//! Structured observability hooks for the verification loop.
//!
//! This module provides:
//! - Request-scoped tracing spans via `RequestSpan`
//! - Emission functions for key lifecycle events: request, unit, attempt, verdict
//!
//! Events are emitted at `info!` level (configurable via `RUST_LOG`).
//! For JSON output, pass `--json` to the binary.

use tracing::{info, warn, Span};

use crate::domain::{FailureKind, VerdictStatus};

/// Span tagged with a request id; every unit of the request runs inside it.
///
/// # Example
///
/// ```ignore
/// let span = RequestSpan::new("req-12345");
/// verify_all().instrument(span.span().clone()).await;
/// ```
pub struct RequestSpan {
    span: Span,
}

impl RequestSpan {
    pub fn new(request_id: &str) -> Self {
        Self {
            span: tracing::info_span!("testsmith.request", request_id = %request_id),
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Enter the span for synchronous work.
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

/// Span for one unit's state machine.
pub fn unit_span(function: &str) -> Span {
    tracing::info_span!("testsmith.unit", function = %function)
}

/// Emit event: request accepted with its unit count.
pub fn emit_request_started(request_id: &str, units: usize) {
    info!(event = "request.started", request_id = %request_id, units = units);
}

/// Emit event: request finished.
pub fn emit_request_finished(request_id: &str, units: usize, succeeded: usize, duration_ms: u64) {
    info!(
        event = "request.finished",
        request_id = %request_id,
        units = units,
        succeeded = succeeded,
        duration_ms = duration_ms,
    );
}

/// Emit event: unit entered the loop.
pub fn emit_unit_started(function: &str, handler: bool, dependencies: usize) {
    info!(
        event = "unit.started",
        function = %function,
        handler = handler,
        dependencies = dependencies,
    );
}

/// Emit event: one attempt finished; `failure` is `None` on success.
pub fn emit_attempt_finished(
    function: &str,
    attempt: u32,
    failure: Option<FailureKind>,
    input_tokens: u64,
    output_tokens: u64,
) {
    info!(
        event = "attempt.finished",
        function = %function,
        attempt = attempt,
        passed = failure.is_none(),
        failure = failure.map(FailureKind::label).unwrap_or("none"),
        input_tokens = input_tokens,
        output_tokens = output_tokens,
    );
}

/// Emit event: final verdict for a unit.
pub fn emit_unit_verdict(
    function: &str,
    status: VerdictStatus,
    attempts: usize,
    input_tokens: u64,
    output_tokens: u64,
) {
    info!(
        event = "unit.verdict",
        function = %function,
        success = status == VerdictStatus::Success,
        attempts = attempts,
        input_tokens = input_tokens,
        output_tokens = output_tokens,
    );
}

/// Emit event: sandbox infrastructure failure (warning level).
pub fn emit_sandbox_error(function: &str, attempt: u32, error: &dyn std::fmt::Display) {
    warn!(event = "sandbox.error", function = %function, attempt = attempt, error = %error);
}
