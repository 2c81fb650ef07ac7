//! Domain models for testsmith.
//!
//! Canonical definitions for the core entities:
//! - `SourceUnit`: One testable top-level function
//! - `DependencySet`: External names a unit references
//! - `CandidateTest` / `ExecutionResult`: One generated test and its run
//! - `FailureAnalysis`: Classified failure with repair hints
//! - `UnitVerdict`: Attempt history and final status for a unit

pub mod attempt;
pub mod digest;
pub mod error;
pub mod unit;

// Re-export main types and errors
pub use attempt::{
    has_failure_markers, AttemptRecord, CandidateTest, ExecutionResult, FailureAnalysis,
    FailureKind, SynthesizedTest, UnitVerdict, VerdictStatus,
};
pub use error::{GenerateError, Result, SynthError};
pub use unit::{DependencySet, SourceUnit};
