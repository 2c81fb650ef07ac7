//! testsmith core library
//!
//! Synthesizes pytest tests for Python sources and verifies them:
//! extract units, infer their dependencies, ask a generator for a candidate
//! test, run it in a sandbox, classify the failure and regenerate within a
//! bounded number of attempts.

pub mod classify;
pub mod config;
pub mod controller;
pub mod deps;
pub mod domain;
pub mod execution;
pub mod extract;
pub mod generator;
pub mod handler;
pub mod obs;
pub mod syntax;
pub mod telemetry;
pub mod text;

pub use domain::{
    AttemptRecord, CandidateTest, DependencySet, ExecutionResult, FailureAnalysis, FailureKind,
    GenerateError, Result, SourceUnit, SynthError, SynthesizedTest, UnitVerdict, VerdictStatus,
};

pub use classify::{analyze, classify};
pub use config::{SandboxSettings, SynthConfig};
pub use controller::{Synthesizer, VerifyPolicy, DEFAULT_EXECUTION_TIMEOUT};
pub use deps::{DependencyInferencer, DependencyStrategy, PatternStrategy, StructuralStrategy};
pub use execution::TestExecutor;
pub use extract::{extract_module, extract_units, ExtractedModule};
pub use generator::{
    CandidateGenerator, CompletionBackend, GenerationRequest, GeneratorAdapter, RewriteContext,
    RewritePipeline,
};
pub use handler::is_handler_style;
