//! Candidate generator adapter.
//!
//! Wraps a [`CompletionBackend`] behind the [`CandidateGenerator`] contract:
//! build the prompt, ask once, post-process the returned text. Retrying is
//! the controller's business, never the adapter's.

pub mod backend;
pub mod prompt;
pub mod rewrite;

use std::collections::BTreeSet;

use async_trait::async_trait;
use tracing::debug;

pub use backend::CompletionBackend;
pub use rewrite::{has_test_function, RewriteContext, RewritePipeline, RewriteRule};

use crate::domain::{CandidateTest, DependencySet, FailureAnalysis, GenerateError, SourceUnit};

/// Everything needed to generate one candidate.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub unit: &'a SourceUnit,
    pub dependencies: &'a DependencySet,
    /// Top-level bindings of the parent module, when known.
    pub module_bindings: Option<&'a BTreeSet<String>>,
    /// Candidate of the previous attempt, for regeneration.
    pub previous: Option<&'a CandidateTest>,
    /// Why the previous attempt failed.
    pub failure: Option<&'a FailureAnalysis>,
}

impl<'a> GenerationRequest<'a> {
    pub fn first(
        unit: &'a SourceUnit,
        dependencies: &'a DependencySet,
        module_bindings: Option<&'a BTreeSet<String>>,
    ) -> Self {
        Self {
            unit,
            dependencies,
            module_bindings,
            previous: None,
            failure: None,
        }
    }

    pub fn is_regeneration(&self) -> bool {
        self.previous.is_some() && self.failure.is_some()
    }

    pub fn prompt(&self) -> String {
        match (self.previous, self.failure) {
            (Some(previous), Some(failure)) => prompt::regeneration(
                self.unit,
                self.dependencies,
                self.module_bindings,
                previous,
                failure,
            ),
            _ => prompt::first_attempt(self.unit, self.dependencies, self.module_bindings),
        }
    }

    pub fn rewrite_context(&self) -> RewriteContext<'a> {
        RewriteContext {
            unit_name: &self.unit.name,
            dependencies: self.dependencies,
            module_bindings: self.module_bindings,
            handler: self.unit.handler,
        }
    }
}

/// Produces candidate tests for units.
#[async_trait]
pub trait CandidateGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<CandidateTest, GenerateError>;
}

/// Default generator: prompt, one completion call, rewrite pipeline.
pub struct GeneratorAdapter<B> {
    backend: B,
    pipeline: RewritePipeline,
}

impl<B: CompletionBackend> GeneratorAdapter<B> {
    pub fn new(backend: B) -> Self {
        Self::with_pipeline(backend, RewritePipeline::default())
    }

    pub fn with_pipeline(backend: B, pipeline: RewritePipeline) -> Self {
        Self { backend, pipeline }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[async_trait]
impl<B: CompletionBackend> CandidateGenerator for GeneratorAdapter<B> {
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<CandidateTest, GenerateError> {
        let prompt = request.prompt();
        debug!(
            function = %request.unit.name,
            regeneration = request.is_regeneration(),
            prompt_chars = prompt.len(),
            "requesting candidate"
        );

        let completion = self.backend.complete(&prompt).await?;
        let text = self.pipeline.apply(&completion.text, &request.rewrite_context());

        Ok(CandidateTest {
            raw_text: completion.text,
            text,
            input_tokens: completion.input_tokens,
            output_tokens: completion.output_tokens,
        })
    }
}
