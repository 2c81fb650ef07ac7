//! Iteration controller: the bounded generate-execute-classify loop.
//!
//! Each unit runs its own state machine
//! `Generating -> Executing -> {Succeeded | Analyzing -> Generating | Exhausted}`.
//! Units run as independent tasks bounded by a semaphore; verdicts come back
//! in extraction order.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, warn, Instrument};

use crate::classify::analyze;
use crate::deps::DependencyInferencer;
use crate::domain::{
    AttemptRecord, CandidateTest, DependencySet, ExecutionResult, FailureAnalysis, FailureKind,
    GenerateError, Result, SourceUnit, SynthError, SynthesizedTest, UnitVerdict, VerdictStatus,
};
use crate::execution::TestExecutor;
use crate::extract::extract_module;
use crate::generator::{has_test_function, CandidateGenerator, GenerationRequest};
use crate::obs;
use crate::syntax;

/// Default wall-clock limit for one sandboxed run.
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Retry policy for the verification loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyPolicy {
    /// Upper bound on attempts per unit.
    pub max_attempts: u32,
    /// Regenerate after an assertion failure.
    pub regenerate_on_assertion: bool,
    /// Spend another attempt after a transport or status failure.
    pub retry_generator_errors: bool,
    /// Units processed at the same time; 1 means sequential.
    pub max_concurrent_units: usize,
}

impl Default for VerifyPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            regenerate_on_assertion: true,
            retry_generator_errors: true,
            max_concurrent_units: 1,
        }
    }
}

impl VerifyPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(SynthError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent_units == 0 {
            return Err(SynthError::InvalidConfig(
                "max_concurrent_units must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether the loop goes back to `Generating` after `analysis` on `attempt`.
    pub fn should_retry(&self, analysis: &FailureAnalysis, attempt: u32, max_attempts: u32) -> bool {
        if attempt >= max_attempts || !analysis.kind.is_retryable() {
            return false;
        }
        match analysis.kind {
            FailureKind::AssertionError => self.regenerate_on_assertion,
            FailureKind::GeneratorError => self.retry_generator_errors,
            _ => true,
        }
    }
}

struct Engine {
    generator: Arc<dyn CandidateGenerator>,
    executor: Arc<dyn TestExecutor>,
    inferencer: Arc<DependencyInferencer>,
    policy: VerifyPolicy,
    execution_timeout: Duration,
}

/// Entry point for test synthesis over a source text.
#[derive(Clone)]
pub struct Synthesizer {
    engine: Arc<Engine>,
}

impl Synthesizer {
    pub fn new(generator: Arc<dyn CandidateGenerator>, executor: Arc<dyn TestExecutor>) -> Self {
        Self {
            engine: Arc::new(Engine {
                generator,
                executor,
                inferencer: Arc::new(DependencyInferencer::default()),
                policy: VerifyPolicy::default(),
                execution_timeout: DEFAULT_EXECUTION_TIMEOUT,
            }),
        }
    }

    pub fn with_policy(self, policy: VerifyPolicy) -> Self {
        self.map_engine(|engine| engine.policy = policy)
    }

    pub fn with_execution_timeout(self, timeout: Duration) -> Self {
        self.map_engine(|engine| engine.execution_timeout = timeout)
    }

    pub fn with_inferencer(self, inferencer: DependencyInferencer) -> Self {
        self.map_engine(|engine| engine.inferencer = Arc::new(inferencer))
    }

    fn map_engine(self, f: impl FnOnce(&mut Engine)) -> Self {
        let mut engine = match Arc::try_unwrap(self.engine) {
            Ok(engine) => engine,
            Err(shared) => Engine {
                generator: Arc::clone(&shared.generator),
                executor: Arc::clone(&shared.executor),
                inferencer: Arc::clone(&shared.inferencer),
                policy: shared.policy.clone(),
                execution_timeout: shared.execution_timeout,
            },
        };
        f(&mut engine);
        Self {
            engine: Arc::new(engine),
        }
    }

    pub fn policy(&self) -> &VerifyPolicy {
        &self.engine.policy
    }

    /// Generate, execute and regenerate per unit using the policy's attempt bound.
    pub async fn verify(&self, source: &str) -> Result<Vec<UnitVerdict>> {
        self.synthesize_and_verify(source, self.engine.policy.max_attempts)
            .await
    }

    /// One verdict per extracted unit, in extraction order.
    ///
    /// Fails only for request-level problems: unparsable source or an
    /// invalid attempt bound.
    pub async fn synthesize_and_verify(
        &self,
        source: &str,
        max_attempts: u32,
    ) -> Result<Vec<UnitVerdict>> {
        if max_attempts == 0 {
            return Err(SynthError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        self.engine.policy.validate()?;

        let request_id = uuid::Uuid::new_v4().to_string();
        let request_span = obs::RequestSpan::new(&request_id);
        let started = Instant::now();

        let module = {
            let _entered = request_span.enter();
            extract_module(source)?
        };
        obs::emit_request_started(&request_id, module.units.len());

        let bindings = Arc::new(module.bindings);
        let module_text: Arc<str> = module.source;
        let semaphore = Arc::new(tokio::sync::Semaphore::new(
            self.engine.policy.max_concurrent_units,
        ));

        // Dropping the set aborts every unit still in flight.
        let mut join_set = JoinSet::new();
        let names: Vec<String> = module.units.iter().map(SourceUnit::id).collect();
        for (idx, unit) in module.units.into_iter().enumerate() {
            let engine = Arc::clone(&self.engine);
            let bindings = Arc::clone(&bindings);
            let module_text = Arc::clone(&module_text);
            let semaphore = Arc::clone(&semaphore);

            join_set.spawn(
                async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    let deps = engine.inferencer.infer(&unit);
                    let verdict = engine
                        .verify_unit(&unit, &deps, &bindings, &module_text, max_attempts)
                        .await;
                    (idx, verdict)
                }
                .instrument(request_span.span().clone()),
            );
        }

        let mut slots: Vec<Option<UnitVerdict>> = names.iter().map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, verdict)) => slots[idx] = Some(verdict),
                Err(err) => warn!(error = %err, "unit task aborted"),
            }
        }
        let verdicts: Vec<UnitVerdict> = slots
            .into_iter()
            .zip(names)
            .map(|(slot, name)| slot.unwrap_or_else(|| aborted_verdict(name)))
            .collect();

        let succeeded = verdicts.iter().filter(|v| v.is_success()).count();
        obs::emit_request_finished(
            &request_id,
            verdicts.len(),
            succeeded,
            started.elapsed().as_millis() as u64,
        );
        Ok(verdicts)
    }

    /// One generation per unit, nothing executed.
    pub async fn synthesize_once(&self, source: &str) -> Result<Vec<SynthesizedTest>> {
        self.engine.policy.validate()?;
        let module = extract_module(source)?;
        let bindings = Arc::new(module.bindings);
        let semaphore = Arc::new(tokio::sync::Semaphore::new(
            self.engine.policy.max_concurrent_units,
        ));

        let mut join_set = JoinSet::new();
        let units: Vec<(String, String)> = module
            .units
            .iter()
            .map(|u| (u.id(), u.text.clone()))
            .collect();
        for (idx, unit) in module.units.into_iter().enumerate() {
            let engine = Arc::clone(&self.engine);
            let bindings = Arc::clone(&bindings);
            let semaphore = Arc::clone(&semaphore);

            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let deps = engine.inferencer.infer(&unit);
                let request = GenerationRequest::first(&unit, &deps, Some(bindings.as_ref()));
                (idx, engine.generator.generate(&request).await)
            });
        }

        let mut slots: Vec<Option<std::result::Result<CandidateTest, GenerateError>>> =
            units.iter().map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, outcome)) => slots[idx] = Some(outcome),
                Err(err) => warn!(error = %err, "generation task aborted"),
            }
        }

        let mut tests = Vec::with_capacity(units.len());
        for ((function, function_code), slot) in units.into_iter().zip(slots) {
            let outcome = slot.unwrap_or_else(|| {
                Err(GenerateError::Backend("generation task aborted".to_string()))
            });
            tests.push(match outcome {
                Ok(candidate) => SynthesizedTest {
                    function,
                    function_code,
                    input_tokens: candidate.input_tokens,
                    output_tokens: candidate.output_tokens,
                    candidate: Some(candidate),
                    error: None,
                },
                Err(err) => SynthesizedTest {
                    function,
                    function_code,
                    candidate: None,
                    input_tokens: 0,
                    output_tokens: 0,
                    error: Some(generation_failure(&err)),
                },
            });
        }
        Ok(tests)
    }
}

impl Engine {
    async fn verify_unit(
        &self,
        unit: &SourceUnit,
        deps: &DependencySet,
        bindings: &BTreeSet<String>,
        module_text: &str,
        max_attempts: u32,
    ) -> UnitVerdict {
        let span = obs::unit_span(&unit.id());
        self.run_state_machine(unit, deps, bindings, module_text, max_attempts)
            .instrument(span)
            .await
    }

    async fn run_state_machine(
        &self,
        unit: &SourceUnit,
        deps: &DependencySet,
        bindings: &BTreeSet<String>,
        module_text: &str,
        max_attempts: u32,
    ) -> UnitVerdict {
        obs::emit_unit_started(&unit.id(), unit.handler, deps.len());

        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut previous: Option<CandidateTest> = None;
        let mut failure: Option<FailureAnalysis> = None;
        let mut status = VerdictStatus::Failed;

        for attempt in 1..=max_attempts {
            let started_at = Utc::now();

            // Generating
            let request = GenerationRequest {
                unit,
                dependencies: deps,
                module_bindings: Some(bindings),
                previous: previous.as_ref(),
                failure: failure.as_ref(),
            };
            let candidate = match self.generator.generate(&request).await {
                Ok(candidate) => candidate,
                Err(err) => {
                    let analysis = generation_failure(&err);
                    let retry = self.policy.should_retry(&analysis, attempt, max_attempts);
                    obs::emit_attempt_finished(&unit.id(), attempt, Some(analysis.kind), 0, 0);
                    attempts.push(AttemptRecord {
                        attempt,
                        candidate: None,
                        execution: None,
                        analysis: Some(analysis),
                        input_tokens: 0,
                        output_tokens: 0,
                        started_at,
                    });
                    if retry {
                        continue;
                    }
                    break;
                }
            };

            let (execution, analysis) = if !has_test_function(&candidate.text) {
                (
                    None,
                    Some(FailureAnalysis::of(
                        FailureKind::GenerationError,
                        "generator returned no pytest test function",
                    )),
                )
            } else {
                // Executing
                match self.execute(unit, attempt, module_text, &candidate).await {
                    Execution::Ran(result) if result.passed() => (Some(result), None),
                    // Analyzing
                    Execution::Ran(result) => {
                        let analysis = analyze(&result);
                        (Some(result), Some(analysis))
                    }
                    Execution::Rejected(result) => {
                        let analysis =
                            FailureAnalysis::of(FailureKind::SyntaxError, result.output.clone());
                        (Some(result), Some(analysis))
                    }
                    Execution::Infrastructure(analysis) => (None, Some(analysis)),
                }
            };

            obs::emit_attempt_finished(
                &unit.id(),
                attempt,
                analysis.as_ref().map(|a| a.kind),
                candidate.input_tokens,
                candidate.output_tokens,
            );

            let retry = analysis
                .as_ref()
                .is_some_and(|a| self.policy.should_retry(a, attempt, max_attempts));
            let succeeded = analysis.is_none();

            attempts.push(AttemptRecord {
                attempt,
                input_tokens: candidate.input_tokens,
                output_tokens: candidate.output_tokens,
                candidate: Some(candidate.clone()),
                execution,
                analysis: analysis.clone(),
                started_at,
            });

            if succeeded {
                status = VerdictStatus::Success;
                break;
            }
            if !retry {
                break;
            }
            previous = Some(candidate);
            failure = analysis;
        }

        let input_tokens = attempts.iter().map(|a| a.input_tokens).sum();
        let output_tokens = attempts.iter().map(|a| a.output_tokens).sum();
        obs::emit_unit_verdict(&unit.id(), status, attempts.len(), input_tokens, output_tokens);

        UnitVerdict {
            function: unit.id(),
            attempts,
            status,
            input_tokens,
            output_tokens,
        }
    }

    /// Syntax-check, then run in the sandbox.
    async fn execute(
        &self,
        unit: &SourceUnit,
        attempt: u32,
        module_text: &str,
        candidate: &CandidateTest,
    ) -> Execution {
        if let Err(err) = syntax::check(&candidate.text) {
            debug!(function = %unit.id(), attempt, error = %err, "candidate failed syntax check");
            return Execution::Rejected(ExecutionResult {
                exit_code: None,
                output: format!("SyntaxError in generated test code: {err}"),
                timed_out: false,
                duration_ms: 0,
            });
        }

        match self
            .executor
            .execute(module_text, &candidate.text, self.execution_timeout)
            .await
        {
            Ok(result) => Execution::Ran(result),
            Err(err) => {
                obs::emit_sandbox_error(&unit.id(), attempt, &err);
                Execution::Infrastructure(FailureAnalysis::of(
                    FailureKind::ExecutionError,
                    err.to_string(),
                ))
            }
        }
    }
}

/// What happened when a candidate was handed to the executor.
enum Execution {
    /// The runner ran to completion or was killed on timeout.
    Ran(ExecutionResult),
    /// The candidate did not parse; nothing was spawned.
    Rejected(ExecutionResult),
    /// The sandbox itself failed.
    Infrastructure(FailureAnalysis),
}

fn generation_failure(err: &GenerateError) -> FailureAnalysis {
    match err {
        GenerateError::Unavailable(msg) => {
            FailureAnalysis::of(FailureKind::GeneratorUnavailable, msg.clone())
        }
        GenerateError::Backend(msg) => FailureAnalysis::of(FailureKind::GeneratorError, msg.clone()),
    }
}

fn aborted_verdict(function: String) -> UnitVerdict {
    UnitVerdict {
        function,
        attempts: vec![AttemptRecord {
            attempt: 1,
            candidate: None,
            execution: None,
            analysis: Some(FailureAnalysis::of(
                FailureKind::ExecutionError,
                "unit task panicked or was cancelled",
            )),
            input_tokens: 0,
            output_tokens: 0,
            started_at: Utc::now(),
        }],
        status: VerdictStatus::Failed,
        input_tokens: 0,
        output_tokens: 0,
    }
}
