//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use testsmith_core::{CompletionBackend, ExecutionResult, GenerateError, Result, TestExecutor};
use testsmith_llm::Completion;

pub fn completion(text: &str, input_tokens: u64, output_tokens: u64) -> Completion {
    Completion {
        text: text.to_string(),
        input_tokens,
        output_tokens,
        model: None,
        stop_reason: None,
    }
}

/// Backend replaying a fixed list of replies and recording prompts.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    replies: Arc<Mutex<VecDeque<std::result::Result<Completion, GenerateError>>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<std::result::Result<Completion, GenerateError>>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into())),
            prompts: Arc::default(),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("lock").clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, prompt: &str) -> std::result::Result<Completion, GenerateError> {
        self.prompts.lock().expect("lock").push(prompt.to_string());
        self.replies
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| Err(GenerateError::Backend("script exhausted".to_string())))
    }
}

type Respond = dyn Fn(usize, &str) -> Result<ExecutionResult> + Send + Sync;

/// Executor answering from a closure of (call index, test text).
#[derive(Clone)]
pub struct ScriptedExecutor {
    respond: Arc<Respond>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedExecutor {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(usize, &str) -> Result<ExecutionResult> + Send + Sync + 'static,
    {
        Self {
            respond: Arc::new(respond),
            calls: Arc::default(),
        }
    }

    /// Every run passes.
    pub fn passing() -> Self {
        Self::new(|_, _| Ok(passed()))
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("lock").clone()
    }
}

#[async_trait]
impl TestExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        _module_text: &str,
        test_text: &str,
        _timeout: Duration,
    ) -> Result<ExecutionResult> {
        let index = {
            let mut calls = self.calls.lock().expect("lock");
            calls.push(test_text.to_string());
            calls.len() - 1
        };
        (self.respond)(index, test_text)
    }
}

pub fn passed() -> ExecutionResult {
    ExecutionResult {
        exit_code: Some(0),
        output: "test_module.py::test_x PASSED\n==== 1 passed in 0.01s ====\n".to_string(),
        timed_out: false,
        duration_ms: 12,
    }
}

pub fn failed(output: &str) -> ExecutionResult {
    ExecutionResult {
        exit_code: Some(1),
        output: output.to_string(),
        timed_out: false,
        duration_ms: 15,
    }
}

/// Executor that passes every run after a per-test delay, recording the
/// order in which runs finish.
#[derive(Clone)]
pub struct DelayedExecutor {
    delays: Arc<Vec<(String, Duration)>>,
    finished: Arc<Mutex<Vec<String>>>,
}

impl DelayedExecutor {
    /// `delays` pairs a marker found in the test text with its delay.
    pub fn new(delays: &[(&str, Duration)]) -> Self {
        Self {
            delays: Arc::new(delays.iter().map(|(m, d)| (m.to_string(), *d)).collect()),
            finished: Arc::default(),
        }
    }

    pub fn finished(&self) -> Vec<String> {
        self.finished.lock().expect("lock").clone()
    }
}

#[async_trait]
impl TestExecutor for DelayedExecutor {
    async fn execute(
        &self,
        _module_text: &str,
        test_text: &str,
        _timeout: Duration,
    ) -> Result<ExecutionResult> {
        let (marker, delay) = self
            .delays
            .iter()
            .find(|(marker, _)| test_text.contains(marker.as_str()))
            .cloned()
            .unwrap_or_else(|| (String::new(), Duration::ZERO));
        tokio::time::sleep(delay).await;
        self.finished.lock().expect("lock").push(marker);
        Ok(passed())
    }
}
