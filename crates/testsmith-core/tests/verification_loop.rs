mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{completion, failed, passed, DelayedExecutor, ScriptedBackend, ScriptedExecutor};
use testsmith_core::{
    ExecutionResult, FailureKind, GenerateError, GeneratorAdapter, SynthError, Synthesizer,
    VerdictStatus, VerifyPolicy,
};
use testsmith_llm::{AnthropicClient, LlmConfig};

const PLAIN: &str = "def add(a, b):\n    return a + b\n";

const HANDLER: &str = r#"from flask import Blueprint, jsonify, request

items_bp = Blueprint("items", __name__)
ITEMS = {"1": "apple"}

@items_bp.route("/items/<item_id>")
def get_item(item_id):
    if item_id not in ITEMS:
        return jsonify({"error": "not found"}), 404
    return jsonify({"id": item_id, "name": ITEMS[item_id], "q": request.args.get("q")})
"#;

fn synthesizer(backend: &ScriptedBackend, executor: &ScriptedExecutor) -> Synthesizer {
    Synthesizer::new(
        Arc::new(GeneratorAdapter::new(backend.clone())),
        Arc::new(executor.clone()),
    )
}

#[tokio::test]
async fn plain_unit_passes_on_first_attempt_after_pytest_injection() {
    let backend = ScriptedBackend::new(vec![Ok(completion(
        "```python\ndef test_add():\n    assert add(2, 3) == 5\n```",
        120,
        40,
    ))]);
    let executor = ScriptedExecutor::new(|_, text| {
        assert!(text.starts_with("import pytest\nfrom module import add\n"));
        Ok(passed())
    });

    let verdicts = synthesizer(&backend, &executor)
        .synthesize_and_verify(PLAIN, 3)
        .await
        .expect("verdicts");

    assert_eq!(verdicts.len(), 1);
    let verdict = &verdicts[0];
    assert_eq!(verdict.function, "add");
    assert_eq!(verdict.status, VerdictStatus::Success);
    assert_eq!(verdict.attempts.len(), 1);
    assert!(verdict.attempts[0].succeeded());
    assert_eq!(verdict.input_tokens, 120);
    assert_eq!(verdict.output_tokens, 40);
    assert_eq!(executor.calls().len(), 1);
}

#[tokio::test]
async fn handler_unit_gets_fixture_prompt_and_injected_fixture() {
    let backend = ScriptedBackend::new(vec![Ok(completion(
        "import pytest\n\ndef test_get_item(client):\n    assert client.get('/items/1').status_code == 200\n",
        300,
        90,
    ))]);
    let executor = ScriptedExecutor::passing();

    let verdicts = synthesizer(&backend, &executor)
        .synthesize_and_verify(HANDLER, 3)
        .await
        .expect("verdicts");

    let prompts = backend.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("fixture named `client`"));
    assert!(prompts[0].contains("register every blueprint"));

    let verdict = &verdicts[0];
    assert_eq!(verdict.status, VerdictStatus::Success);
    let candidate = verdict.final_candidate().expect("candidate");
    assert!(candidate
        .text
        .contains("from module import ITEMS, get_item, items_bp, jsonify, request\n"));
    assert!(candidate.text.contains("def client(app):"));
    assert!(candidate.text.contains("register_blueprint"));
}

#[tokio::test]
async fn unavailable_generator_yields_single_failed_record() {
    let client = AnthropicClient::new(LlmConfig::default()).expect("client");
    let executor = ScriptedExecutor::passing();
    let synth = Synthesizer::new(Arc::new(GeneratorAdapter::new(client)), Arc::new(executor.clone()));

    let verdicts = synth.synthesize_and_verify(PLAIN, 3).await.expect("verdicts");

    let verdict = &verdicts[0];
    assert_eq!(verdict.status, VerdictStatus::Failed);
    assert_eq!(verdict.attempts.len(), 1);
    let record = &verdict.attempts[0];
    assert!(record.candidate.is_none());
    assert!(record.execution.is_none());
    assert_eq!(
        record.analysis.as_ref().map(|a| a.kind),
        Some(FailureKind::GeneratorUnavailable)
    );
    assert_eq!(verdict.input_tokens, 0);
    assert_eq!(verdict.output_tokens, 0);
    assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn never_terminating_candidate_times_out_and_is_regenerated() {
    let backend = ScriptedBackend::new(vec![
        Ok(completion(
            "import pytest\nfrom module import add\n\ndef test_add():\n    while True:\n        pass\n",
            100,
            30,
        )),
        Ok(completion(
            "import pytest\nfrom module import add\n\ndef test_add():\n    assert add(1, 1) == 2\n",
            180,
            35,
        )),
    ]);
    let executor = ScriptedExecutor::new(|call, _| {
        if call == 0 {
            Ok(ExecutionResult::timeout(String::new(), 10_000))
        } else {
            Ok(passed())
        }
    });

    let verdicts = synthesizer(&backend, &executor)
        .with_execution_timeout(Duration::from_secs(10))
        .synthesize_and_verify(PLAIN, 3)
        .await
        .expect("verdicts");

    let verdict = &verdicts[0];
    assert_eq!(verdict.status, VerdictStatus::Success);
    assert_eq!(verdict.attempts.len(), 2);
    let first = &verdict.attempts[0];
    assert!(first.execution.as_ref().is_some_and(|e| e.timed_out));
    assert_eq!(first.analysis.as_ref().map(|a| a.kind), Some(FailureKind::Timeout));
    assert_eq!(verdict.input_tokens, 280);
    assert_eq!(verdict.output_tokens, 65);

    let prompts = backend.prompts();
    assert!(prompts[1].contains("failed with Timeout"));
    assert!(prompts[1].contains("while True:"));
}

#[tokio::test]
async fn attempts_are_bounded_by_max_attempts() {
    let replies = (0..5)
        .map(|_| Ok(completion("def test_add():\n    assert add(1, 2) == 3\n", 10, 5)))
        .collect();
    let backend = ScriptedBackend::new(replies);
    let executor = ScriptedExecutor::new(|_, _| {
        Ok(failed("E   ModuleNotFoundError: No module named 'helpers'\n"))
    });

    let verdicts = synthesizer(&backend, &executor)
        .synthesize_and_verify(PLAIN, 2)
        .await
        .expect("verdicts");

    let verdict = &verdicts[0];
    assert_eq!(verdict.status, VerdictStatus::Failed);
    assert_eq!(verdict.attempts.len(), 2);
    assert_eq!(executor.calls().len(), 2);
    assert_eq!(backend.prompts().len(), 2);
    assert!(verdict
        .attempts
        .iter()
        .all(|a| a.analysis.as_ref().map(|x| x.kind) == Some(FailureKind::ImportError)));
    assert_eq!(
        verdict.attempts.iter().map(|a| a.attempt).collect::<Vec<_>>(),
        vec![1, 2]
    );
}

#[tokio::test]
async fn loop_stops_at_first_success() {
    let replies = (0..3)
        .map(|_| Ok(completion("def test_add():\n    assert add(1, 2) == 3\n", 10, 5)))
        .collect();
    let backend = ScriptedBackend::new(replies);
    let executor = ScriptedExecutor::new(|call, _| {
        if call == 0 {
            Ok(failed("E   NameError: name 'helper' is not defined\n"))
        } else {
            Ok(passed())
        }
    });

    let verdicts = synthesizer(&backend, &executor)
        .synthesize_and_verify(PLAIN, 3)
        .await
        .expect("verdicts");

    assert_eq!(verdicts[0].attempts.len(), 2);
    assert_eq!(verdicts[0].status, VerdictStatus::Success);
    assert_eq!(backend.prompts().len(), 2);
}

#[tokio::test]
async fn generator_errors_spend_an_attempt_and_retry() {
    let backend = ScriptedBackend::new(vec![
        Err(GenerateError::Backend("status 529: overloaded".to_string())),
        Ok(completion("def test_add():\n    assert add(1, 2) == 3\n", 10, 5)),
    ]);
    let executor = ScriptedExecutor::passing();

    let verdicts = synthesizer(&backend, &executor)
        .synthesize_and_verify(PLAIN, 3)
        .await
        .expect("verdicts");

    let verdict = &verdicts[0];
    assert_eq!(verdict.status, VerdictStatus::Success);
    assert_eq!(verdict.attempts.len(), 2);
    assert_eq!(
        verdict.attempts[0].analysis.as_ref().map(|a| a.kind),
        Some(FailureKind::GeneratorError)
    );
    // The retry is a first-attempt prompt again: there is no candidate to fix.
    assert!(!backend.prompts()[1].contains("failed with"));
}

#[tokio::test]
async fn assertion_regeneration_follows_policy() {
    let replies = (0..3)
        .map(|_| Ok(completion("def test_add():\n    assert add(1, 2) == 4\n", 10, 5)))
        .collect();
    let backend = ScriptedBackend::new(replies);
    let executor = ScriptedExecutor::new(|_, _| Ok(failed("E       assert 3 == 4\n")));

    let verdicts = synthesizer(&backend, &executor)
        .with_policy(VerifyPolicy {
            regenerate_on_assertion: false,
            ..VerifyPolicy::default()
        })
        .synthesize_and_verify(PLAIN, 3)
        .await
        .expect("verdicts");

    let verdict = &verdicts[0];
    assert_eq!(verdict.attempts.len(), 1);
    let analysis = verdict.last_analysis().expect("analysis");
    assert_eq!(analysis.kind, FailureKind::AssertionError);
    assert!(!analysis.needs_regeneration);
}

#[tokio::test]
async fn unparsable_candidate_is_rejected_without_running() {
    let backend = ScriptedBackend::new(vec![
        Ok(completion("def test_add(:\n    assert add(1, 2) == 3\n", 10, 5)),
        Ok(completion("def test_add():\n    assert add(1, 2) == 3\n", 10, 5)),
    ]);
    let executor = ScriptedExecutor::passing();

    let verdicts = synthesizer(&backend, &executor)
        .synthesize_and_verify(PLAIN, 3)
        .await
        .expect("verdicts");

    let verdict = &verdicts[0];
    assert_eq!(verdict.status, VerdictStatus::Success);
    let first = &verdict.attempts[0];
    assert_eq!(first.analysis.as_ref().map(|a| a.kind), Some(FailureKind::SyntaxError));
    let execution = first.execution.as_ref().expect("synthetic result");
    assert!(execution.exit_code.is_none());
    assert!(execution.output.starts_with("SyntaxError in generated test code"));
    assert_eq!(executor.calls().len(), 1);
}

#[tokio::test]
async fn reply_without_test_function_is_a_generation_error() {
    let backend = ScriptedBackend::new(vec![
        Ok(completion("I cannot write a test for this function.", 10, 5)),
        Ok(completion("def test_add():\n    assert add(1, 2) == 3\n", 10, 5)),
    ]);
    let executor = ScriptedExecutor::passing();

    let verdicts = synthesizer(&backend, &executor)
        .synthesize_and_verify(PLAIN, 3)
        .await
        .expect("verdicts");

    let verdict = &verdicts[0];
    assert_eq!(
        verdict.attempts[0].analysis.as_ref().map(|a| a.kind),
        Some(FailureKind::GenerationError)
    );
    assert!(verdict.attempts[0].execution.is_none());
    assert_eq!(verdict.input_tokens, 20);
    assert_eq!(executor.calls().len(), 1);
}

#[tokio::test]
async fn sandbox_failure_is_recorded_as_execution_error() {
    let backend = ScriptedBackend::new(vec![Ok(completion(
        "def test_add():\n    assert add(1, 2) == 3\n",
        10,
        5,
    ))]);
    let executor =
        ScriptedExecutor::new(|_, _| Err(SynthError::Sandbox("runner `pytest` not found".to_string())));

    let verdicts = synthesizer(&backend, &executor)
        .synthesize_and_verify(PLAIN, 1)
        .await
        .expect("verdicts");

    let record = &verdicts[0].attempts[0];
    assert!(record.execution.is_none());
    let analysis = record.analysis.as_ref().expect("analysis");
    assert_eq!(analysis.kind, FailureKind::ExecutionError);
    assert!(analysis.message.contains("pytest"));
}

#[tokio::test]
async fn parse_error_aborts_the_request() {
    let backend = ScriptedBackend::default();
    let executor = ScriptedExecutor::passing();

    let err = synthesizer(&backend, &executor)
        .synthesize_and_verify("def broken(:\n    pass\n", 3)
        .await
        .expect_err("parse error");

    assert!(matches!(err, SynthError::Parse { line: 1, .. }));
    assert!(err.is_request_level());
    assert!(backend.prompts().is_empty());
}

#[tokio::test]
async fn zero_max_attempts_is_rejected() {
    let err = synthesizer(&ScriptedBackend::default(), &ScriptedExecutor::passing())
        .synthesize_and_verify(PLAIN, 0)
        .await
        .expect_err("invalid");
    assert!(matches!(err, SynthError::InvalidConfig(_)));
}

#[tokio::test]
async fn source_without_functions_yields_no_verdicts() {
    let verdicts = synthesizer(&ScriptedBackend::default(), &ScriptedExecutor::passing())
        .synthesize_and_verify("VALUE = 1\n", 3)
        .await
        .expect("verdicts");
    assert!(verdicts.is_empty());
}

#[tokio::test(start_paused = true)]
async fn concurrent_units_keep_extraction_order() {
    let source = "def alpha_one():\n    return 1\n\ndef beta_two():\n    return 2\n\ndef gamma_three():\n    return 3\n";
    let replies = (0..3)
        .map(|_| Ok(completion("def test_it():\n    assert True\n", 1, 1)))
        .collect();
    let backend = ScriptedBackend::new(replies);
    // Earlier units run longest, so they finish last.
    let executor = DelayedExecutor::new(&[
        ("alpha_one", Duration::from_millis(300)),
        ("beta_two", Duration::from_millis(200)),
        ("gamma_three", Duration::from_millis(100)),
    ]);

    let synthesizer = Synthesizer::new(
        Arc::new(GeneratorAdapter::new(backend)),
        Arc::new(executor.clone()),
    )
    .with_policy(VerifyPolicy {
        max_concurrent_units: 3,
        ..VerifyPolicy::default()
    });
    let verdicts = synthesizer
        .synthesize_and_verify(source, 1)
        .await
        .expect("verdicts");

    assert_eq!(executor.finished(), vec!["gamma_three", "beta_two", "alpha_one"]);
    let names: Vec<&str> = verdicts.iter().map(|v| v.function.as_str()).collect();
    assert_eq!(names, vec!["alpha_one", "beta_two", "gamma_three"]);
    assert!(verdicts.iter().all(|v| v.is_success()));
}

#[tokio::test(start_paused = true)]
async fn dropped_request_aborts_in_flight_units() {
    let source = "def alpha_one():\n    return 1\n\ndef beta_two():\n    return 2\n";
    let replies = (0..2)
        .map(|_| Ok(completion("def test_it():\n    assert True\n", 1, 1)))
        .collect();
    let backend = ScriptedBackend::new(replies);
    let executor = DelayedExecutor::new(&[
        ("alpha_one", Duration::from_millis(300)),
        ("beta_two", Duration::from_millis(300)),
    ]);

    let synthesizer = Synthesizer::new(
        Arc::new(GeneratorAdapter::new(backend)),
        Arc::new(executor.clone()),
    )
    .with_policy(VerifyPolicy {
        max_concurrent_units: 2,
        ..VerifyPolicy::default()
    });
    let outcome = tokio::time::timeout(
        Duration::from_millis(50),
        synthesizer.synthesize_and_verify(source, 1),
    )
    .await;
    assert!(outcome.is_err(), "request should still be running");

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(executor.finished().is_empty(), "units kept running after drop");
}

#[tokio::test]
async fn redefined_functions_each_get_a_verdict() {
    let source = "def f():\n    return 1\n\ndef g():\n    return 2\n\ndef f():\n    return 3\n";
    let replies = (0..3)
        .map(|_| Ok(completion("def test_it():\n    assert True\n", 1, 1)))
        .collect();
    let backend = ScriptedBackend::new(replies);
    let executor = ScriptedExecutor::passing();

    let verdicts = synthesizer(&backend, &executor)
        .synthesize_and_verify(source, 1)
        .await
        .expect("verdicts");

    let names: Vec<&str> = verdicts.iter().map(|v| v.function.as_str()).collect();
    assert_eq!(names, vec!["f", "g", "f#2"]);
    assert_eq!(executor.calls().len(), 3);
}

#[tokio::test]
async fn synthesize_once_generates_without_executing() {
    let backend = ScriptedBackend::new(vec![Ok(completion(
        "def test_add():\n    assert add(2, 2) == 4\n",
        50,
        20,
    ))]);
    let executor = ScriptedExecutor::passing();

    let tests = synthesizer(&backend, &executor)
        .synthesize_once(PLAIN)
        .await
        .expect("tests");

    assert_eq!(tests.len(), 1);
    assert_eq!(tests[0].function, "add");
    assert_eq!(tests[0].function_code, "def add(a, b):\n    return a + b");
    assert_eq!(tests[0].input_tokens, 50);
    let candidate = tests[0].candidate.as_ref().expect("candidate");
    assert!(candidate.text.starts_with("import pytest\n"));
    assert!(tests[0].error.is_none());
    assert!(executor.calls().is_empty());
}
