//! Prompt construction for first attempts and regenerations.

use std::collections::BTreeSet;
use std::fmt::Write;

use crate::domain::{CandidateTest, DependencySet, FailureAnalysis, SourceUnit};
use crate::text::excerpt;

/// Longest runner output quoted back to the generator.
const MAX_FAILURE_CHARS: usize = 2000;

const HANDLER_REQUIREMENTS: &str = "This function is a web route handler. The test must:\n\
- create an isolated Flask application and register every blueprint defined in `module`\n\
- provide a reusable pytest fixture named `client` built from that application\n\
- mock every external dependency (HTTP calls, databases, files) with unittest.mock\n\
- cover a successful response and at least one error response\n";

/// Names the canonical import line should bring in.
pub fn import_names(
    unit: &SourceUnit,
    dependencies: &DependencySet,
    module_bindings: Option<&BTreeSet<String>>,
) -> Vec<String> {
    let mut names: BTreeSet<String> = dependencies
        .iter()
        .filter(|dep| module_bindings.map_or(true, |b| b.contains(*dep)))
        .map(str::to_string)
        .collect();
    names.insert(unit.name.clone());
    names.into_iter().collect()
}

/// Prompt for the first attempt at a unit.
pub fn first_attempt(
    unit: &SourceUnit,
    dependencies: &DependencySet,
    module_bindings: Option<&BTreeSet<String>>,
) -> String {
    let imports = import_names(unit, dependencies, module_bindings).join(", ");
    let mut prompt = String::new();

    prompt.push_str(
        "Given the following Python function, write a logical, non-trivial pytest test function for it. \
         Do not simply echo the function or use trivial asserts. \
         Include all necessary imports. ",
    );
    let _ = write!(
        prompt,
        "IMPORTANT: At the top of your test code, add 'from module import {imports}'. \
         Only call the function by its correct name ({}). \
         Only return the test code, nothing else.\n\n",
        unit.name
    );
    if unit.handler {
        prompt.push_str(HANDLER_REQUIREMENTS);
        prompt.push('\n');
    }
    prompt.push_str(&unit.text);
    prompt.push('\n');
    prompt
}

/// Prompt asking for a corrected version of a failed candidate.
pub fn regeneration(
    unit: &SourceUnit,
    dependencies: &DependencySet,
    module_bindings: Option<&BTreeSet<String>>,
    previous: &CandidateTest,
    failure: &FailureAnalysis,
) -> String {
    let imports = import_names(unit, dependencies, module_bindings).join(", ");
    let mut prompt = String::new();

    let _ = writeln!(
        prompt,
        "The pytest test below was written for the Python function `{}` and failed with {}.",
        unit.name, failure.kind
    );
    let _ = writeln!(
        prompt,
        "\nError message:\n{}",
        excerpt(failure.message.trim(), MAX_FAILURE_CHARS)
    );
    if !failure.suggested_fixes.is_empty() {
        prompt.push_str("\nSuggested fixes:\n");
        for fix in &failure.suggested_fixes {
            let _ = writeln!(prompt, "- {fix}");
        }
    }
    let _ = writeln!(prompt, "\nPrevious test:\n{}", previous.text.trim_end());
    let _ = writeln!(prompt, "\nFunction under test:\n{}\n", unit.text);
    if unit.handler {
        prompt.push_str(HANDLER_REQUIREMENTS);
        prompt.push('\n');
    }
    let _ = write!(
        prompt,
        "Write a corrected version of the test that resolves this {} failure. \
         Keep 'from module import {imports}' at the top. \
         Only call the function by its correct name. \
         Only return the test code, nothing else.\n",
        failure.kind
    );
    prompt
}
