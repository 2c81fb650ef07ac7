//! Post-processing of generated test code.
//!
//! A [`RewritePipeline`] is an ordered list of named rules. Every rule is a
//! pure `text -> text` function and applying the pipeline twice yields the
//! same text as applying it once.

use std::collections::{BTreeSet, HashSet};
use std::sync::OnceLock;

use regex::{Captures, Regex};
use tracing::debug;

use crate::domain::DependencySet;
use crate::text::cached_regex;

/// Module name the sandbox materializes the source as.
pub const MODULE_NAME: &str = "module";

/// Names models commonly invent for the module under test.
pub const PLACEHOLDER_MODULES: &[&str] = &[
    "your_module",
    "my_module",
    "mymodule",
    "module_under_test",
    "source_module",
    "solution",
    "your_code",
    "code_under_test",
];

const MOCK_NAMES: &[&str] = &["patch", "Mock", "MagicMock", "mock_open", "AsyncMock"];

/// Flask application and client fixtures for route handlers.
///
/// Reuses the module's own `app` when it is a Flask instance, otherwise
/// builds an isolated application with every blueprint the module defines.
pub const DEFAULT_FIXTURE: &str = r#"@pytest.fixture
def app():
    import flask
    import module as _unit_module

    candidate = getattr(_unit_module, "app", None)
    if isinstance(candidate, flask.Flask):
        application = candidate
    else:
        application = flask.Flask(__name__)
        for value in vars(_unit_module).values():
            if isinstance(value, flask.Blueprint):
                application.register_blueprint(value)
    application.config.update(TESTING=True)
    return application


@pytest.fixture
def client(app):
    return app.test_client()"#;

/// What the rules know about the unit a candidate was generated for.
#[derive(Debug, Clone, Copy)]
pub struct RewriteContext<'a> {
    pub unit_name: &'a str,
    pub dependencies: &'a DependencySet,
    /// Names the parent module binds at top level, when known.
    pub module_bindings: Option<&'a BTreeSet<String>>,
    pub handler: bool,
}

/// A named, idempotent text transformation.
#[derive(Clone, Copy)]
pub struct RewriteRule {
    pub name: &'static str,
    pub apply: fn(&str, &RewriteContext<'_>) -> String,
}

impl std::fmt::Debug for RewriteRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewriteRule").field("name", &self.name).finish()
    }
}

/// Ordered rule list applied to every generated candidate.
#[derive(Debug, Clone)]
pub struct RewritePipeline {
    rules: Vec<RewriteRule>,
}

impl Default for RewritePipeline {
    fn default() -> Self {
        Self {
            rules: vec![
                RewriteRule {
                    name: "strip_code_fences",
                    apply: strip_code_fences,
                },
                RewriteRule {
                    name: "canonicalize_module_alias",
                    apply: canonicalize_module_alias,
                },
                RewriteRule {
                    name: "strip_foreign_imports",
                    apply: strip_foreign_imports,
                },
                RewriteRule {
                    name: "ensure_pytest_import",
                    apply: ensure_pytest_import,
                },
                RewriteRule {
                    name: "ensure_mock_import",
                    apply: ensure_mock_import,
                },
                RewriteRule {
                    name: "merge_unit_imports",
                    apply: merge_unit_imports,
                },
                RewriteRule {
                    name: "inject_default_fixture",
                    apply: inject_default_fixture,
                },
                RewriteRule {
                    name: "normalize_trailing_newline",
                    apply: normalize_trailing_newline,
                },
            ],
        }
    }
}

impl RewritePipeline {
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name).collect()
    }

    pub fn apply(&self, text: &str, ctx: &RewriteContext<'_>) -> String {
        let mut current = text.to_string();
        for rule in &self.rules {
            let next = (rule.apply)(&current, ctx);
            if next != current {
                debug!(rule = rule.name, function = %ctx.unit_name, "rewrite applied");
            }
            current = next;
        }
        current
    }
}

/// Whether `text` defines at least one pytest test function.
pub fn has_test_function(text: &str) -> bool {
    static TEST_DEF: OnceLock<Regex> = OnceLock::new();
    cached_regex(&TEST_DEF, r"(?m)^\s*(?:async\s+)?def\s+test\w*\s*\(").is_match(text)
}

/// Drop Markdown fence lines and surrounding prose, then trim.
///
/// With two or more fences only the fenced content survives; a single stray
/// fence is simply removed.
pub fn strip_code_fences(text: &str, _ctx: &RewriteContext<'_>) -> String {
    let is_fence = |line: &str| line.trim_start().starts_with("```");
    let fences = text.lines().filter(|l| is_fence(*l)).count();

    let kept: Vec<&str> = if fences >= 2 {
        let mut inside = false;
        let mut out = Vec::new();
        for line in text.lines() {
            if is_fence(line) {
                inside = !inside;
                continue;
            }
            if inside {
                out.push(line);
            }
        }
        out
    } else {
        text.lines().filter(|l| !is_fence(*l)).collect()
    };

    kept.join("\n").trim().to_string()
}

/// Rewrite placeholder module names to `module`.
pub fn canonicalize_module_alias(text: &str, _ctx: &RewriteContext<'_>) -> String {
    static IMPORT: OnceLock<Regex> = OnceLock::new();
    static WORD: OnceLock<Regex> = OnceLock::new();
    static TARGET: OnceLock<Regex> = OnceLock::new();

    let alternation = PLACEHOLDER_MODULES.join("|");
    let import = cached_regex(
        &IMPORT,
        &format!(r"(?m)^\s*(?:from|import)\s+({alternation})\b"),
    );
    let imported: HashSet<String> = import
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect();

    let mut out = text.to_string();
    if !imported.is_empty() {
        let word = cached_regex(&WORD, &format!(r"(?m)(^|[^\w.])({alternation})\b"));
        out = word
            .replace_all(&out, |caps: &Captures<'_>| {
                if imported.contains(&caps[2]) {
                    format!("{}{MODULE_NAME}", &caps[1])
                } else {
                    caps[0].to_string()
                }
            })
            .into_owned();
    }

    // Patch targets such as "your_module.requests.get".
    let target = cached_regex(&TARGET, &format!(r#"(["'])(?:{alternation})\."#));
    target
        .replace_all(&out, format!("${{1}}{MODULE_NAME}."))
        .into_owned()
}

/// Drop top-level relative imports and exact duplicate import lines.
pub fn strip_foreign_imports(text: &str, _ctx: &RewriteContext<'_>) -> String {
    static RELATIVE: OnceLock<Regex> = OnceLock::new();
    let relative = cached_regex(&RELATIVE, r"^from\s+\.");

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut skipping = false;

    for line in text.split('\n') {
        if skipping {
            skipping = !line.contains(')');
            continue;
        }
        if relative.is_match(line) {
            skipping = line.contains('(') && !line.contains(')');
            continue;
        }
        let trimmed = line.trim_end();
        if is_top_level_import(line)
            && !trimmed.ends_with('(')
            && !trimmed.ends_with('\\')
            && !seen.insert(trimmed.to_string())
        {
            continue;
        }
        out.push(line);
    }

    out.join("\n")
}

/// Insert `import pytest` when no such line exists.
pub fn ensure_pytest_import(text: &str, _ctx: &RewriteContext<'_>) -> String {
    let mut lines = split_lines(text);
    if pytest_line(&lines).is_some() {
        return text.to_string();
    }
    let after_future = lines
        .iter()
        .rposition(|l| l.starts_with("from __future__"))
        .map_or(0, |i| i + 1);
    let at = after_future.max(leading_docstring_end(&lines));
    lines.insert(at, "import pytest".to_string());
    lines.join("\n")
}

/// Import mock helpers that are used but not imported.
pub fn ensure_mock_import(text: &str, _ctx: &RewriteContext<'_>) -> String {
    static USED: OnceLock<Regex> = OnceLock::new();
    static MOCK_MODULE_USED: OnceLock<Regex> = OnceLock::new();
    static MOCK_MODULE_BOUND: OnceLock<Regex> = OnceLock::new();

    let used_re = cached_regex(
        &USED,
        &format!(r"(?m)(?:^|[^\w.])({})\b", MOCK_NAMES.join("|")),
    );
    let used: BTreeSet<String> = used_re
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect();

    let mut lines = split_lines(text);
    let statements = import_statements(&lines, &["unittest.mock", "mock"]);
    let imported: BTreeSet<String> = statements
        .iter()
        .flat_map(|s| s.names.iter().map(|n| bound_name(n).to_string()))
        .collect();
    let missing: BTreeSet<String> = used.difference(&imported).cloned().collect();

    let module_used =
        cached_regex(&MOCK_MODULE_USED, r"(?m)(?:^|[^\w.])mock\.").is_match(text);
    let module_bound = cached_regex(
        &MOCK_MODULE_BOUND,
        r"(?m)^\s*(?:from\s+unittest\s+import\s+[^\n]*\bmock\b|import\s+mock\b|import\s+unittest\.mock\s+as\s+mock\b)",
    )
    .is_match(text);

    if missing.is_empty() && (!module_used || module_bound) {
        return text.to_string();
    }

    let after_pytest = pytest_line(&lines).map_or(0, |i| i + 1);

    if !missing.is_empty() {
        match statements.iter().find(|s| s.module == "unittest.mock") {
            Some(existing) => {
                let mut names: BTreeSet<String> = existing.names.iter().cloned().collect();
                names.extend(missing);
                let merged = format!("from unittest.mock import {}", join_names(&names));
                lines.drain(existing.start..=existing.end);
                lines.insert(existing.start, merged);
            }
            None => {
                lines.insert(
                    after_pytest,
                    format!("from unittest.mock import {}", join_names(&missing)),
                );
            }
        }
    }

    if module_used && !module_bound {
        let at = pytest_line(&lines).map_or(0, |i| i + 1);
        lines.insert(at, "from unittest import mock".to_string());
    }

    lines.join("\n")
}

/// Collapse every `from module import ...` into one sorted line after
/// `import pytest`, merged with the unit's dependencies.
pub fn merge_unit_imports(text: &str, ctx: &RewriteContext<'_>) -> String {
    let mut lines = split_lines(text);
    let statements = import_statements(&lines, &[MODULE_NAME]);

    let mut names: BTreeSet<String> = BTreeSet::new();
    let mut star = false;
    for statement in &statements {
        for name in &statement.names {
            if name == "*" {
                star = true;
            } else {
                names.insert(name.clone());
            }
        }
    }

    names.extend(
        ctx.dependencies
            .iter()
            .filter(|dep| ctx.module_bindings.map_or(true, |b| b.contains(*dep)))
            .map(str::to_string),
    );
    names.insert(ctx.unit_name.to_string());

    for statement in statements.iter().rev() {
        lines.drain(statement.start..=statement.end);
    }

    let at = pytest_line(&lines).map_or(0, |i| i + 1);
    let mut merged = vec![format!("from {MODULE_NAME} import {}", join_names(&names))];
    if star {
        merged.push(format!("from {MODULE_NAME} import *"));
    }
    let tail = lines.split_off(at);
    lines.extend(merged);
    lines.extend(tail);
    lines.join("\n")
}

/// Add the default Flask fixtures to handler candidates lacking a `client`.
pub fn inject_default_fixture(text: &str, ctx: &RewriteContext<'_>) -> String {
    static CLIENT_DEF: OnceLock<Regex> = OnceLock::new();
    if !ctx.handler || cached_regex(&CLIENT_DEF, r"(?m)^\s*def\s+client\s*\(").is_match(text) {
        return text.to_string();
    }

    let mut lines = split_lines(text);
    let after_imports = import_statements(&lines, &[MODULE_NAME])
        .iter()
        .map(|s| s.end + 1)
        .chain(pytest_line(&lines).map(|i| i + 1))
        .max()
        .unwrap_or(0);
    let at = leading_import_block_end(&lines).max(after_imports);

    let mut block = Vec::new();
    if at > 0 {
        block.push(String::new());
        block.push(String::new());
    }
    block.extend(DEFAULT_FIXTURE.lines().map(str::to_string));
    if lines.get(at).is_some_and(|l| !l.trim().is_empty()) {
        block.push(String::new());
        block.push(String::new());
    }
    let tail = lines.split_off(at);
    lines.extend(block);
    lines.extend(tail);
    lines.join("\n")
}

/// Exactly one trailing newline; empty text stays empty.
pub fn normalize_trailing_newline(text: &str, _ctx: &RewriteContext<'_>) -> String {
    let trimmed = text.trim_end();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}\n")
    }
}

/// A top-level `from <module> import ...` statement spanning `start..=end`.
#[derive(Debug)]
struct ImportStatement {
    module: String,
    start: usize,
    end: usize,
    names: Vec<String>,
}

fn import_statements(lines: &[String], modules: &[&str]) -> Vec<ImportStatement> {
    static FROM: OnceLock<Regex> = OnceLock::new();
    let from = cached_regex(&FROM, r"^from\s+([\w.]+)\s+import\s+(.*)$");

    let mut out = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let Some(caps) = from.captures(&lines[i]) else {
            i += 1;
            continue;
        };
        let module = caps[1].to_string();
        let mut body = caps[2].to_string();
        let start = i;

        let open_paren = body.contains('(') && !body.contains(')');
        if open_paren {
            while i + 1 < lines.len() && !lines[i].contains(')') {
                i += 1;
                body.push(',');
                body.push_str(&lines[i]);
            }
        } else {
            while lines[i].trim_end().ends_with('\\') && i + 1 < lines.len() {
                i += 1;
                body.push(',');
                body.push_str(&lines[i]);
            }
        }

        if modules.contains(&module.as_str()) {
            out.push(ImportStatement {
                module,
                start,
                end: i,
                names: parse_names(&body),
            });
        }
        i += 1;
    }
    out
}

fn parse_names(body: &str) -> Vec<String> {
    body.split(',')
        .map(|part| part.split('#').next().unwrap_or_default())
        .map(|part| part.replace(['(', ')', '\\'], " "))
        .map(|part| part.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|part| !part.is_empty())
        .collect()
}

/// `b` for `a as b`, else the name itself.
fn bound_name(name: &str) -> &str {
    name.rsplit(" as ").next().unwrap_or(name).trim()
}

fn join_names(names: &BTreeSet<String>) -> String {
    names.iter().cloned().collect::<Vec<_>>().join(", ")
}

fn split_lines(text: &str) -> Vec<String> {
    text.split('\n').map(str::to_string).collect()
}

fn pytest_line(lines: &[String]) -> Option<usize> {
    lines.iter().position(|l| l.trim_end() == "import pytest")
}

fn is_top_level_import(line: &str) -> bool {
    line.starts_with("import ") || line.starts_with("from ")
}

/// Index just past a module docstring opening the text, else 0.
fn leading_docstring_end(lines: &[String]) -> usize {
    let Some(first) = lines.iter().position(|l| {
        let t = l.trim();
        !t.is_empty() && !t.starts_with('#')
    }) else {
        return 0;
    };
    let body = lines[first]
        .trim()
        .trim_start_matches(['r', 'R', 'u', 'U']);

    for quote in ["\"\"\"", "'''"] {
        if let Some(rest) = body.strip_prefix(quote) {
            if rest.contains(quote) {
                return first + 1;
            }
            // An unterminated docstring is left for the syntax check.
            return lines[first + 1..]
                .iter()
                .position(|l| l.contains(quote))
                .map_or(0, |i| first + i + 2);
        }
    }
    if body.len() > 1
        && ['"', '\''].iter().any(|q| body.starts_with(*q) && body.ends_with(*q))
    {
        return first + 1;
    }
    0
}

/// Index just past the last line of the import block that follows any
/// module docstring.
fn leading_import_block_end(lines: &[String]) -> usize {
    let start = leading_docstring_end(lines);
    let mut end = start;
    let mut in_parens = false;
    for (i, line) in lines.iter().enumerate().skip(start) {
        let trimmed = line.trim();
        if in_parens {
            in_parens = !trimmed.contains(')');
            end = i + 1;
            continue;
        }
        if is_top_level_import(line) {
            in_parens = trimmed.contains('(') && !trimmed.contains(')');
            end = i + 1;
        } else if !(trimmed.is_empty() || trimmed.starts_with('#')) {
            break;
        }
    }
    end
}
