//! Unit extraction: top-level functions and module bindings.

use std::collections::{BTreeSet, HashMap};
use std::ops::Range;
use std::sync::Arc;

use tracing::debug;
use tree_sitter::Node;

use crate::domain::{Result, SourceUnit};
use crate::handler::is_handler_style;
use crate::syntax::{check, node_text};
use crate::text::{normalize_newlines, trim_line_ends_outside};

/// Units plus the names bound at module top level.
#[derive(Debug, Clone)]
pub struct ExtractedModule {
    /// Normalized module text the units were cut from.
    pub source: Arc<str>,
    /// Top-level functions in source order.
    pub units: Vec<SourceUnit>,
    /// Function and class names, assignment targets and import bindings.
    pub bindings: BTreeSet<String>,
}

impl ExtractedModule {
    pub fn binds(&self, name: &str) -> bool {
        self.bindings.contains(name)
    }
}

/// Extract the top-level functions of `source` in source order.
///
/// Fails with a parse error when `source` is not valid Python.
pub fn extract_units(source: &str) -> Result<Vec<SourceUnit>> {
    Ok(extract_module(source)?.units)
}

/// Extract units and top-level bindings of `source`.
///
/// Every definition becomes a unit, redefinitions included; see
/// [`SourceUnit::id`] for telling them apart.
pub fn extract_module(source: &str) -> Result<ExtractedModule> {
    let normalized = normalize_newlines(source);
    let tree = check(&normalized)?;
    let shared: Arc<str> = Arc::from(normalized.as_str());
    let root = tree.root_node();

    let mut units: Vec<SourceUnit> = Vec::new();
    let mut bindings = BTreeSet::new();
    let mut seen: HashMap<String, usize> = HashMap::new();

    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        collect_bindings(child, &normalized, &mut bindings);

        let Some(def) = function_definition(child) else {
            continue;
        };
        let Some(name_node) = def.child_by_field_name("name") else {
            continue;
        };
        let name = node_text(name_node, &normalized).to_string();
        let mut strings = Vec::new();
        multiline_strings(child, child.start_byte(), &mut strings);
        let text = trim_line_ends_outside(node_text(child, &normalized), &strings);

        let occurrence = seen.entry(name.clone()).or_insert(0);
        *occurrence += 1;
        if *occurrence > 1 {
            debug!(function = %name, occurrence = *occurrence, "function redefined");
        }

        units.push(SourceUnit {
            handler: is_handler_style(&text),
            is_async: is_async(def),
            start_line: child.start_position().row + 1,
            end_line: child.end_position().row + 1,
            occurrence: *occurrence,
            name,
            text,
            source: Arc::clone(&shared),
        });
    }

    debug!(
        units = units.len(),
        bindings = bindings.len(),
        "module extracted"
    );

    Ok(ExtractedModule {
        source: shared,
        units,
        bindings,
    })
}

/// The function definition at `node`, looking through decorators.
fn function_definition(node: Node<'_>) -> Option<Node<'_>> {
    match node.kind() {
        "function_definition" => Some(node),
        "decorated_definition" => node
            .child_by_field_name("definition")
            .filter(|d| d.kind() == "function_definition"),
        _ => None,
    }
}

/// Byte ranges, relative to `base`, of string literals spanning several lines.
fn multiline_strings(node: Node<'_>, base: usize, out: &mut Vec<Range<usize>>) {
    if node.kind() == "string" && node.start_position().row != node.end_position().row {
        out.push(node.start_byte() - base..node.end_byte() - base);
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        multiline_strings(child, base, out);
    }
}

fn is_async(def: Node<'_>) -> bool {
    def.child(0).is_some_and(|c| c.kind() == "async")
}

fn collect_bindings(node: Node<'_>, source: &str, out: &mut BTreeSet<String>) {
    match node.kind() {
        "function_definition" | "class_definition" => {
            if let Some(name) = node.child_by_field_name("name") {
                out.insert(node_text(name, source).to_string());
            }
        }
        "decorated_definition" => {
            if let Some(def) = node.child_by_field_name("definition") {
                collect_bindings(def, source, out);
            }
        }
        "expression_statement" => {
            let mut cursor = node.walk();
            for expr in node.named_children(&mut cursor) {
                collect_assignment(expr, source, out);
            }
        }
        "import_statement" => {
            let mut cursor = node.walk();
            for name in node.children_by_field_name("name", &mut cursor) {
                match name.kind() {
                    "aliased_import" => insert_alias(name, source, out),
                    // `import a.b` binds `a`
                    _ => {
                        if let Some(root) = node_text(name, source).split('.').next() {
                            out.insert(root.trim().to_string());
                        }
                    }
                }
            }
        }
        "import_from_statement" => {
            let mut cursor = node.walk();
            for name in node.children_by_field_name("name", &mut cursor) {
                match name.kind() {
                    "aliased_import" => insert_alias(name, source, out),
                    _ => {
                        out.insert(node_text(name, source).trim().to_string());
                    }
                }
            }
        }
        // Conditional definitions such as `try: import x except ImportError: x = None`.
        "if_statement" | "try_statement" | "with_statement" | "block" | "else_clause"
        | "elif_clause" | "except_clause" | "finally_clause" => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                collect_bindings(child, source, out);
            }
        }
        _ => {}
    }
}

fn insert_alias(node: Node<'_>, source: &str, out: &mut BTreeSet<String>) {
    if let Some(alias) = node.child_by_field_name("alias") {
        out.insert(node_text(alias, source).to_string());
    }
}

fn collect_assignment(expr: Node<'_>, source: &str, out: &mut BTreeSet<String>) {
    if expr.kind() != "assignment" {
        return;
    }
    if let Some(left) = expr.child_by_field_name("left") {
        collect_targets(left, source, out);
    }
    // Chained `a = b = 1`
    if let Some(right) = expr.child_by_field_name("right") {
        collect_assignment(right, source, out);
    }
}

fn collect_targets(target: Node<'_>, source: &str, out: &mut BTreeSet<String>) {
    match target.kind() {
        "identifier" => {
            out.insert(node_text(target, source).to_string());
        }
        "pattern_list" | "tuple_pattern" | "list_pattern" | "parenthesized_expression" => {
            let mut cursor = target.walk();
            for child in target.named_children(&mut cursor) {
                collect_targets(child, source, out);
            }
        }
        _ => {}
    }
}
