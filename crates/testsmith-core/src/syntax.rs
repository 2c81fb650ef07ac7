//! Python parsing on top of tree-sitter.
//!
//! Parsers are costly to build and not `Sync`, so each thread keeps one.

use std::cell::RefCell;

use tree_sitter::{Node, Parser, Tree};

use crate::domain::{Result, SynthError};
use crate::text::excerpt;

thread_local! {
    static PYTHON_PARSER: RefCell<std::result::Result<Parser, String>> =
        RefCell::new(python_parser());
}

fn python_parser() -> std::result::Result<Parser, String> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| format!("python grammar rejected: {e}"))?;
    Ok(parser)
}

/// Parse `source` without judging it; the tree may contain error nodes.
pub fn parse(source: &str) -> Result<Tree> {
    PYTHON_PARSER.with(|cell| {
        let mut slot = cell.borrow_mut();
        let parser = slot
            .as_mut()
            .map_err(|e| SynthError::Language(e.clone()))?;
        parser
            .parse(source, None)
            .ok_or_else(|| SynthError::Language("python parser produced no tree".to_string()))
    })
}

/// Parse `source` and fail with the position of the first syntax error.
pub fn check(source: &str) -> Result<Tree> {
    let tree = parse(source)?;
    if let Some(node) = first_error(tree.root_node()) {
        let pos = node.start_position();
        let message = if node.is_missing() {
            format!("missing `{}`", node.kind())
        } else {
            let snippet = node.utf8_text(source.as_bytes()).unwrap_or_default();
            let line = snippet.lines().next().unwrap_or_default().trim();
            if line.is_empty() {
                "invalid syntax".to_string()
            } else {
                format!("invalid syntax near `{}`", excerpt(line, 40))
            }
        };
        return Err(SynthError::Parse {
            line: pos.row + 1,
            column: pos.column + 1,
            message,
        });
    }
    if let Some((node, keyword)) = first_legacy_statement(tree.root_node(), source) {
        let pos = node.start_position();
        return Err(SynthError::Parse {
            line: pos.row + 1,
            column: pos.column + 1,
            message: format!("Missing parentheses in call to '{keyword}'"),
        });
    }
    Ok(tree)
}

/// Whether `source` parses without errors.
pub fn is_valid(source: &str) -> bool {
    check(source).is_ok()
}

/// Depth-first search for the earliest error or missing node.
pub(crate) fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .find_map(first_error)
        .or(Some(node))
}

/// Python 2 `print x` / `exec "code"` statements.
///
/// The grammar still accepts them but Python 3 does not. `print (x)` is a
/// call with a space and `print >> f, x` a shift expression, so both stay valid.
fn first_legacy_statement<'t>(node: Node<'t>, source: &str) -> Option<(Node<'t>, &'static str)> {
    match node.kind() {
        "exec_statement" => return Some((node, "exec")),
        "print_statement" if !is_python3_print(node, source) => return Some((node, "print")),
        _ => {}
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'t>> = node.named_children(&mut cursor).collect();
    children
        .into_iter()
        .find_map(|child| first_legacy_statement(child, source))
}

fn is_python3_print(node: Node<'_>, source: &str) -> bool {
    let mut cursor = node.walk();
    if node.named_children(&mut cursor).any(|c| c.kind() == "chevron") {
        return true;
    }
    let args = node_text(node, source)
        .strip_prefix("print")
        .unwrap_or_default()
        .trim();
    node.named_child_count() == 1 && args.starts_with('(') && args.ends_with(')')
}

/// Source text covered by `node`.
pub(crate) fn node_text<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    source.get(node.byte_range()).unwrap_or_default()
}
