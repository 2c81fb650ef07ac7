use std::collections::BTreeSet;

use tree_sitter::Node;

use super::filter::{is_constant_name, FRAMEWORK_NAMES};
use super::DependencyStrategy;
use crate::domain::Result;
use crate::syntax::{check, node_text};

/// Walks the syntax tree; fails on text that does not parse.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralStrategy;

impl DependencyStrategy for StructuralStrategy {
    fn name(&self) -> &'static str {
        "structural"
    }

    fn collect(&self, text: &str) -> Result<BTreeSet<String>> {
        let tree = check(text)?;
        let mut out = BTreeSet::new();
        let mut stack = vec![tree.root_node()];

        while let Some(node) = stack.pop() {
            match node.kind() {
                "call" => {
                    if let Some(root) = node.child_by_field_name("function").and_then(callee_root) {
                        out.insert(node_text(root, text).to_string());
                    }
                }
                "identifier" if !is_attribute_name(node) => {
                    let name = node_text(node, text);
                    if is_constant_name(name) || FRAMEWORK_NAMES.contains(&name) {
                        out.insert(name.to_string());
                    }
                }
                _ => {}
            }

            let mut cursor = node.walk();
            stack.extend(node.named_children(&mut cursor));
        }

        Ok(out)
    }
}

/// Root identifier of a callee: `f` for `f()`, `a` for `a.b.c()`.
fn callee_root(mut node: Node<'_>) -> Option<Node<'_>> {
    loop {
        node = match node.kind() {
            "identifier" => return Some(node),
            "attribute" => node.child_by_field_name("object")?,
            "call" => node.child_by_field_name("function")?,
            "subscript" => node.child_by_field_name("value")?,
            _ => return None,
        };
    }
}

/// The `b` in `a.b`, which names a member rather than a module-level binding.
fn is_attribute_name(node: Node<'_>) -> bool {
    node.parent().is_some_and(|parent| {
        parent.kind() == "attribute"
            && parent
                .child_by_field_name("attribute")
                .is_some_and(|attr| attr.id() == node.id())
    })
}
