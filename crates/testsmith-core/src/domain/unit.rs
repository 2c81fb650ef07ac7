//! Source units and their inferred dependencies.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use super::digest::sha256_hex;

/// One independently testable top-level function extracted from a source text.
///
/// Immutable once built by the extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceUnit {
    /// Function name as written; repeated when the module redefines it.
    pub name: String,
    /// 1-based count of definitions with this name up to and including this one.
    pub occurrence: usize,
    /// Canonical, re-parseable rendering of the definition (decorators included).
    pub text: String,
    /// The module the unit was extracted from.
    #[serde(skip)]
    pub source: Arc<str>,
    /// Whether the unit looks like a web route handler.
    pub handler: bool,
    /// `async def` rather than `def`.
    pub is_async: bool,
    /// 1-based first line of the definition in `source`.
    pub start_line: usize,
    /// 1-based last line of the definition in `source`.
    pub end_line: usize,
}

impl SourceUnit {
    /// Name unique within the source text: `f` for the first definition,
    /// `f#2` for the second and so on.
    pub fn id(&self) -> String {
        if self.occurrence <= 1 {
            self.name.clone()
        } else {
            format!("{}#{}", self.name, self.occurrence)
        }
    }

    /// SHA-256 of the canonical text.
    pub fn digest(&self) -> String {
        sha256_hex(self.text.as_bytes())
    }
}

/// External names a unit references.
///
/// Always contains the unit's own name once built by the inferencer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DependencySet(BTreeSet<String>);

impl DependencySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        self.0.insert(name.into())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Names in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl FromIterator<String> for DependencySet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        DependencySet(iter.into_iter().collect())
    }
}

impl Extend<String> for DependencySet {
    fn extend<I: IntoIterator<Item = String>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}
