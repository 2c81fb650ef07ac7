//! Dependency inference: which external names a unit references.
//!
//! Two strategies implement [`DependencyStrategy`]. The structural one walks
//! the syntax tree and is authoritative; the pattern one scans raw text and
//! only runs when the structural one fails.

pub mod filter;
pub mod pattern;
pub mod structural;

use std::collections::BTreeSet;

use tracing::warn;

pub use pattern::PatternStrategy;
pub use structural::StructuralStrategy;

use crate::domain::{DependencySet, Result, SourceUnit};

/// One way of collecting candidate names from a unit's text.
///
/// Candidates are unfiltered; the inferencer applies the deny/allow lists.
pub trait DependencyStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn collect(&self, text: &str) -> Result<BTreeSet<String>>;
}

/// Primary strategy with an explicit, logged fallback.
pub struct DependencyInferencer {
    primary: Box<dyn DependencyStrategy>,
    fallback: Box<dyn DependencyStrategy>,
}

impl Default for DependencyInferencer {
    fn default() -> Self {
        Self::new(Box::new(StructuralStrategy), Box::new(PatternStrategy))
    }
}

impl DependencyInferencer {
    pub fn new(primary: Box<dyn DependencyStrategy>, fallback: Box<dyn DependencyStrategy>) -> Self {
        Self { primary, fallback }
    }

    pub fn infer(&self, unit: &SourceUnit) -> DependencySet {
        self.infer_text(&unit.name, &unit.text)
    }

    /// Dependencies of `text`, always including `own_name`.
    pub fn infer_text(&self, own_name: &str, text: &str) -> DependencySet {
        let candidates = match self.primary.collect(text) {
            Ok(names) => names,
            Err(err) => {
                warn!(
                    event = "deps.fallback",
                    function = %own_name,
                    primary = self.primary.name(),
                    fallback = self.fallback.name(),
                    error = %err,
                    "structural dependency inference failed, using fallback"
                );
                self.fallback.collect(text).unwrap_or_default()
            }
        };

        let mut set: DependencySet = candidates
            .into_iter()
            .filter(|name| filter::keep(name))
            .collect();
        set.insert(own_name);
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SynthError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Failing;

    impl DependencyStrategy for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn collect(&self, _text: &str) -> Result<BTreeSet<String>> {
            Err(SynthError::Language("boom".to_string()))
        }
    }

    struct Counting(Arc<AtomicUsize>);

    impl DependencyStrategy for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn collect(&self, _text: &str) -> Result<BTreeSet<String>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(["MAGIC_NUMBER".to_string(), "print".to_string()].into())
        }
    }

    #[test]
    fn test_own_name_always_present() {
        let deps = DependencyInferencer::default().infer_text("add", "def add(a, b):\n    return a + b\n");
        assert!(deps.contains("add"));
        assert_eq!(deps.len(), 1);
    }

    #[test]
    fn test_filtering_applies() {
        let text = "def total(items):\n    print(items)\n    return sum_prices(items) * TAX_RATE\n";
        let deps = DependencyInferencer::default().infer_text("total", text);
        assert!(deps.contains("sum_prices"));
        assert!(deps.contains("TAX_RATE"));
        assert!(!deps.contains("print"));
        assert!(!deps.contains("sum"));
    }

    #[test]
    fn test_fallback_used_only_on_primary_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let ok = DependencyInferencer::new(
            Box::new(StructuralStrategy),
            Box::new(Counting(Arc::clone(&calls))),
        );
        ok.infer_text("f", "def f():\n    return 1\n");
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let failing = DependencyInferencer::new(Box::new(Failing), Box::new(Counting(Arc::clone(&calls))));
        let deps = failing.infer_text("f", "def f():\n    return 1\n");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(deps.contains("MAGIC_NUMBER"));
        assert!(!deps.contains("print"));
        assert!(deps.contains("f"));
    }

    #[test]
    fn test_broken_text_still_yields_dependencies() {
        let deps = DependencyInferencer::default()
            .infer_text("handler", "def handler(:\n    return jsonify(BASE_URL)\n");
        assert!(deps.contains("jsonify"));
        assert!(deps.contains("BASE_URL"));
        assert!(deps.contains("handler"));
    }
}
