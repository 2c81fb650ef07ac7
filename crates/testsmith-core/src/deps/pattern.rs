use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use super::filter::FRAMEWORK_NAMES;
use super::DependencyStrategy;
use crate::domain::Result;
use crate::text::cached_regex;

/// Regex scan over the raw text; never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct PatternStrategy;

impl DependencyStrategy for PatternStrategy {
    fn name(&self) -> &'static str {
        "pattern"
    }

    fn collect(&self, text: &str) -> Result<BTreeSet<String>> {
        static CALL: OnceLock<Regex> = OnceLock::new();
        static CONSTANT: OnceLock<Regex> = OnceLock::new();
        static WORD: OnceLock<Regex> = OnceLock::new();

        let mut out = BTreeSet::new();

        // Plain calls and the root object of attribute calls.
        let call = cached_regex(
            &CALL,
            r"(?:^|[^\w.])([A-Za-z_]\w*)(?:\s*\.\s*[A-Za-z_]\w*)*\s*\(",
        );
        out.extend(call.captures_iter(text).map(|c| c[1].to_string()));

        let constant = cached_regex(&CONSTANT, r"(?:^|[^\w.])([A-Z][A-Z0-9_]+)\b");
        out.extend(constant.captures_iter(text).map(|c| c[1].to_string()));

        let word = cached_regex(&WORD, r"(?:^|[^\w.])([A-Za-z_]\w*)\b");
        out.extend(
            word.captures_iter(text)
                .map(|c| c.get(1).map_or("", |m| m.as_str()))
                .filter(|w| FRAMEWORK_NAMES.contains(w))
                .map(str::to_string),
        );

        Ok(out)
    }
}
