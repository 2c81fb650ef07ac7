//! Small text helpers shared by the extractor, rewrite rules and classifier.

use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;

/// Compile `pattern` once into `cell` and return it.
///
/// Patterns are compile-time constants, so a failure here is a programming
/// error caught by the unit tests of every caller.
pub(crate) fn cached_regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static regex must compile"))
}

/// Normalize CRLF and lone CR line endings to LF.
pub fn normalize_newlines(text: &str) -> String {
    if !text.contains('\r') {
        return text.to_string();
    }
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Strip trailing whitespace from every line and from the end of the text.
pub fn trim_line_ends(text: &str) -> String {
    trim_line_ends_outside(text, &[])
}

/// Like [`trim_line_ends`], but a line whose end falls inside one of the
/// `protected` byte ranges keeps its trailing whitespace.
pub fn trim_line_ends_outside(text: &str, protected: &[Range<usize>]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut offset = 0;
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let end = offset + line.len();
        if protected.iter().any(|r| r.start < end && end < r.end) {
            out.push_str(line);
        } else {
            out.push_str(line.trim_end());
        }
        offset = end + 1;
    }
    out.truncate(out.trim_end().len());
    out
}

/// First `max` characters of `text`, with an ellipsis when cut.
pub fn excerpt(text: &str, max: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_newlines() {
        assert_eq!(normalize_newlines("a\r\nb\rc\n"), "a\nb\nc\n");
        assert_eq!(normalize_newlines("plain\n"), "plain\n");
    }

    #[test]
    fn test_trim_line_ends() {
        assert_eq!(trim_line_ends("def f():  \n    return 1\t\n\n"), "def f():\n    return 1");
    }

    #[test]
    fn test_trim_line_ends_outside_protected_range() {
        let text = "x = '''a  \nb'''  \ny = 1  ";
        let open = text.find("'''").expect("open");
        let close = text.rfind("'''").expect("close") + 3;
        assert_eq!(
            trim_line_ends_outside(text, &[open..close]),
            "x = '''a  \nb'''\ny = 1"
        );
    }

    #[test]
    fn test_excerpt() {
        assert_eq!(excerpt("abcdef", 3), "abc...");
        assert_eq!(excerpt("abc", 3), "abc");
    }
}
