//! Denylist and allowlist applied to every dependency candidate.

use std::sync::OnceLock;

use regex::Regex;

use crate::text::cached_regex;

/// Names a web framework injects into handler code.
pub const FRAMEWORK_NAMES: &[&str] = &[
    "request",
    "jsonify",
    "render_template",
    "make_response",
    "redirect",
    "url_for",
    "abort",
    "session",
];

const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "case", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "match", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield",
];

const BUILTINS: &[&str] = &[
    "abs", "all", "any", "ascii", "bin", "bool", "breakpoint", "bytearray", "bytes", "callable",
    "chr", "classmethod", "compile", "complex", "delattr", "dict", "dir", "divmod", "enumerate",
    "eval", "exec", "filter", "float", "format", "frozenset", "getattr", "globals", "hasattr",
    "hash", "help", "hex", "id", "input", "int", "isinstance", "issubclass", "iter", "len",
    "list", "locals", "map", "max", "memoryview", "min", "next", "object", "oct", "open", "ord",
    "pow", "print", "property", "range", "repr", "reversed", "round", "set", "setattr", "slice",
    "sorted", "staticmethod", "str", "sum", "super", "tuple", "type", "vars", "zip",
    "__import__", "__name__", "__file__",
];

const COMMON_LOCALS: &[&str] = &[
    "self", "cls", "args", "kwargs", "result", "results", "data", "response", "resp", "value",
    "values", "item", "items", "key", "keys", "i", "j", "k", "x", "y", "n", "e", "err", "ex",
    "exc", "f", "fp", "fh", "file", "line", "lines", "path", "name", "obj", "msg", "text",
    "content", "payload", "params", "headers", "url", "status", "output", "out", "tmp", "res",
    "row", "rows", "idx", "count", "total", "config", "ctx", "logger", "client", "app",
];

const STD_MODULES: &[&str] = &[
    "os", "sys", "re", "json", "math", "time", "datetime", "random", "logging", "subprocess",
    "collections", "itertools", "functools", "typing", "pathlib", "shutil", "tempfile", "base64",
    "hashlib", "uuid", "copy", "string", "io", "csv", "socket", "threading", "asyncio",
    "requests", "urllib", "http", "glob", "pickle", "struct", "decimal", "statistics",
];

/// Whether `name` is a language, builtin or standard-library name.
pub fn is_denied(name: &str) -> bool {
    KEYWORDS.contains(&name)
        || BUILTINS.contains(&name)
        || COMMON_LOCALS.contains(&name)
        || STD_MODULES.contains(&name)
}

/// Whether `name` follows a naming convention that marks module-level state.
pub fn is_allowed(name: &str) -> bool {
    static HELPER: OnceLock<Regex> = OnceLock::new();

    FRAMEWORK_NAMES.contains(&name)
        || is_constant_name(name)
        || cached_regex(
            &HELPER,
            r"^(?:_[A-Za-z0-9_]+|[a-z][a-z0-9]*(?:_[a-z0-9]+)+)$",
        )
        .is_match(name)
}

/// UPPER_CASE constant convention.
pub fn is_constant_name(name: &str) -> bool {
    static UPPER: OnceLock<Regex> = OnceLock::new();
    cached_regex(&UPPER, r"^[A-Z][A-Z0-9_]+$").is_match(name)
}

/// Both lists in one check.
pub fn keep(name: &str) -> bool {
    !is_denied(name) && is_allowed(name)
}
