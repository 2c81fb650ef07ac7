//! Detection of web route handlers.

use std::sync::OnceLock;

use regex::Regex;

use crate::text::cached_regex;

/// Whether a function definition looks like a web route handler.
///
/// True for routing decorators (`@app.route(`, `@bp.get(` ...) and for
/// bodies that touch the request object or build framework responses.
pub fn is_handler_style(text: &str) -> bool {
    static ROUTE: OnceLock<Regex> = OnceLock::new();
    static USAGE: OnceLock<Regex> = OnceLock::new();

    cached_regex(
        &ROUTE,
        r"(?m)^\s*@\s*[A-Za-z_][\w.]*\.(?:route|get|post|put|delete|patch)\s*\(",
    )
    .is_match(text)
        || cached_regex(
            &USAGE,
            r"\brequest\.|\b(?:jsonify|render_template|make_response)\s*\(",
        )
        .is_match(text)
}
