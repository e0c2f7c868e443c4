//! Shared helpers: static regex compilation, whitespace handling and URL joining.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Compiles a regex at static init; panics on invalid pattern.
pub fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"\s+"));

/// Collapses whitespace runs to a single space and trims both ends.
#[must_use]
pub fn collapse_whitespace(value: &str) -> String {
    WHITESPACE_RE.replace_all(value.trim(), " ").into_owned()
}

/// Replaces whitespace runs with `separator` after lowercasing.
#[must_use]
pub fn slugify(value: &str, separator: &str) -> String {
    WHITESPACE_RE
        .replace_all(&value.to_lowercase(), separator)
        .into_owned()
}

/// Resolves a possibly relative reference against `base`.
///
/// Absolute references (any scheme) are returned unchanged after parsing.
#[must_use]
pub fn join_url(base: &Url, reference: &str) -> Option<Url> {
    base.join(reference.trim()).ok()
}
