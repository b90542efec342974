//! Term normalization.
//!
//! Every comparison key in the system goes through [`normalize`]: lowercase,
//! then keep only ASCII alphanumeric runs joined by single spaces. Anything
//! else (punctuation, symbols, non-ASCII letters) acts as a separator.

use std::collections::BTreeSet;

use crate::models::DEFAULT_CONTEXT;

/// Canonicalize raw text to a comparison key.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|run| !run.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalize optional input; absent text is the empty key.
pub fn normalize_opt(text: Option<&str>) -> String {
    text.map(normalize).unwrap_or_default()
}

/// Distinct tokens of an already-normalized key.
pub fn token_set(normalized: &str) -> BTreeSet<&str> {
    normalized.split(' ').filter(|t| !t.is_empty()).collect()
}

/// Normalized context, falling back to the global namespace.
pub fn normalize_context(context: Option<&str>) -> String {
    let ctx = normalize_opt(context);
    if ctx.is_empty() {
        DEFAULT_CONTEXT.to_string()
    } else {
        ctx
    }
}

/// Learned-store key for a term within a context.
pub fn namespace_key(context: Option<&str>, term: &str) -> String {
    format!("{}::{}", normalize_context(context), normalize(term))
}
