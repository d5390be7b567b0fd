//! Entity validators and conditional request evaluation.
//!
//! A validator is derived from a [`VersionToken`] and nothing else, so the same
//! stored row always yields the same `ETag` no matter when or how it is read.

use base64::{Engine as _, engine::general_purpose::STANDARD};

use crate::domain::version::VersionToken;

/// Validator used when an entity carries no version token.
pub const SENTINEL_VALIDATOR: &str = "\"0\"";

const WILDCARD: &str = "*";

/// Derive the wire validator for a version token.
///
/// Non-empty tokens become weak validators `W/"<base64>"`; absent or empty
/// tokens map to [`SENTINEL_VALIDATOR`].
pub fn encode_validator(token: Option<&VersionToken>) -> String {
    match token {
        Some(token) if !token.is_empty() => format!("W/\"{}\"", STANDARD.encode(token.as_bytes())),
        _ => SENTINEL_VALIDATOR.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionalOutcome {
    /// The client already holds the current representation.
    Hit,
    /// The client must receive the full representation.
    Miss,
}

/// Evaluate `If-None-Match` header values against the current validator.
///
/// Each value may hold a comma separated list. Entries are trimmed and compared
/// by exact string equality; `*` matches any existing entity. No header at all
/// is a miss.
pub fn evaluate_if_none_match<'a, I>(presented: I, current: &str) -> ConditionalOutcome
where
    I: IntoIterator<Item = &'a str>,
{
    if any_entry_matches(presented, current) {
        ConditionalOutcome::Hit
    } else {
        ConditionalOutcome::Miss
    }
}

/// Whether an `If-Match` precondition holds for the current validator.
///
/// Uses the same list parsing as [`evaluate_if_none_match`]. Weak validators
/// are compared as opaque strings, matching how they were issued.
pub fn if_match_holds<'a, I>(presented: I, current: &str) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    any_entry_matches(presented, current)
}

fn any_entry_matches<'a, I>(presented: I, current: &str) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    presented
        .into_iter()
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .any(|entry| entry == current || entry == WILDCARD)
}
