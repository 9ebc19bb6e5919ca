//! Identifier canonicalization for schema names

use crate::schema::SchemaError;
use regex::Regex;
use std::sync::OnceLock;

const ABBREVIATIONS: &[(&str, &str)] = &[
    ("cust", "customer"),
    ("addr", "address"),
    ("amt", "amount"),
    ("qty", "quantity"),
    ("dt", "date"),
    ("usr", "user"),
    ("prod", "product"),
];

fn word_pattern() -> Result<&'static Regex, SchemaError> {
    static PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"[A-Z]?[a-z]+|[0-9]+"))
        .as_ref()
        .map_err(|e| SchemaError::InvalidPattern(e.clone()))
}

/// Split a `snake_case` or `camelCase` identifier into lowercase words
///
/// Runs of capitals without a following lowercase letter (e.g. `ID`) are
/// dropped; an identifier with no recognizable word is returned whole.
pub fn split_identifier(name: &str) -> Result<Vec<String>, SchemaError> {
    let spaced = name.replace('_', " ");
    let parts: Vec<String> = word_pattern()?
        .find_iter(&spaced)
        .map(|m| m.as_str().to_lowercase())
        .collect();

    if parts.is_empty() {
        Ok(vec![spaced.to_lowercase()])
    } else {
        Ok(parts)
    }
}

fn expand(part: String) -> String {
    ABBREVIATIONS
        .iter()
        .find(|(short, _)| *short == part)
        .map(|(_, long)| long.to_string())
        .unwrap_or(part)
}

/// Human-readable form of a table or column name
pub fn canonicalize(name: &str) -> Result<String, SchemaError> {
    Ok(split_identifier(name)?
        .into_iter()
        .map(expand)
        .collect::<Vec<_>>()
        .join(" "))
}
