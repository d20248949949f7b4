//! SQL identifier validation.
//!
//! Table and column names reach the rendered SQL verbatim, so every name is
//! checked against a plain identifier pattern before rendering.

use regex::Regex;
use relmodel_core::{Error, Result, SchemaErrorKind};
use std::sync::OnceLock;

fn identifier_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok())
        .as_ref()
}

/// Check whether a name is a plain SQL identifier.
pub fn is_valid_identifier(name: &str) -> bool {
    identifier_pattern().is_some_and(|re| re.is_match(name))
}

/// Validate a name, returning it unchanged on success.
pub fn validate_identifier(name: &str) -> Result<&str> {
    if is_valid_identifier(name) {
        Ok(name)
    } else {
        Err(Error::schema(
            SchemaErrorKind::InvalidIdentifier,
            format!("invalid SQL identifier: {:?}", name),
        ))
    }
}
