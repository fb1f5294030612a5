//! SQL injection prevention for administrative statements.
//!
//! The session pool builds a handful of fixed administrative statements
//! (CREATE/DROP DATABASE, information_schema probes) by string concatenation,
//! because those run outside any prepared-statement path. Identifier and
//! literal escaping keeps that concatenation safe.

use crate::error::Error;

/// Validate a SQL identifier (database and table names).
///
/// - Must not be empty
/// - Maximum 255 characters
/// - Must start with an ASCII letter or underscore
/// - May only contain ASCII alphanumeric characters and underscores
///
/// Char-iteration instead of regex: zero-dependency, zero-allocation.
pub fn validate_identifier(name: &str) -> crate::Result<()> {
    if name.is_empty() {
        return Err(Error::internal("SQL identifier cannot be empty"));
    }

    if name.len() > 255 {
        return Err(Error::internal(format!(
            "SQL identifier too long: {} chars (max 255)",
            name.len()
        )));
    }

    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => {
            return Err(Error::internal(format!(
                "invalid SQL identifier '{}': must start with a letter or underscore",
                name
            )));
        }
    }

    for c in chars {
        if !c.is_ascii_alphanumeric() && c != '_' {
            return Err(Error::internal(format!(
                "invalid SQL identifier '{}': contains invalid character '{}'",
                name, c
            )));
        }
    }

    Ok(())
}

/// Escape a string value for a single-quoted SQL literal context.
///
/// Replaces `'` with `''` and doubles backslashes. Used by the
/// information_schema probes where parameterized queries are not practical.
pub fn escape_string_literal(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\'' => escaped.push_str("''"),
            '\\' => escaped.push_str("\\\\"),
            _ => escaped.push(c),
        }
    }
    escaped
}
