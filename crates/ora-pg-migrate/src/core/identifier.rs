//! Identifier normalisation, validation and quoting.
//!
//! Identifiers cannot be bound as statement parameters, so every table,
//! column and sequence name that ends up in generated SQL passes through
//! this module first.
//!
//! Two dialects are involved:
//!
//! - **Oracle (source)**: names are interpolated *unquoted* so Oracle's own
//!   case folding applies (`partners` resolves to `PARTNERS`). They are
//!   therefore restricted to the characters Oracle allows in unquoted names.
//! - **PostgreSQL (target)**: names are double-quoted after lowercasing.

use crate::error::{MigrateError, Result};

/// Maximum identifier length (conservative limit across databases).
/// - PostgreSQL: 63 bytes
/// - Oracle 12.2+: 128 bytes
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Case-normalise a table, column or sequence name.
///
/// All names are compared in lowercase throughout the engine.
pub fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Validate an identifier for security issues.
///
/// Rejects empty identifiers, identifiers containing null bytes and
/// identifiers exceeding the maximum length.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Validate a name that will be interpolated unquoted into Oracle SQL.
///
/// Allows letters, digits, `_`, `$`, `#`, and `.` separating an owner
/// prefix (`owner.table`). Each dot-separated part must start with a letter.
pub fn oracle_ident(name: &str) -> Result<&str> {
    validate_identifier(name)?;

    for part in name.split('.') {
        let mut chars = part.chars();
        let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
        let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '#'));
        if !starts_with_letter || !rest_ok {
            return Err(MigrateError::Config(format!(
                "Invalid Oracle identifier {:?}: unquoted names must start with a letter \
                 and contain only letters, digits, '_', '$' or '#'",
                name
            )));
        }
    }

    Ok(name)
}

/// Quote a PostgreSQL identifier.
///
/// Escapes double quotes by doubling them and wraps in double quotes.
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Qualify a PostgreSQL table name with schema.
pub fn qualify_pg(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_pg(schema)?, quote_pg(table)?))
}

/// Render a PostgreSQL string literal (`'it''s'`).
pub fn pg_string_literal(value: &str) -> Result<String> {
    validate_identifier(value)?;
    Ok(format!("'{}'", value.replace('\'', "''")))
}

/// Render an Oracle string literal (`'IT''S'`).
pub fn oracle_string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
