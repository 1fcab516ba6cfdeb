//! Error types for the migration library.

use thiserror::Error;
use tokio_postgres::error::SqlState;

/// Main error type for migration operations.
///
/// Every variant is fatal: nothing in the engine retries, and the first
/// error raised anywhere halts the run.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, bad step definition, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source table or column not found, or catalog metadata unreadable.
    #[error("Schema error for table {table}: {message}")]
    Schema { table: String, message: String },

    /// A source value could not be read, decoded or converted.
    #[error("Conversion failed for column {column}: {message}")]
    Conversion { column: String, message: String },

    /// The target rejected a batch (uniqueness, foreign key, not-null).
    #[error("Constraint violation while loading {table}: {message}")]
    ConstraintViolation { table: String, message: String },

    /// Source or target unreachable.
    #[error("Connectivity error: {message}\n  Context: {context}")]
    Connectivity { message: String, context: String },

    /// Source database (ODBC) error
    #[error("Source database error: {0}")]
    Source(#[from] odbc_api::Error),

    /// Target database (PostgreSQL) error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// A migration step failed; wraps the underlying cause.
    #[error("Step #{} ({label}) failed", .index + 1)]
    Step {
        index: usize,
        label: String,
        #[source]
        source: Box<MigrateError>,
    },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Schema error for a table.
    pub fn schema(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Schema {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Conversion error for a column.
    pub fn conversion(column: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Conversion {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a ConstraintViolation error for a table.
    pub fn constraint(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::ConstraintViolation {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Connectivity error with context about where it occurred.
    pub fn connectivity(message: impl std::fmt::Display, context: impl Into<String>) -> Self {
        MigrateError::Connectivity {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Classify a PostgreSQL error raised while writing to `table`.
    ///
    /// SQLSTATE class 23 (integrity constraint violation) becomes
    /// `ConstraintViolation`, a closed connection becomes `Connectivity`.
    pub fn from_target(err: tokio_postgres::Error, table: &str) -> Self {
        if let Some(db) = err.as_db_error() {
            if is_integrity_violation(db.code()) {
                let message = match db.detail() {
                    Some(detail) => format!("{} ({})", db.message(), detail),
                    None => db.message().to_string(),
                };
                return MigrateError::constraint(table, message);
            }
        }
        if err.is_closed() {
            return MigrateError::connectivity(err, format!("writing to {}", table));
        }
        MigrateError::Target(err)
    }

    /// Wrap this error with the step that produced it.
    pub fn in_step(self, index: usize, label: impl Into<String>) -> Self {
        MigrateError::Step {
            index,
            label: label.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through `Step` wrappers.
    pub fn root(&self) -> &MigrateError {
        match self {
            MigrateError::Step { source, .. } => source.root(),
            other => other,
        }
    }

    /// Process exit code for this error.
    ///
    /// - `2`: configuration problems detected before any data moved
    /// - `1`: everything else
    pub fn exit_code(&self) -> u8 {
        match self.root() {
            MigrateError::Config(_) | MigrateError::Yaml(_) => 2,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

fn is_integrity_violation(code: &SqlState) -> bool {
    code.code().starts_with("23")
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
