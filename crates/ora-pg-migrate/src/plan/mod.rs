//! Declarative migration steps.
//!
//! What to migrate is data: an ordered list of [`MigrationStep`] values. How
//! to migrate it is the engine in [`crate::transfer`] and
//! [`crate::orchestrator`]. Step order is significant: parents, and the
//! sequences that generate their keys, must come before the children that
//! reference them.
//!
//! All names are lowercased when a spec is built, so lookups are
//! case-insensitive from then on.

pub mod converters;

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Serialize;

use crate::core::identifier::{normalize, oracle_ident, validate_identifier};
use crate::core::SqlValue;
use crate::error::{MigrateError, Result};

pub use converters::{ConverterFn, ConverterRegistry, ValueConverter};

/// How one source table is copied into one target table.
#[derive(Debug, Clone, Serialize)]
pub struct TableMigrationSpec {
    source_table: String,
    target_table: String,
    required_columns: IndexMap<String, SqlValue>,
    renamed_columns: IndexMap<String, String>,
    value_converters: IndexMap<String, ValueConverter>,
}

impl TableMigrationSpec {
    /// Copy `table` into a target table of the same name.
    pub fn new(table: &str) -> Self {
        let name = normalize(table);
        Self {
            source_table: name.clone(),
            target_table: name,
            required_columns: IndexMap::new(),
            renamed_columns: IndexMap::new(),
            value_converters: IndexMap::new(),
        }
    }

    /// Copy into `target_table` instead.
    pub fn into_table(mut self, target_table: &str) -> Self {
        self.target_table = normalize(target_table);
        self
    }

    /// Add a column every target row gets with the literal `value`.
    pub fn require(mut self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.required_columns.insert(normalize(column), value.into());
        self
    }

    /// Write source column `from` as target column `to`.
    pub fn rename(mut self, from: &str, to: &str) -> Self {
        self.renamed_columns.insert(normalize(from), normalize(to));
        self
    }

    /// Pass values of source column `column` through `converter`.
    pub fn convert(mut self, column: &str, converter: ValueConverter) -> Self {
        self.value_converters.insert(normalize(column), converter);
        self
    }

    pub fn source_table(&self) -> &str {
        &self.source_table
    }

    pub fn target_table(&self) -> &str {
        &self.target_table
    }

    pub fn required_columns(&self) -> &IndexMap<String, SqlValue> {
        &self.required_columns
    }

    pub fn renamed_columns(&self) -> &IndexMap<String, String> {
        &self.renamed_columns
    }

    pub fn value_converters(&self) -> &IndexMap<String, ValueConverter> {
        &self.value_converters
    }

    /// Check the spec's static invariants.
    ///
    /// - table and column names are valid identifiers
    /// - no chained renames: a rename source never also appears as a rename target
    /// - rename targets are unique
    /// - a required column is never also a renamed source column
    pub fn validate(&self) -> Result<()> {
        oracle_ident(&self.source_table)?;
        validate_identifier(&self.target_table)?;

        let mut targets = HashSet::new();
        for (from, to) in &self.renamed_columns {
            validate_identifier(from)?;
            validate_identifier(to)?;
            if self.renamed_columns.contains_key(to) {
                return Err(MigrateError::Config(format!(
                    "{}: chained rename {} -> {} (\"{}\" is itself renamed)",
                    self.source_table, from, to, to
                )));
            }
            if !targets.insert(to.as_str()) {
                return Err(MigrateError::Config(format!(
                    "{}: more than one column renamed to \"{}\"",
                    self.source_table, to
                )));
            }
        }

        for column in self.required_columns.keys() {
            validate_identifier(column)?;
            if self.renamed_columns.contains_key(column) {
                return Err(MigrateError::Config(format!(
                    "{}: required column \"{}\" is also a renamed source column",
                    self.source_table, column
                )));
            }
        }

        for column in self.value_converters.keys() {
            validate_identifier(column)?;
        }

        Ok(())
    }
}

/// How one source sequence is carried over to one target sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequenceMigrationSpec {
    source_sequence: String,
    target_sequence: String,
}

impl SequenceMigrationSpec {
    /// Carry `sequence` over to a target sequence of the same name.
    pub fn new(sequence: &str) -> Self {
        let name = normalize(sequence);
        Self {
            source_sequence: name.clone(),
            target_sequence: name,
        }
    }

    /// Carry over into `target_sequence` instead.
    pub fn into_sequence(mut self, target_sequence: &str) -> Self {
        self.target_sequence = normalize(target_sequence);
        self
    }

    pub fn source_sequence(&self) -> &str {
        &self.source_sequence
    }

    pub fn target_sequence(&self) -> &str {
        &self.target_sequence
    }

    /// Check that both names are usable identifiers.
    pub fn validate(&self) -> Result<()> {
        oracle_ident(&self.source_sequence)?;
        validate_identifier(&self.target_sequence)?;
        Ok(())
    }
}

/// One entry of the migration plan.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStep {
    Table(TableMigrationSpec),
    Sequence(SequenceMigrationSpec),
}

impl MigrationStep {
    /// Table step copying `table` into a same-named target table.
    pub fn table(table: &str) -> Self {
        MigrationStep::Table(TableMigrationSpec::new(table))
    }

    /// Sequence step carrying `sequence` over to a same-named target sequence.
    pub fn sequence(sequence: &str) -> Self {
        MigrationStep::Sequence(SequenceMigrationSpec::new(sequence))
    }

    /// Human-readable label used in logs and failure reports.
    pub fn label(&self) -> String {
        match self {
            MigrationStep::Table(t) => {
                format!("table {} -> {}", t.source_table, t.target_table)
            }
            MigrationStep::Sequence(s) => {
                format!("sequence {} -> {}", s.source_sequence, s.target_sequence)
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            MigrationStep::Table(t) => t.validate(),
            MigrationStep::Sequence(s) => s.validate(),
        }
    }
}

impl From<TableMigrationSpec> for MigrationStep {
    fn from(spec: TableMigrationSpec) -> Self {
        MigrationStep::Table(spec)
    }
}

impl From<SequenceMigrationSpec> for MigrationStep {
    fn from(spec: SequenceMigrationSpec) -> Self {
        MigrationStep::Sequence(spec)
    }
}
