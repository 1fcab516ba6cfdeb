//! Column mapping and per-row transformation.
//!
//! [`ColumnMappingResolver`] computes the target column list of a table once,
//! from the introspected source columns. [`RowTransformer`] then turns every
//! source row into a [`TargetRow`] while the row is still positioned on the
//! source cursor.

use indexmap::IndexMap;
use tracing::warn;

use crate::core::{RawValue, SourceRow, SqlValue, TargetRow};
use crate::error::{MigrateError, Result};
use crate::plan::{TableMigrationSpec, ValueConverter};

/// Maps source columns to target columns for one table.
pub struct ColumnMappingResolver;

impl ColumnMappingResolver {
    /// Resolve the ordered target column list of `spec`.
    ///
    /// Every source column is emitted in source order under its renamed name
    /// (or its own name), followed by every required column in declared
    /// order. A required column that is also a rename target is emitted once,
    /// at the rename position.
    ///
    /// Fails with a schema error if a required column shadows a source
    /// column that is written under its own name: the row would carry two
    /// values for one target column.
    pub fn resolve(spec: &TableMigrationSpec, source_columns: &[String]) -> Result<Vec<String>> {
        let renamed = spec.renamed_columns();
        let required = spec.required_columns();

        for from in renamed.keys() {
            if !source_columns.contains(from) {
                warn!(
                    "{}: renamed column {} does not exist in source",
                    spec.source_table(),
                    from
                );
            }
        }

        let mut columns = Vec::with_capacity(source_columns.len() + required.len());
        for name in source_columns {
            let target = match renamed.get(name) {
                Some(to) => to.clone(),
                None => {
                    if required.contains_key(name) {
                        return Err(MigrateError::schema(
                            spec.source_table(),
                            format!(
                                "required column \"{}\" collides with a source column of the same name",
                                name
                            ),
                        ));
                    }
                    name.clone()
                }
            };
            columns.push(target);
        }

        for name in required.keys() {
            if !columns.contains(name) {
                columns.push(name.clone());
            }
        }

        Ok(columns)
    }
}

/// Turns source rows of one table into target rows.
///
/// Built once per table from its spec and introspected columns, then shared
/// with the source reader's cursor thread.
#[derive(Debug)]
pub struct RowTransformer {
    table: String,
    source_columns: Vec<String>,
    renamed: IndexMap<String, String>,
    converters: IndexMap<String, ValueConverter>,
    required: IndexMap<String, SqlValue>,
}

impl RowTransformer {
    pub fn new(spec: &TableMigrationSpec, source_columns: Vec<String>) -> Self {
        Self {
            table: spec.source_table().to_string(),
            source_columns,
            renamed: spec.renamed_columns().clone(),
            converters: spec.value_converters().clone(),
            required: spec.required_columns().clone(),
        }
    }

    /// Source table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Transform the row the source cursor is positioned on.
    ///
    /// Per source column, in order: a NULL is skipped (the column is left out
    /// of the target row, so the target default applies); a large binary is
    /// read to the end and must match its reported length; a registered
    /// converter is applied; the value is stored under its renamed name.
    /// Required columns are then set on every row, overriding any value
    /// already stored under the same name.
    pub fn transform(&self, row: &mut dyn SourceRow) -> Result<TargetRow> {
        let mut out = TargetRow::with_capacity(self.source_columns.len() + self.required.len());

        for column in &self.source_columns {
            let value = match row.value(column).map_err(|e| as_conversion(column, e))? {
                RawValue::Null => continue,
                RawValue::Value(v) => v,
                RawValue::LargeBinary(mut lob) => {
                    let reported = lob.reported_len().map_err(|e| as_conversion(column, e))?;
                    let bytes = match lob.read_all().map_err(|e| as_conversion(column, e))? {
                        Some(bytes) => bytes,
                        None => continue,
                    };
                    if let Some(expected) = reported {
                        if bytes.len() as u64 != expected {
                            return Err(MigrateError::conversion(
                                column.as_str(),
                                format!(
                                    "short binary read: expected {} bytes, got {}",
                                    expected,
                                    bytes.len()
                                ),
                            ));
                        }
                    }
                    SqlValue::Bytes(bytes)
                }
            };

            let value = match self.converters.get(column) {
                Some(conv) => conv.apply(value).map_err(|msg| {
                    MigrateError::conversion(
                        column.as_str(),
                        format!("converter {} failed: {}", conv.name(), msg),
                    )
                })?,
                None => value,
            };

            let name = self.renamed.get(column).unwrap_or(column);
            out.insert(name.as_str(), value);
        }

        for (name, value) in &self.required {
            out.insert(name.as_str(), value.clone());
        }

        Ok(out)
    }
}

fn as_conversion(column: &str, err: MigrateError) -> MigrateError {
    match err {
        MigrateError::Conversion { .. } => err,
        other => MigrateError::conversion(column, other.to_string()),
    }
}
