//! Source and target row representations.

use indexmap::IndexMap;

use super::value::{RawValue, SqlValue};
use crate::error::Result;

/// One row positioned on a source cursor.
///
/// Values are requested by (lowercase) column name. Implementations backed by
/// a live cursor may require columns to be read in source order and each at
/// most once.
pub trait SourceRow {
    /// Extract the raw value of `column` from the current row.
    fn value(&mut self, column: &str) -> Result<RawValue<'_>>;
}

/// A transformed row, ready for insertion.
///
/// An ordered mapping from target column name to value. A column whose
/// source value was NULL is absent rather than present-with-null.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetRow {
    values: IndexMap<String, SqlValue>,
}

impl TargetRow {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty row with room for `n` columns.
    pub fn with_capacity(n: usize) -> Self {
        Self {
            values: IndexMap::with_capacity(n),
        }
    }

    /// Set `column` to `value`, replacing any previous value in place.
    pub fn insert(&mut self, column: impl Into<String>, value: SqlValue) {
        self.values.insert(column.into(), value);
    }

    /// Value of `column`, if present.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.values.get(column)
    }

    /// Whether `column` is present.
    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    /// Number of present columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no columns at all.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Present column names, in insertion order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Iterate over `(column, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>> FromIterator<(K, SqlValue)> for TargetRow {
    fn from_iter<I: IntoIterator<Item = (K, SqlValue)>>(iter: I) -> Self {
        let mut row = TargetRow::new();
        for (k, v) in iter {
            row.insert(k, v);
        }
        row
    }
}
