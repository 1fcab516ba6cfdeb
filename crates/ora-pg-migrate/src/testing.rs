//! In-memory source and target used by the engine tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::sync::mpsc;

use crate::core::{LargeBinary, RawValue, SourceReader, SourceRow, SqlValue, TargetRow, TargetWriter};
use crate::error::{MigrateError, Result};
use crate::transform::RowTransformer;

/// One source cell.
#[derive(Debug, Clone)]
pub enum Cell {
    Null,
    Value(SqlValue),
    Blob {
        data: Vec<u8>,
        reported_len: Option<u64>,
    },
    /// Extraction fails with this message.
    Fail(String),
}

impl Cell {
    pub fn blob(data: Vec<u8>) -> Self {
        let len = data.len() as u64;
        Cell::Blob {
            data,
            reported_len: Some(len),
        }
    }
}

macro_rules! cell_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Cell {
            fn from(v: $t) -> Self {
                Cell::Value(v.into())
            }
        })*
    };
}

cell_from!(bool, i32, i64, f64, &str, String, SqlValue);

/// A source row. Columns it does not carry read as NULL.
#[derive(Debug, Clone, Default)]
pub struct MemoryRow {
    cells: IndexMap<String, Cell>,
}

impl MemoryRow {
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, Cell)>) -> Self {
        Self {
            cells: pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        }
    }
}

struct MemoryBlob {
    data: Vec<u8>,
    reported_len: Option<u64>,
}

impl LargeBinary for MemoryBlob {
    fn reported_len(&mut self) -> Result<Option<u64>> {
        Ok(self.reported_len)
    }

    fn read_all(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(Some(std::mem::take(&mut self.data)))
    }
}

impl SourceRow for MemoryRow {
    fn value(&mut self, column: &str) -> Result<RawValue<'_>> {
        match self.cells.get(column) {
            None | Some(Cell::Null) => Ok(RawValue::Null),
            Some(Cell::Value(v)) => Ok(RawValue::Value(v.clone())),
            Some(Cell::Blob { data, reported_len }) => Ok(RawValue::LargeBinary(Box::new(MemoryBlob {
                data: data.clone(),
                reported_len: *reported_len,
            }))),
            Some(Cell::Fail(msg)) => Err(MigrateError::conversion(column, msg.clone())),
        }
    }
}

#[derive(Debug, Clone)]
struct SourceTable {
    columns: Vec<String>,
    rows: Vec<MemoryRow>,
}

/// Source database held in memory.
#[derive(Debug, Default)]
pub struct MemorySource {
    tables: Mutex<HashMap<String, SourceTable>>,
    sequences: Mutex<HashMap<String, i64>>,
    offline: AtomicBool,
    transformed: Arc<AtomicUsize>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, name: &str, columns: &[&str], rows: Vec<MemoryRow>) -> Self {
        let table = SourceTable {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        };
        self.tables.lock().unwrap().insert(name.to_string(), table);
        self
    }

    /// Sequence whose next value will be `current + 1`.
    pub fn with_sequence(self, name: &str, current: i64) -> Self {
        self.sequences.lock().unwrap().insert(name.to_string(), current);
        self
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Rows transformed so far, across all reads.
    pub fn transformed(&self) -> usize {
        self.transformed.load(Ordering::SeqCst)
    }

    fn table(&self, name: &str) -> Result<SourceTable> {
        self.tables
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| MigrateError::schema(name, "table not found"))
    }
}

#[async_trait]
impl SourceReader for MemorySource {
    async fn columns_of(&self, table: &str) -> Result<Vec<String>> {
        Ok(self.table(table)?.columns)
    }

    fn read_table(
        &self,
        table: &str,
        transformer: Arc<RowTransformer>,
    ) -> mpsc::Receiver<Result<TargetRow>> {
        let (tx, rx) = mpsc::channel(1);
        let rows = self.table(table).map(|t| t.rows);
        let transformed = self.transformed.clone();

        tokio::spawn(async move {
            match rows {
                Ok(rows) => {
                    for mut row in rows {
                        let Ok(permit) = tx.reserve().await else {
                            break;
                        };
                        let out = transformer.transform(&mut row);
                        transformed.fetch_add(1, Ordering::SeqCst);
                        let failed = out.is_err();
                        permit.send(out);
                        if failed {
                            break;
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                }
            }
        });

        rx
    }

    async fn next_sequence_value(&self, sequence: &str) -> Result<i64> {
        let mut sequences = self.sequences.lock().unwrap();
        let current = sequences
            .get_mut(sequence)
            .ok_or_else(|| MigrateError::schema(sequence, "sequence does not exist"))?;
        *current += 1;
        Ok(*current)
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        Ok(self.table(table)?.rows.len() as i64)
    }

    async fn ping(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(MigrateError::connectivity("connection refused", "pinging source"));
        }
        Ok(())
    }

    fn db_type(&self) -> &str {
        "memory"
    }
}

/// A stored target row: every table column, `None` meaning NULL.
pub type StoredRow = IndexMap<String, Option<SqlValue>>;

#[derive(Debug, Default)]
struct TargetTable {
    defaults: IndexMap<String, Option<SqlValue>>,
    not_null: HashSet<String>,
    unique: Option<String>,
    rows: Vec<StoredRow>,
    batches: Vec<usize>,
}

/// Target database held in memory.
///
/// Column defaults, NOT NULL and a single unique column are enforced per
/// batch; a failing batch leaves the table unchanged.
#[derive(Debug, Default)]
pub struct MemoryTarget {
    tables: Mutex<HashMap<String, TargetTable>>,
    sequences: Mutex<HashMap<String, i64>>,
    offline: AtomicBool,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table; each column carries its default (`None` = NULL).
    pub fn with_table(self, name: &str, columns: &[(&str, Option<SqlValue>)]) -> Self {
        let table = TargetTable {
            defaults: columns
                .iter()
                .map(|(c, d)| (c.to_string(), d.clone()))
                .collect(),
            ..Default::default()
        };
        self.tables.lock().unwrap().insert(name.to_string(), table);
        self
    }

    pub fn with_not_null(self, table: &str, column: &str) -> Self {
        if let Some(t) = self.tables.lock().unwrap().get_mut(table) {
            t.not_null.insert(column.to_string());
        }
        self
    }

    pub fn with_unique(self, table: &str, column: &str) -> Self {
        if let Some(t) = self.tables.lock().unwrap().get_mut(table) {
            t.unique = Some(column.to_string());
        }
        self
    }

    /// Sequence whose last value is `last` (next value `last + 1`).
    pub fn with_sequence(self, name: &str, last: i64) -> Self {
        self.sequences.lock().unwrap().insert(name.to_string(), last);
        self
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn rows(&self, table: &str) -> Vec<StoredRow> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Size of every batch written to `table`, in order.
    pub fn batch_sizes(&self, table: &str) -> Vec<usize> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .map(|t| t.batches.clone())
            .unwrap_or_default()
    }

    /// Value the sequence would hand out next.
    pub fn next_value(&self, sequence: &str) -> Option<i64> {
        self.sequences.lock().unwrap().get(sequence).map(|v| v + 1)
    }
}

#[async_trait]
impl TargetWriter for MemoryTarget {
    async fn write_batch(&self, table: &str, columns: &[String], rows: &[TargetRow]) -> Result<u64> {
        let mut tables = self.tables.lock().unwrap();
        let t = tables
            .get_mut(table)
            .ok_or_else(|| MigrateError::schema(table, "relation does not exist"))?;

        for column in columns {
            if !t.defaults.contains_key(column) {
                return Err(MigrateError::schema(
                    table,
                    format!("column \"{}\" does not exist", column),
                ));
            }
        }

        let mut seen: HashSet<String> = match &t.unique {
            Some(key) => t
                .rows
                .iter()
                .filter_map(|r| r.get(key).cloned().flatten())
                .map(|v| v.to_string())
                .collect(),
            None => HashSet::new(),
        };

        let mut staged = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(extra) = row.columns().find(|c| !columns.iter().any(|k| k == c)) {
                return Err(MigrateError::schema(
                    table,
                    format!("row carries unresolved column \"{}\"", extra),
                ));
            }

            let stored: StoredRow = t
                .defaults
                .iter()
                .map(|(col, default)| {
                    let value = match row.get(col) {
                        Some(v) => Some(v.clone()),
                        None => default.clone(),
                    };
                    (col.clone(), value)
                })
                .collect();

            for col in &t.not_null {
                if matches!(stored.get(col), Some(None)) {
                    return Err(MigrateError::constraint(
                        table,
                        format!("null value in column \"{}\" violates not-null constraint", col),
                    ));
                }
            }
            if let Some(key) = &t.unique {
                if let Some(Some(v)) = stored.get(key) {
                    if !seen.insert(v.to_string()) {
                        return Err(MigrateError::constraint(
                            table,
                            format!("duplicate key value violates unique constraint on \"{}\"", key),
                        ));
                    }
                }
            }
            staged.push(stored);
        }

        t.rows.extend(staged);
        t.batches.push(rows.len());
        Ok(rows.len() as u64)
    }

    async fn set_sequence_value(&self, sequence: &str, value: i64) -> Result<()> {
        let mut sequences = self.sequences.lock().unwrap();
        let last = sequences
            .get_mut(sequence)
            .ok_or_else(|| MigrateError::schema(sequence, "sequence does not exist"))?;
        *last = value;
        Ok(())
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        Ok(self.rows(table).len() as i64)
    }

    async fn ping(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(MigrateError::connectivity("connection refused", "pinging target"));
        }
        Ok(())
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {}
}
