//! Driver traits the migration engine is written against.
//!
//! - [`SourceReader`]: introspects and streams rows out of the source database
//! - [`TargetWriter`]: bulk-loads rows and sets sequences in the target database
//!
//! The engine only ever holds `Arc<dyn SourceReader>` / `Arc<dyn TargetWriter>`,
//! which keeps it testable against in-memory implementations.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::row::TargetRow;
use crate::error::Result;
use crate::transform::RowTransformer;

/// Read schema, rows and sequences from the source database.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Ordered column names of `table`, lowercased.
    ///
    /// Fails with [`MigrateError::Schema`](crate::MigrateError::Schema) if the
    /// table does not exist or its metadata cannot be read.
    async fn columns_of(&self, table: &str) -> Result<Vec<String>>;

    /// Stream every row of `table` through `transformer`.
    ///
    /// The transformer runs while the cursor is positioned on the row, so
    /// cursor-scoped values (large binaries) are decoded before the cursor
    /// advances. Rows are yielded in cursor order; the first error ends the
    /// stream. Dropping the receiver stops the read.
    fn read_table(
        &self,
        table: &str,
        transformer: Arc<RowTransformer>,
    ) -> mpsc::Receiver<Result<TargetRow>>;

    /// Advance `sequence` and return the value it produced.
    ///
    /// This is a side-effecting read: calling it twice yields two different
    /// values.
    async fn next_sequence_value(&self, sequence: &str) -> Result<i64>;

    /// Number of rows in `table`.
    async fn row_count(&self, table: &str) -> Result<i64>;

    /// Check the connection with a trivial query.
    async fn ping(&self) -> Result<()>;

    /// Get the database type identifier (e.g. "oracle").
    fn db_type(&self) -> &str;
}

/// Bulk-load rows and set sequences in the target database.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    /// Insert `rows` into `table` as one transaction.
    ///
    /// `columns` is the resolved target column list. A row lacking one of
    /// the columns gets the column's default, exactly as if the column had
    /// been omitted from a single-row insert.
    async fn write_batch(&self, table: &str, columns: &[String], rows: &[TargetRow])
        -> Result<u64>;

    /// Mark `value` as consumed by `sequence`, so its next value is greater.
    async fn set_sequence_value(&self, sequence: &str, value: i64) -> Result<()>;

    /// Number of rows in `table`.
    async fn row_count(&self, table: &str) -> Result<i64>;

    /// Check the connection with a trivial query.
    async fn ping(&self) -> Result<()>;

    /// Get the database type identifier (e.g. "postgres").
    fn db_type(&self) -> &str;

    /// Close all connections.
    async fn close(&self);
}
