//! Table transfer: read, transform, batch and bulk-insert one table.
//!
//! A table step runs as a short pipeline:
//! - the source reader walks the cursor and transforms each row in place
//! - a bounded channel hands transformed rows to the async side
//! - [`BatchAccumulator`] buffers rows and flushes them to the target once
//!   the buffer reaches the batch size, and once more at end of stream
//!
//! Flushes are awaited before the next row is received, so memory stays
//! bounded by the batch size.

mod sequence;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use crate::core::{SourceReader, TargetRow, TargetWriter};
use crate::error::Result;
use crate::plan::TableMigrationSpec;
use crate::transform::{ColumnMappingResolver, RowTransformer};

pub use sequence::SequenceSynchronizer;

/// Statistics from one table transfer.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TableStats {
    /// Introspected source columns.
    pub source_columns: Vec<String>,

    /// Resolved target columns.
    pub target_columns: Vec<String>,

    /// Rows written to the target.
    pub rows: u64,

    /// Number of bulk inserts issued.
    pub flushes: usize,

    /// Time spent writing.
    #[serde(skip)]
    pub write_time: Duration,
}

/// Buffers transformed rows of one table and flushes them in batches.
pub struct BatchAccumulator {
    target: Arc<dyn TargetWriter>,
    table: String,
    columns: Vec<String>,
    batch_size: usize,
    buffer: Vec<TargetRow>,
    rows_written: u64,
    flushes: usize,
    write_time: Duration,
}

impl BatchAccumulator {
    /// Create an accumulator writing to `table` with the resolved `columns`.
    ///
    /// A batch size of zero is treated as one.
    pub fn new(
        target: Arc<dyn TargetWriter>,
        table: impl Into<String>,
        columns: Vec<String>,
        batch_size: usize,
    ) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            target,
            table: table.into(),
            columns,
            batch_size,
            buffer: Vec::with_capacity(batch_size),
            rows_written: 0,
            flushes: 0,
            write_time: Duration::ZERO,
        }
    }

    /// Append a row to the buffer.
    pub fn accumulate(&mut self, row: TargetRow) {
        self.buffer.push(row);
    }

    /// Flush if the buffer has reached the batch size. Returns whether it did.
    pub async fn flush_if_full(&mut self) -> Result<bool> {
        if self.buffer.len() >= self.batch_size {
            self.flush().await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Flush whatever is left at end of stream.
    pub async fn flush_remaining(&mut self) -> Result<()> {
        if !self.buffer.is_empty() {
            self.flush().await?;
        }
        Ok(())
    }

    /// Rows currently buffered.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    async fn flush(&mut self) -> Result<()> {
        let started = Instant::now();
        let written = self
            .target
            .write_batch(&self.table, &self.columns, &self.buffer)
            .await?;
        self.write_time += started.elapsed();
        self.rows_written += written;
        self.flushes += 1;
        debug!(
            "{}: flushed batch #{} ({} rows, {} total)",
            self.table, self.flushes, written, self.rows_written
        );
        self.buffer.clear();
        Ok(())
    }

    fn into_stats(self, source_columns: Vec<String>) -> TableStats {
        TableStats {
            source_columns,
            target_columns: self.columns,
            rows: self.rows_written,
            flushes: self.flushes,
            write_time: self.write_time,
        }
    }
}

/// Copy one table from source to target.
pub async fn migrate_table(
    source: &Arc<dyn SourceReader>,
    target: &Arc<dyn TargetWriter>,
    spec: &TableMigrationSpec,
    batch_size: usize,
) -> Result<TableStats> {
    let source_columns = source.columns_of(spec.source_table()).await?;
    let target_columns = ColumnMappingResolver::resolve(spec, &source_columns)?;
    debug!(
        "{}: {} source columns -> {} target columns",
        spec.source_table(),
        source_columns.len(),
        target_columns.len()
    );

    let transformer = Arc::new(RowTransformer::new(spec, source_columns.clone()));
    let mut rows = source.read_table(spec.source_table(), transformer);
    let mut batch = BatchAccumulator::new(
        target.clone(),
        spec.target_table(),
        target_columns,
        batch_size,
    );

    while let Some(row) = rows.recv().await {
        batch.accumulate(row?);
        batch.flush_if_full().await?;
    }
    batch.flush_remaining().await?;

    let stats = batch.into_stats(source_columns);
    info!(
        "{} -> {}: {} rows in {} batches",
        spec.source_table(),
        spec.target_table(),
        stats.rows,
        stats.flushes
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SqlValue;
    use crate::error::MigrateError;
    use crate::testing::{Cell, MemoryRow, MemorySource, MemoryTarget};

    fn numbered_rows(n: usize) -> Vec<MemoryRow> {
        (0..n as i64)
            .map(|i| MemoryRow::from_pairs([("id", Cell::from(i)), ("name", Cell::from(format!("p{i}")))]))
            .collect()
    }

    fn partners_target() -> MemoryTarget {
        MemoryTarget::new()
            .with_table(
                "partners",
                &[
                    ("id", None),
                    ("name", None),
                    ("cdr_traffic_enabled", Some(SqlValue::Bool(false))),
                ],
            )
            .with_unique("partners", "id")
    }

    async fn run(
        rows: usize,
        batch_size: usize,
    ) -> (Result<TableStats>, Arc<MemoryTarget>) {
        let source: Arc<dyn SourceReader> = Arc::new(MemorySource::new().with_table(
            "partners",
            &["id", "name"],
            numbered_rows(rows),
        ));
        let target = Arc::new(partners_target());
        let writer: Arc<dyn TargetWriter> = target.clone();
        let spec = TableMigrationSpec::new("partners").require("cdr_traffic_enabled", true);
        (migrate_table(&source, &writer, &spec, batch_size).await, target)
    }

    #[tokio::test]
    async fn test_batching_count() {
        for (n, b, expected) in [(0, 3, 0), (1, 3, 1), (3, 3, 1), (7, 3, 3), (9, 3, 3), (10, 1, 10)] {
            let (stats, target) = run(n, b).await;
            let stats = stats.unwrap();
            let sizes = target.batch_sizes("partners");

            assert_eq!(stats.flushes, expected, "n={n} b={b}");
            assert_eq!(sizes.len(), expected, "n={n} b={b}");
            assert!(sizes.iter().all(|&s| s <= b));
            assert!(sizes.iter().rev().skip(1).all(|&s| s == b));
            assert_eq!(sizes.iter().sum::<usize>(), n);
            assert_eq!(stats.rows, n as u64);
        }
    }

    #[tokio::test]
    async fn test_round_trip_preserves_rows() {
        let (stats, target) = run(5, 2).await;
        stats.unwrap();

        let rows = target.rows("partners");
        assert_eq!(rows.len(), 5);
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(row["id"], Some(SqlValue::Int(i as i64)));
            assert_eq!(row["name"], Some(SqlValue::Text(format!("p{i}"))));
            assert_eq!(row["cdr_traffic_enabled"], Some(SqlValue::Bool(true)));
        }
    }

    #[tokio::test]
    async fn test_null_skip_lets_target_default_apply() {
        let source: Arc<dyn SourceReader> = Arc::new(MemorySource::new().with_table(
            "partners",
            &["id", "name", "cdr_traffic_enabled"],
            vec![
                MemoryRow::from_pairs([("id", Cell::from(1)), ("cdr_traffic_enabled", Cell::Null)]),
                MemoryRow::from_pairs([("id", Cell::from(2)), ("cdr_traffic_enabled", Cell::from(true))]),
            ],
        ));
        let target = Arc::new(partners_target());
        let writer: Arc<dyn TargetWriter> = target.clone();

        migrate_table(&source, &writer, &TableMigrationSpec::new("partners"), 10)
            .await
            .unwrap();

        let rows = target.rows("partners");
        // NULL in the source became the target DEFAULT (false), not NULL.
        assert_eq!(rows[0]["cdr_traffic_enabled"], Some(SqlValue::Bool(false)));
        assert_eq!(rows[1]["cdr_traffic_enabled"], Some(SqlValue::Bool(true)));
        assert_eq!(rows[0]["name"], None);
    }

    #[tokio::test]
    async fn test_constraint_violation_aborts_table() {
        let source: Arc<dyn SourceReader> = Arc::new(MemorySource::new().with_table(
            "partners",
            &["id"],
            vec![
                MemoryRow::from_pairs([("id", Cell::from(1))]),
                MemoryRow::from_pairs([("id", Cell::from(2))]),
                MemoryRow::from_pairs([("id", Cell::from(2))]),
                MemoryRow::from_pairs([("id", Cell::from(3))]),
            ],
        ));
        let target = Arc::new(partners_target());
        let writer: Arc<dyn TargetWriter> = target.clone();

        let err = migrate_table(&source, &writer, &TableMigrationSpec::new("partners"), 2)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::ConstraintViolation { .. }));
        // The first batch committed; the failing batch left nothing behind.
        assert_eq!(target.batch_sizes("partners"), vec![2]);
        assert_eq!(target.rows("partners").len(), 2);
    }

    #[tokio::test]
    async fn test_missing_source_table_is_schema_error() {
        let source: Arc<dyn SourceReader> = Arc::new(MemorySource::new());
        let writer: Arc<dyn TargetWriter> = Arc::new(partners_target());
        let err = migrate_table(&source, &writer, &TableMigrationSpec::new("partners"), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::Schema { .. }));
    }

    #[tokio::test]
    async fn test_accumulator_flush_if_full() {
        let target = Arc::new(partners_target());
        let writer: Arc<dyn TargetWriter> = target.clone();
        let mut batch = BatchAccumulator::new(writer, "partners", vec!["id".to_string()], 2);

        batch.accumulate([("id", SqlValue::Int(1))].into_iter().collect());
        assert!(!batch.flush_if_full().await.unwrap());
        assert_eq!(batch.pending(), 1);

        batch.accumulate([("id", SqlValue::Int(2))].into_iter().collect());
        assert!(batch.flush_if_full().await.unwrap());
        assert_eq!(batch.pending(), 0);

        batch.flush_remaining().await.unwrap();
        assert_eq!(target.batch_sizes("partners"), vec![2]);
    }

    #[tokio::test]
    async fn test_partners_null_flag_dropped_and_required_flag_added() {
        let source: Arc<dyn SourceReader> = Arc::new(MemorySource::new().with_table(
            "partners",
            &["id", "name", "cdr_enabled"],
            vec![
                MemoryRow::from_pairs([
                    ("id", Cell::from(1)),
                    ("name", Cell::from("A")),
                    ("cdr_enabled", Cell::Null),
                ]),
                MemoryRow::from_pairs([
                    ("id", Cell::from(2)),
                    ("name", Cell::from("B")),
                    ("cdr_enabled", Cell::from(true)),
                ]),
            ],
        ));
        // A non-null default makes an omitted cdr_enabled observable.
        let target = Arc::new(MemoryTarget::new().with_table(
            "partners",
            &[
                ("id", None),
                ("name", None),
                ("cdr_enabled", Some(SqlValue::from("omitted"))),
                ("cdr_traffic_enabled", Some(SqlValue::Bool(false))),
            ],
        ));
        let writer: Arc<dyn TargetWriter> = target.clone();
        let spec = TableMigrationSpec::new("PARTNERS").require("CDR_Traffic_Enabled", true);

        let stats = migrate_table(&source, &writer, &spec, 10).await.unwrap();
        assert_eq!(
            stats.target_columns,
            vec!["id", "name", "cdr_enabled", "cdr_traffic_enabled"]
        );

        let rows = target.rows("partners");
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0]["id"], Some(SqlValue::Int(1)));
        assert_eq!(rows[0]["name"], Some(SqlValue::from("A")));
        assert_eq!(rows[0]["cdr_enabled"], Some(SqlValue::from("omitted")));
        assert_eq!(rows[0]["cdr_traffic_enabled"], Some(SqlValue::Bool(true)));

        assert_eq!(rows[1]["id"], Some(SqlValue::Int(2)));
        assert_eq!(rows[1]["name"], Some(SqlValue::from("B")));
        assert_eq!(rows[1]["cdr_enabled"], Some(SqlValue::Bool(true)));
        assert_eq!(rows[1]["cdr_traffic_enabled"], Some(SqlValue::Bool(true)));
    }

    #[tokio::test]
    async fn test_null_into_not_null_column_without_default_is_constraint_violation() {
        let source: Arc<dyn SourceReader> = Arc::new(MemorySource::new().with_table(
            "partners",
            &["id", "name"],
            vec![
                MemoryRow::from_pairs([("id", Cell::from(1)), ("name", Cell::from("A"))]),
                MemoryRow::from_pairs([("id", Cell::from(2)), ("name", Cell::Null)]),
            ],
        ));
        let target = Arc::new(partners_target().with_not_null("partners", "name"));
        let writer: Arc<dyn TargetWriter> = target.clone();

        let err = migrate_table(&source, &writer, &TableMigrationSpec::new("partners"), 10)
            .await
            .unwrap_err();
        match err {
            MigrateError::ConstraintViolation { table, message } => {
                assert_eq!(table, "partners");
                assert!(message.contains("not-null"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(target.rows("partners").is_empty());
    }

    #[tokio::test]
    async fn test_reader_transforms_at_most_one_row_ahead() {
        let source = MemorySource::new().with_table("partners", &["id", "name"], numbered_rows(5));
        let spec = TableMigrationSpec::new("partners");
        let transformer = Arc::new(RowTransformer::new(&spec, vec!["id".into(), "name".into()]));

        let mut rows = source.read_table("partners", transformer);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        // One row waits in the channel; the next is not transformed yet.
        assert_eq!(source.transformed(), 1);

        rows.recv().await.unwrap().unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(source.transformed(), 2);
    }
}
