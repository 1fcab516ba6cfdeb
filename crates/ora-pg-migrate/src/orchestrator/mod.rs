//! Migration orchestrator - runs the step list in order.
//!
//! The run is a linear state machine:
//!
//! ```text
//! NotStarted -> Running -> Completed
//!                       -> Failed { index, label, cause }
//! ```
//!
//! Steps execute strictly one after another. There are no retries and no
//! skips: the first error stops the run, and `Failed` is terminal.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::Config;
use crate::core::{SourceReader, TargetWriter};
use crate::error::{MigrateError, Result};
use crate::plan::MigrationStep;
use crate::source::OracleOdbcSource;
use crate::target::PgWriter;
use crate::transfer::{migrate_table, SequenceSynchronizer};
use crate::transform::ColumnMappingResolver;

/// Default rows per bulk insert.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Lifecycle of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    /// Executing the step at `step`.
    Running { step: usize },
    Completed,
    Failed {
        index: usize,
        label: String,
        cause: String,
    },
}

/// Outcome of one executed step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub index: usize,
    pub label: String,
    /// "completed" or "failed".
    pub status: String,
    /// Rows written (table steps).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<u64>,
    /// Bulk inserts issued (table steps).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flushes: Option<usize>,
    /// Value carried over (sequence steps).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_value: Option<i64>,
    pub duration_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status: "completed" or "failed".
    pub status: String,

    /// Hash of the configuration the run was started with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration finished.
    pub completed_at: DateTime<Utc>,

    /// Steps in the plan.
    pub steps_total: usize,

    /// Steps that completed.
    pub steps_completed: usize,

    /// Total rows written across all table steps.
    pub rows_transferred: u64,

    /// Average throughput (rows/second).
    pub rows_per_second: i64,

    /// Per-step outcomes, in execution order.
    pub steps: Vec<StepReport>,

    /// Final state of the run.
    pub state: RunState,
}

impl MigrationResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Resolved shape of one step, without moving data.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedStep {
    pub index: usize,
    pub label: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub source_columns: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub target_columns: Vec<String>,
}

/// Row-count comparison for one table step.
#[derive(Debug, Clone, Serialize)]
pub struct TableValidation {
    pub source_table: String,
    pub target_table: String,
    pub source_rows: i64,
    pub target_rows: i64,
    pub matches: bool,
}

/// Connection health of both ends.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    /// Driver identifier of the source, e.g. "oracle".
    pub source_db_type: String,
    pub source_connected: bool,
    pub source_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_error: Option<String>,
    pub target_db_type: String,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_error: Option<String>,
    pub healthy: bool,
}

/// Migration orchestrator.
pub struct Orchestrator {
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetWriter>,
    batch_size: usize,
    config_hash: Option<String>,
    state: RunState,
    result: Option<MigrationResult>,
}

impl Orchestrator {
    /// Create an orchestrator over already-connected drivers.
    pub fn new(source: Arc<dyn SourceReader>, target: Arc<dyn TargetWriter>) -> Self {
        Self {
            source,
            target,
            batch_size: DEFAULT_BATCH_SIZE,
            config_hash: None,
            state: RunState::NotStarted,
            result: None,
        }
    }

    /// Connect to the source and target described by `config`.
    pub async fn connect(config: &Config) -> Result<Self> {
        let source = OracleOdbcSource::new(&config.source).await?;
        let target = PgWriter::new(&config.target).await?;

        let mut orchestrator = Self::new(Arc::new(source), Arc::new(target))
            .with_batch_size(config.migration.tx_batch_size);
        orchestrator.config_hash = Some(config.hash());
        Ok(orchestrator)
    }

    /// Set the number of rows per bulk insert.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Current run state.
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Report of the last run, successful or not.
    pub fn result(&self) -> Option<&MigrationResult> {
        self.result.as_ref()
    }

    /// Execute `steps` in order.
    ///
    /// On failure the error names the failing step and wraps its cause; the
    /// partial report stays available through [`result`](Self::result).
    pub async fn run(&mut self, steps: &[MigrationStep]) -> Result<MigrationResult> {
        if self.state != RunState::NotStarted {
            return Err(MigrateError::Config(format!(
                "orchestrator cannot start a run from state {:?}",
                self.state
            )));
        }

        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!(
            "Starting migration run {}: {} steps, batch size {}",
            run_id,
            steps.len(),
            self.batch_size
        );

        let mut reports = Vec::with_capacity(steps.len());
        let mut failure = None;

        for (index, step) in steps.iter().enumerate() {
            self.state = RunState::Running { step: index };
            let label = step.label();
            info!("Step #{}: {}", index + 1, label);

            let started = Instant::now();
            let outcome = self.execute(step).await;
            let mut report = StepReport {
                index,
                label: label.clone(),
                status: "completed".to_string(),
                rows: None,
                flushes: None,
                sequence_value: None,
                duration_seconds: started.elapsed().as_secs_f64(),
                error: None,
            };

            match outcome {
                Ok(StepOutcome::Table { rows, flushes }) => {
                    report.rows = Some(rows);
                    report.flushes = Some(flushes);
                }
                Ok(StepOutcome::Sequence(value)) => report.sequence_value = Some(value),
                Err(e) => {
                    let cause = e.to_string();
                    error!("Step #{} ({}) failed: {}", index + 1, label, cause);
                    report.status = "failed".to_string();
                    report.error = Some(cause.clone());
                    reports.push(report);
                    self.state = RunState::Failed {
                        index,
                        label: label.clone(),
                        cause,
                    };
                    failure = Some(e.in_step(index, label));
                    break;
                }
            }
            reports.push(report);
        }

        if failure.is_none() {
            self.state = RunState::Completed;
        }

        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
        let rows_transferred: u64 = reports.iter().filter_map(|r| r.rows).sum();
        let rows_per_second = if duration > 0.0 {
            (rows_transferred as f64 / duration) as i64
        } else {
            0
        };

        let result = MigrationResult {
            run_id,
            status: if failure.is_some() { "failed" } else { "completed" }.to_string(),
            config_hash: self.config_hash.clone(),
            duration_seconds: duration,
            started_at,
            completed_at,
            steps_total: steps.len(),
            steps_completed: reports.iter().filter(|r| r.status == "completed").count(),
            rows_transferred,
            rows_per_second,
            steps: reports,
            state: self.state.clone(),
        };

        info!(
            "Migration {}: {}/{} steps, {} rows in {:.1}s ({} rows/s)",
            result.status,
            result.steps_completed,
            result.steps_total,
            result.rows_transferred,
            result.duration_seconds,
            result.rows_per_second
        );
        self.result = Some(result.clone());

        match failure {
            Some(e) => Err(e),
            None => Ok(result),
        }
    }

    async fn execute(&self, step: &MigrationStep) -> Result<StepOutcome> {
        step.validate()?;
        match step {
            MigrationStep::Table(spec) => {
                let stats = migrate_table(&self.source, &self.target, spec, self.batch_size).await?;
                Ok(StepOutcome::Table {
                    rows: stats.rows,
                    flushes: stats.flushes,
                })
            }
            MigrationStep::Sequence(spec) => {
                let sync = SequenceSynchronizer::new(self.source.clone(), self.target.clone());
                Ok(StepOutcome::Sequence(sync.sync(spec).await?))
            }
        }
    }

    /// Introspect and resolve every table step without reading rows.
    pub async fn plan(&self, steps: &[MigrationStep]) -> Result<Vec<PlannedStep>> {
        let mut planned = Vec::with_capacity(steps.len());
        for (index, step) in steps.iter().enumerate() {
            let label = step.label();
            let wrap = |e: MigrateError| e.in_step(index, label.clone());
            step.validate().map_err(wrap)?;

            let (source_columns, target_columns) = match step {
                MigrationStep::Table(spec) => {
                    let source_columns = self
                        .source
                        .columns_of(spec.source_table())
                        .await
                        .map_err(wrap)?;
                    let target_columns =
                        ColumnMappingResolver::resolve(spec, &source_columns).map_err(wrap)?;
                    (source_columns, target_columns)
                }
                MigrationStep::Sequence(_) => (Vec::new(), Vec::new()),
            };

            planned.push(PlannedStep {
                index,
                label,
                source_columns,
                target_columns,
            });
        }
        Ok(planned)
    }

    /// Compare source and target row counts for every table step.
    pub async fn validate(&self, steps: &[MigrationStep]) -> Result<Vec<TableValidation>> {
        let mut results = Vec::new();
        for step in steps {
            let MigrationStep::Table(spec) = step else {
                continue;
            };
            let source_rows = self.source.row_count(spec.source_table()).await?;
            let target_rows = self.target.row_count(spec.target_table()).await?;
            let matches = source_rows == target_rows;

            if matches {
                info!(
                    "{} -> {}: {} rows (OK)",
                    spec.source_table(),
                    spec.target_table(),
                    source_rows
                );
            } else {
                error!(
                    "{} -> {}: source={}, target={} (MISMATCH)",
                    spec.source_table(),
                    spec.target_table(),
                    source_rows,
                    target_rows
                );
            }

            results.push(TableValidation {
                source_table: spec.source_table().to_string(),
                target_table: spec.target_table().to_string(),
                source_rows,
                target_rows,
                matches,
            });
        }
        Ok(results)
    }

    /// Ping both connections and measure round-trip latency.
    pub async fn health_check(&self) -> HealthCheckResult {
        let started = Instant::now();
        let source = self.source.ping().await;
        let source_latency_ms = started.elapsed().as_millis() as u64;

        let started = Instant::now();
        let target = self.target.ping().await;
        let target_latency_ms = started.elapsed().as_millis() as u64;

        HealthCheckResult {
            source_db_type: self.source.db_type().to_string(),
            source_connected: source.is_ok(),
            source_latency_ms,
            target_db_type: self.target.db_type().to_string(),
            target_connected: target.is_ok(),
            target_latency_ms,
            healthy: source.is_ok() && target.is_ok(),
            source_error: source.err().map(|e| e.to_string()),
            target_error: target.err().map(|e| e.to_string()),
        }
    }

    /// Close target connections.
    pub async fn close(&self) {
        self.target.close().await;
    }
}

enum StepOutcome {
    Table { rows: u64, flushes: usize },
    Sequence(i64),
}
