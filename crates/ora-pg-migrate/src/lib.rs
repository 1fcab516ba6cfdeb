//! # ora-pg-migrate
//!
//! One-shot Oracle to PostgreSQL data migration driven by a declarative,
//! ordered list of steps.
//!
//! Each step either copies one table or carries one sequence over:
//!
//! - **Table steps** read every source row, rename and convert columns,
//!   inject required constants and bulk-insert the result in batches
//! - **Sequence steps** advance a source sequence once and set the target
//!   sequence so its next value is greater
//! - **NULL skip**: a NULL source value is left out of the insert, so the
//!   target column default applies
//!
//! The target schema must already exist. The first failing step stops the
//! run and the error names that step.
//!
//! ## Example
//!
//! ```rust,no_run
//! use ora_pg_migrate::{Config, ConverterRegistry, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> ora_pg_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let steps = config.build_steps(&ConverterRegistry::builtin())?;
//!     let mut orchestrator = Orchestrator::connect(&config).await?;
//!     let result = orchestrator.run(&steps).await?;
//!     println!("Migrated {} rows", result.rows_transferred);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod orchestrator;
pub mod plan;
pub mod source;
pub mod target;
pub mod transfer;
pub mod transform;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use crate::core::{SourceReader, SqlValue, TargetRow, TargetWriter};
pub use config::{Config, MigrationConfig, SourceConfig, TargetConfig};
pub use error::{MigrateError, Result};
pub use orchestrator::{
    HealthCheckResult, MigrationResult, Orchestrator, PlannedStep, RunState, TableValidation,
};
pub use plan::{ConverterRegistry, MigrationStep, SequenceMigrationSpec, TableMigrationSpec, ValueConverter};
pub use source::OracleOdbcSource;
pub use target::PgWriter;
pub use transfer::TableStats;
