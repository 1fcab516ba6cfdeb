//! PostgreSQL target.
//!
//! Batches are written as multi-row `INSERT ... VALUES` statements inside a
//! single transaction per batch. A column missing from a row is written as
//! the `DEFAULT` keyword, so the column default applies exactly as if the
//! column had been left out of a single-row insert.

mod params;
mod tls;

pub use params::PgParam;
pub use tls::SslMode;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::types::ToSql;
use tokio_postgres::Config as PgConfig;
use tracing::{debug, info};

use crate::config::TargetConfig;
use crate::core::identifier::{pg_string_literal, qualify_pg, quote_pg};
use crate::core::{SqlValue, TargetRow, TargetWriter};
use crate::error::{MigrateError, Result};

/// PostgreSQL's limit on bind parameters per statement.
const MAX_BIND_PARAMS: usize = 65_535;

/// PostgreSQL target writer backed by a connection pool.
pub struct PgWriter {
    pool: Pool,
    schema: String,
}

impl PgWriter {
    /// Create the pool and verify the connection.
    pub async fn new(config: &TargetConfig) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.application_name("ora-pg-migrate");

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let ssl_mode: SslMode = config.ssl_mode.parse()?;
        let manager = match tls::connector(ssl_mode)? {
            Some(tls) => Manager::from_config(pg_config, tls, mgr_config),
            None => Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config),
        };
        let pool = Pool::builder(manager)
            .max_size(config.max_connections)
            .build()
            .map_err(|e| MigrateError::connectivity(e, "creating PostgreSQL pool"))?;

        let writer = Self {
            pool,
            schema: config.schema.clone(),
        };
        writer.ping().await?;

        info!(
            "Connected to PostgreSQL target: {}:{}/{}",
            config.host, config.port, config.database
        );
        Ok(writer)
    }

    async fn client(&self, context: &str) -> Result<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::connectivity(e, context.to_string()))
    }
}

#[async_trait]
impl TargetWriter for PgWriter {
    async fn write_batch(
        &self,
        table: &str,
        columns: &[String],
        rows: &[TargetRow],
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let qualified = qualify_pg(&self.schema, table)?;
        let quoted: Vec<String> = columns.iter().map(|c| quote_pg(c)).collect::<Result<_>>()?;
        let per_statement = rows_per_statement(columns.len());

        let mut client = self.client("getting connection for batch insert").await?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| MigrateError::from_target(e, table))?;

        let mut written = 0u64;
        if columns.is_empty() {
            let sql = format!("INSERT INTO {} DEFAULT VALUES", qualified);
            for _ in rows {
                written += tx
                    .execute(sql.as_str(), &[])
                    .await
                    .map_err(|e| MigrateError::from_target(e, table))?;
            }
        } else {
            for chunk in rows.chunks(per_statement) {
                let (sql, values) = insert_statement(&qualified, &quoted, columns, chunk);
                let params: Vec<PgParam<'_>> = values.into_iter().map(PgParam).collect();
                let refs: Vec<&(dyn ToSql + Sync)> =
                    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

                written += tx
                    .execute(sql.as_str(), &refs)
                    .await
                    .map_err(|e| MigrateError::from_target(e, table))?;
            }
        }

        tx.commit()
            .await
            .map_err(|e| MigrateError::from_target(e, table))?;
        debug!("{}: committed {} rows", qualified, written);
        Ok(written)
    }

    async fn set_sequence_value(&self, sequence: &str, value: i64) -> Result<()> {
        let sql = format!(
            "SELECT setval({}, {}, true)",
            pg_string_literal(&qualify_pg(&self.schema, sequence)?)?,
            value
        );
        let client = self.client("getting connection for setval").await?;
        client
            .simple_query(&sql)
            .await
            .map_err(|e| MigrateError::from_target(e, sequence))?;
        Ok(())
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", qualify_pg(&self.schema, table)?);
        let client = self.client("getting connection for row count").await?;
        let row = client
            .query_one(sql.as_str(), &[])
            .await
            .map_err(|e| MigrateError::from_target(e, table))?;
        Ok(row.get::<_, i64>(0))
    }

    async fn ping(&self) -> Result<()> {
        let client = self.client("testing PostgreSQL connection").await?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| MigrateError::connectivity(e, "testing PostgreSQL connection"))?;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "postgres"
    }

    async fn close(&self) {
        self.pool.close();
    }
}

/// How many rows fit in one statement without exceeding the parameter limit.
fn rows_per_statement(columns: usize) -> usize {
    (MAX_BIND_PARAMS / columns.max(1)).max(1)
}

/// Build one multi-row insert for `rows`.
///
/// Returns the statement and its parameter values in placeholder order.
/// Columns a row does not carry become `DEFAULT`. `columns` must not be empty.
fn insert_statement<'r>(
    qualified: &str,
    quoted: &[String],
    columns: &[String],
    rows: &'r [TargetRow],
) -> (String, Vec<&'r SqlValue>) {
    let mut sql = format!("INSERT INTO {} ({}) VALUES ", qualified, quoted.join(", "));
    let mut values = Vec::with_capacity(rows.len() * columns.len());

    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push('(');
        for (j, column) in columns.iter().enumerate() {
            if j > 0 {
                sql.push_str(", ");
            }
            match row.get(column) {
                Some(value) => {
                    values.push(value);
                    sql.push('$');
                    sql.push_str(&values.len().to_string());
                }
                None => sql.push_str("DEFAULT"),
            }
        }
        sql.push(')');
    }

    (sql, values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, SqlValue)]) -> TargetRow {
        pairs.iter().cloned().collect()
    }

    #[test]
    fn test_insert_statement_uses_default_for_absent_columns() {
        let columns = vec!["id".to_string(), "name".to_string(), "enabled".to_string()];
        let quoted: Vec<String> = columns.iter().map(|c| quote_pg(c).unwrap()).collect();
        let rows = vec![
            row(&[("id", SqlValue::Int(1)), ("name", SqlValue::from("A")), ("enabled", SqlValue::Bool(true))]),
            row(&[("id", SqlValue::Int(2)), ("enabled", SqlValue::Bool(true))]),
        ];

        let (sql, values) = insert_statement("\"public\".\"partners\"", &quoted, &columns, &rows);
        assert_eq!(
            sql,
            "INSERT INTO \"public\".\"partners\" (\"id\", \"name\", \"enabled\") \
             VALUES ($1, $2, $3), ($4, DEFAULT, $5)"
        );
        assert_eq!(values.len(), 5);
        assert_eq!(values[3], &SqlValue::Int(2));
    }

    #[test]
    fn test_rows_per_statement_respects_parameter_limit() {
        assert_eq!(rows_per_statement(1), 65_535);
        assert_eq!(rows_per_statement(10), 6_553);
        assert!(rows_per_statement(10) * 10 <= MAX_BIND_PARAMS);
        assert_eq!(rows_per_statement(100_000), 1);
        assert_eq!(rows_per_statement(0), 65_535);
    }
}
