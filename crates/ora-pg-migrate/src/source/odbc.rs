//! Oracle source over ODBC.
//!
//! **Requirements:** an Oracle ODBC driver registered with the driver manager
//! (unixODBC on Linux/macOS), e.g. the Instant Client ODBC package. The
//! driver name goes into `source.driver`.
//!
//! ODBC calls block, so every statement runs on the blocking thread pool.
//! Table reads keep the cursor on that thread and hand transformed rows to
//! the async side one at a time.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use odbc_api::{
    Connection, ConnectionOptions, Cursor, CursorRow, DataType, Environment, ResultSetMetadata,
};
use rust_decimal::Decimal;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::config::SourceConfig;
use crate::core::identifier::{normalize, oracle_ident, oracle_string_literal};
use crate::core::{LargeBinary, RawValue, SourceReader, SourceRow, SqlValue, TargetRow};
use crate::error::{MigrateError, Result};
use crate::transform::RowTransformer;

/// How a result-set column is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Bool,
    Int,
    /// Exact numeric; integral when the scale is zero.
    Numeric { integral: bool },
    Float,
    Date,
    Timestamp,
    Binary,
    LargeBinary,
    Text,
}

impl ColumnKind {
    fn from_data_type(data_type: DataType) -> Self {
        match data_type {
            DataType::Bit => ColumnKind::Bool,
            DataType::TinyInt | DataType::SmallInt | DataType::Integer | DataType::BigInt => {
                ColumnKind::Int
            }
            DataType::Numeric { scale, .. } | DataType::Decimal { scale, .. } => {
                ColumnKind::Numeric {
                    integral: scale == 0,
                }
            }
            DataType::Float { .. } | DataType::Real | DataType::Double => ColumnKind::Float,
            DataType::Date => ColumnKind::Date,
            DataType::Timestamp { .. } => ColumnKind::Timestamp,
            DataType::Binary { .. } | DataType::Varbinary { .. } => ColumnKind::Binary,
            DataType::LongVarbinary { .. } => ColumnKind::LargeBinary,
            _ => ColumnKind::Text,
        }
    }
}

/// Oracle source reached through an ODBC driver.
pub struct OracleOdbcSource {
    env: Arc<Environment>,
    connection_string: String,
    schema: Option<String>,
    /// Serializes metadata and sequence statements.
    conn_mutex: Mutex<()>,
}

impl OracleOdbcSource {
    /// Create the ODBC environment and verify the connection.
    pub async fn new(config: &SourceConfig) -> Result<Self> {
        let env = Environment::new().map_err(|e| {
            MigrateError::connectivity(
                format!(
                    "Failed to create ODBC environment: {}. \
                     Make sure unixODBC and an Oracle ODBC driver are installed.",
                    e
                ),
                "ODBC environment",
            )
        })?;

        let schema = match &config.schema {
            Some(s) => Some(oracle_ident(s)?.to_string()),
            None => None,
        };

        let source = Self {
            env: Arc::new(env),
            connection_string: config.connection_string(),
            schema,
            conn_mutex: Mutex::new(()),
        };

        debug!(
            "ODBC connection string (credentials hidden): Driver={{{}}};DBQ=//{}:{}/{};...",
            config.driver, config.host, config.port, config.service_name
        );

        source.ping().await?;
        info!(
            "Connected to Oracle via ODBC: {}:{}/{}",
            config.host, config.port, config.service_name
        );

        Ok(source)
    }

    /// `owner.name` when a schema is configured, else `name`.
    fn qualify(&self, name: &str) -> Result<String> {
        oracle_ident(name)?;
        Ok(match &self.schema {
            Some(owner) => format!("{}.{}", owner, name),
            None => name.to_string(),
        })
    }

    /// Run `f` with a fresh connection on the blocking pool.
    async fn with_connection<T, F>(&self, context: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection<'_>) -> Result<T> + Send + 'static,
    {
        let _lock = self.conn_mutex.lock().await;
        let env = self.env.clone();
        let connection_string = self.connection_string.clone();

        tokio::task::spawn_blocking(move || {
            let conn = connect(&env, &connection_string)?;
            f(&conn)
        })
        .await
        .map_err(|e| MigrateError::connectivity(e, context))?
    }
}

fn connect<'env>(env: &'env Environment, connection_string: &str) -> Result<Connection<'env>> {
    env.connect_with_connection_string(connection_string, ConnectionOptions::default())
        .map_err(|e| MigrateError::connectivity(format!("ODBC connection failed: {}", e), "connecting to source"))
}

/// Run `sql` and return the first column of every row as text.
fn query_column(conn: &Connection<'_>, sql: &str) -> Result<Vec<Option<String>>> {
    let mut values = Vec::new();
    if let Some(mut cursor) = conn.execute(sql, ())? {
        let mut buf = Vec::new();
        while let Some(mut row) = cursor.next_row()? {
            let present = row.get_text(1, &mut buf)?;
            values.push(if present {
                Some(String::from_utf8_lossy(&buf).into_owned())
            } else {
                None
            });
        }
    }
    Ok(values)
}

#[async_trait]
impl SourceReader for OracleOdbcSource {
    async fn columns_of(&self, table: &str) -> Result<Vec<String>> {
        let name = oracle_string_literal(&oracle_ident(table)?.to_uppercase());
        let sql = match &self.schema {
            Some(owner) => format!(
                "SELECT COLUMN_NAME FROM ALL_TAB_COLUMNS \
                 WHERE OWNER = UPPER({}) AND TABLE_NAME = {} ORDER BY COLUMN_ID",
                oracle_string_literal(owner),
                name
            ),
            None => format!(
                "SELECT COLUMN_NAME FROM USER_TAB_COLUMNS \
                 WHERE TABLE_NAME = {} ORDER BY COLUMN_ID",
                name
            ),
        };

        let table_name = table.to_string();
        let rows = self
            .with_connection("reading table metadata", move |conn| query_column(conn, &sql))
            .await
            .map_err(|e| match e {
                MigrateError::Connectivity { .. } => e,
                other => MigrateError::schema(table_name.as_str(), other.to_string()),
            })?;

        let columns: Vec<String> = rows.into_iter().flatten().map(|c| normalize(&c)).collect();
        if columns.is_empty() {
            return Err(MigrateError::schema(table, "table not found or has no visible columns"));
        }
        debug!("{}: {} columns", table, columns.len());
        Ok(columns)
    }

    fn read_table(
        &self,
        table: &str,
        transformer: Arc<RowTransformer>,
    ) -> mpsc::Receiver<Result<TargetRow>> {
        let (tx, rx) = mpsc::channel(1);
        let env = self.env.clone();
        let connection_string = self.connection_string.clone();
        let sql = self.qualify(table).map(|t| format!("SELECT * FROM {}", t));
        let runtime = Handle::current();

        tokio::task::spawn_blocking(move || {
            let result = sql.and_then(|sql| {
                debug!("ODBC read: {}", sql);
                let conn = connect(&env, &connection_string)?;
                stream_rows(&conn, &sql, &transformer, &tx, &runtime)
            });
            if let Err(e) = result {
                let _ = tx.blocking_send(Err(e));
            }
        });

        rx
    }

    async fn next_sequence_value(&self, sequence: &str) -> Result<i64> {
        let sql = format!("SELECT {}.NEXTVAL FROM DUAL", self.qualify(sequence)?);
        let seq = sequence.to_string();
        let value = self
            .with_connection("reading sequence", move |conn| query_column(conn, &sql))
            .await?
            .into_iter()
            .next()
            .flatten()
            .ok_or_else(|| MigrateError::schema(seq.as_str(), "sequence returned no value"))?;

        value.trim().parse::<i64>().map_err(|e| {
            MigrateError::conversion(format!("{}.NEXTVAL", seq), format!("{}: {:?}", e, value))
        })
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.qualify(table)?);
        let value = self
            .with_connection("counting rows", move |conn| query_column(conn, &sql))
            .await?
            .into_iter()
            .next()
            .flatten()
            .unwrap_or_default();
        value
            .trim()
            .parse()
            .map_err(|e| MigrateError::conversion("COUNT(*)", format!("{}: {:?}", e, value)))
    }

    async fn ping(&self) -> Result<()> {
        self.with_connection("pinging source", |conn| {
            query_column(conn, "SELECT 1 FROM DUAL")?;
            Ok(())
        })
        .await
    }

    fn db_type(&self) -> &str {
        "oracle"
    }
}

/// Walk the cursor, transforming each row while it is current.
///
/// A channel slot is reserved before the next row is fetched, so the
/// producer never holds a transformed row the consumer has no room for.
/// Stops at the first transform error (after sending it) or when the
/// receiving side hangs up.
fn stream_rows(
    conn: &Connection<'_>,
    sql: &str,
    transformer: &RowTransformer,
    tx: &mpsc::Sender<Result<TargetRow>>,
    runtime: &Handle,
) -> Result<()> {
    let mut cursor = match conn.execute(sql, ())? {
        Some(cursor) => cursor,
        None => return Ok(()),
    };

    let num_cols = cursor.num_result_cols()? as u16;
    let mut columns = Vec::with_capacity(num_cols as usize);
    for i in 1..=num_cols {
        let name = normalize(&cursor.col_name(i)?);
        let kind = ColumnKind::from_data_type(cursor.col_data_type(i)?);
        columns.push((name, kind));
    }

    let mut rows = 0u64;
    loop {
        let Ok(permit) = runtime.block_on(tx.reserve()) else {
            break;
        };
        let Some(mut row) = cursor.next_row()? else {
            break;
        };
        let mut source_row = OdbcRow {
            row: &mut row,
            columns: &columns,
        };
        let out = transformer.transform(&mut source_row);
        let failed = out.is_err();
        permit.send(out);
        if failed {
            break;
        }
        rows += 1;
    }

    debug!("{}: cursor yielded {} rows", transformer.table(), rows);
    Ok(())
}

/// The row an ODBC cursor is positioned on.
///
/// Values are fetched with `SQLGetData`, so columns must be requested in
/// ascending result-set order, each at most once.
struct OdbcRow<'a, 'c> {
    row: &'a mut CursorRow<'c>,
    columns: &'a [(String, ColumnKind)],
}

impl OdbcRow<'_, '_> {
    fn text(&mut self, col: u16, column: &str) -> Result<Option<String>> {
        let mut buf = Vec::new();
        if !self.row.get_text(col, &mut buf)? {
            return Ok(None);
        }
        decode_utf8(buf, column).map(Some)
    }
}

impl SourceRow for OdbcRow<'_, '_> {
    fn value(&mut self, column: &str) -> Result<RawValue<'_>> {
        let (index, kind) = self
            .columns
            .iter()
            .enumerate()
            .find(|(_, (name, _))| name == column)
            .map(|(i, (_, kind))| (i as u16 + 1, *kind))
            .ok_or_else(|| MigrateError::conversion(column, "column not in result set"))?;

        match kind {
            ColumnKind::LargeBinary => Ok(RawValue::LargeBinary(Box::new(OdbcLob {
                row: &mut *self.row,
                col: index,
            }))),
            ColumnKind::Binary => {
                let mut buf = Vec::new();
                let present = self.row.get_binary(index, &mut buf)?;
                Ok(present.then_some(SqlValue::Bytes(buf)).into())
            }
            _ => {
                let text = self.text(index, column)?;
                match text {
                    Some(text) => parse_text(&text, kind)
                        .map(RawValue::Value)
                        .map_err(|msg| MigrateError::conversion(column, msg)),
                    None => Ok(RawValue::Null),
                }
            }
        }
    }
}

/// A `BLOB`/`LONG RAW` column on the current row, read in full on demand.
struct OdbcLob<'a, 'c> {
    row: &'a mut CursorRow<'c>,
    col: u16,
}

impl LargeBinary for OdbcLob<'_, '_> {
    /// The driver streams the value without announcing a total up front;
    /// `get_binary` keeps fetching until the indicator is satisfied.
    fn reported_len(&mut self) -> Result<Option<u64>> {
        Ok(None)
    }

    fn read_all(&mut self) -> Result<Option<Vec<u8>>> {
        let mut buf = Vec::new();
        let present = self.row.get_binary(self.col, &mut buf)?;
        Ok(present.then_some(buf))
    }
}

/// Decode the driver's text rendering of a value.
fn parse_text(text: &str, kind: ColumnKind) -> std::result::Result<SqlValue, String> {
    let trimmed = text.trim();
    match kind {
        ColumnKind::Bool => match trimmed {
            "1" | "true" | "TRUE" => Ok(SqlValue::Bool(true)),
            "0" | "false" | "FALSE" => Ok(SqlValue::Bool(false)),
            _ => Err(format!("invalid boolean {:?}", text)),
        },
        ColumnKind::Int => trimmed
            .parse::<i64>()
            .map(SqlValue::Int)
            .map_err(|e| format!("invalid integer {:?}: {}", text, e)),
        ColumnKind::Numeric { integral } => {
            if integral {
                if let Ok(v) = trimmed.parse::<i64>() {
                    return Ok(SqlValue::Int(v));
                }
            }
            Decimal::from_str(trimmed)
                .or_else(|_| Decimal::from_scientific(trimmed))
                .map(SqlValue::Decimal)
                .map_err(|e| format!("invalid number {:?}: {}", text, e))
        }
        ColumnKind::Float => trimmed
            .parse::<f64>()
            .map(SqlValue::Float)
            .map_err(|e| format!("invalid float {:?}: {}", text, e)),
        ColumnKind::Date => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .map(SqlValue::Date)
            .or_else(|_| parse_timestamp(trimmed).map(SqlValue::Timestamp))
            .map_err(|e| format!("invalid date {:?}: {}", text, e)),
        ColumnKind::Timestamp => parse_timestamp(trimmed)
            .map(SqlValue::Timestamp)
            .map_err(|e| format!("invalid timestamp {:?}: {}", text, e)),
        ColumnKind::Text | ColumnKind::Binary | ColumnKind::LargeBinary => {
            Ok(SqlValue::Text(text.to_string()))
        }
    }
}

fn decode_utf8(buf: Vec<u8>, column: &str) -> Result<String> {
    String::from_utf8(buf).map_err(|e| {
        MigrateError::conversion(column, format!("invalid UTF-8 in text value: {}", e))
    })
}

fn parse_timestamp(text: &str) -> std::result::Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
}
