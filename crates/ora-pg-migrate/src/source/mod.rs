//! Source database drivers.

mod odbc;

pub use odbc::OracleOdbcSource;
