//! Binding [`SqlValue`]s to PostgreSQL statement parameters.
//!
//! Source values arrive in the source's types (an Oracle `NUMBER(1)` flag is a
//! number, a `DATE` is a timestamp), while the server infers each parameter's
//! type from the target column. [`PgParam`] therefore accepts every parameter
//! type and converts the value to whatever the column wants at encode time.

use std::error::Error;
use std::str::FromStr;

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};

use crate::core::SqlValue;

type BoxError = Box<dyn Error + Sync + Send>;

/// A value bound to a parameter of whatever type the server inferred.
#[derive(Debug)]
pub struct PgParam<'a>(pub &'a SqlValue);

impl PgParam<'_> {
    fn mismatch(&self, ty: &Type) -> BoxError {
        format!("cannot write {} value {} to a {} column", self.0.kind(), self.0, ty).into()
    }

    fn as_bool(&self, ty: &Type) -> Result<bool, BoxError> {
        match self.0 {
            SqlValue::Bool(b) => Ok(*b),
            v if v.is_numeric() => Ok(!v.is_zero()),
            SqlValue::Text(s) => match s.trim().to_lowercase().as_str() {
                "t" | "true" | "y" | "yes" | "1" => Ok(true),
                "f" | "false" | "n" | "no" | "0" => Ok(false),
                _ => Err(self.mismatch(ty)),
            },
            _ => Err(self.mismatch(ty)),
        }
    }

    fn as_i64(&self, ty: &Type) -> Result<i64, BoxError> {
        match self.0 {
            SqlValue::Bool(b) => Ok(i64::from(*b)),
            SqlValue::Text(s) => s.trim().parse().map_err(|_| self.mismatch(ty)),
            v => v.as_i64().ok_or_else(|| self.mismatch(ty)),
        }
    }

    fn as_f64(&self, ty: &Type) -> Result<f64, BoxError> {
        match self.0 {
            SqlValue::Text(s) => s.trim().parse().map_err(|_| self.mismatch(ty)),
            v => v.as_f64().ok_or_else(|| self.mismatch(ty)),
        }
    }

    fn as_decimal(&self, ty: &Type) -> Result<Decimal, BoxError> {
        match self.0 {
            SqlValue::Bool(b) => Ok(Decimal::from(u8::from(*b))),
            SqlValue::Text(s) => Decimal::from_str(s.trim()).map_err(|_| self.mismatch(ty)),
            v => v.as_decimal().ok_or_else(|| self.mismatch(ty)),
        }
    }

    fn as_timestamp(&self, ty: &Type) -> Result<NaiveDateTime, BoxError> {
        match self.0 {
            SqlValue::Timestamp(ts) => Ok(*ts),
            SqlValue::Date(d) => Ok(d.and_time(NaiveTime::MIN)),
            SqlValue::Text(s) => NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S%.f")
                .map_err(|_| self.mismatch(ty)),
            _ => Err(self.mismatch(ty)),
        }
    }

    fn as_date(&self, ty: &Type) -> Result<NaiveDate, BoxError> {
        match self.0 {
            SqlValue::Date(d) => Ok(*d),
            SqlValue::Timestamp(ts) => Ok(ts.date()),
            SqlValue::Text(s) => {
                NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| self.mismatch(ty))
            }
            _ => Err(self.mismatch(ty)),
        }
    }
}

impl ToSql for PgParam<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match *ty {
            Type::BOOL => self.as_bool(ty)?.to_sql(ty, out),
            Type::INT2 => {
                let v = i16::try_from(self.as_i64(ty)?).map_err(|_| self.mismatch(ty))?;
                v.to_sql(ty, out)
            }
            Type::INT4 => {
                let v = i32::try_from(self.as_i64(ty)?).map_err(|_| self.mismatch(ty))?;
                v.to_sql(ty, out)
            }
            Type::INT8 => self.as_i64(ty)?.to_sql(ty, out),
            Type::FLOAT4 => (self.as_f64(ty)? as f32).to_sql(ty, out),
            Type::FLOAT8 => self.as_f64(ty)?.to_sql(ty, out),
            Type::NUMERIC => self.as_decimal(ty)?.to_sql(ty, out),
            Type::TIMESTAMP => self.as_timestamp(ty)?.to_sql(ty, out),
            Type::TIMESTAMPTZ => {
                DateTime::<Utc>::from_naive_utc_and_offset(self.as_timestamp(ty)?, Utc).to_sql(ty, out)
            }
            Type::DATE => self.as_date(ty)?.to_sql(ty, out),
            Type::BYTEA => match self.0 {
                SqlValue::Bytes(b) => b.as_slice().to_sql(ty, out),
                SqlValue::Text(s) => s.as_bytes().to_sql(ty, out),
                _ => Err(self.mismatch(ty)),
            },
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => match self.0 {
                SqlValue::Text(s) => s.as_str().to_sql(ty, out),
                SqlValue::Bytes(_) => Err(self.mismatch(ty)),
                other => other.to_string().as_str().to_sql(ty, out),
            },
            _ => Err(self.mismatch(ty)),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}
