//! SQL value types carried from source rows to target rows.
//!
//! NULL is deliberately not a variant of [`SqlValue`]: a null source value is
//! never materialised, the column is simply left out of the target row (see
//! [`crate::transform::RowTransformer`]). Nulls only exist on the read side,
//! as [`RawValue::Null`].

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Result;

/// A non-null column value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// Boolean value.
    Bool(bool),

    /// Integral number.
    Int(i64),

    /// Exact numeric (Oracle `NUMBER` with a scale, PostgreSQL `numeric`).
    Decimal(Decimal),

    /// Approximate numeric (`BINARY_DOUBLE`, `float8`).
    Float(f64),

    /// Character data.
    Text(String),

    /// Raw bytes, decoded from a large-binary source value.
    Bytes(Vec<u8>),

    /// Timestamp without time zone.
    Timestamp(NaiveDateTime),

    /// Date without time component.
    Date(NaiveDate),
}

impl SqlValue {
    /// Short name of the value's kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            SqlValue::Bool(_) => "boolean",
            SqlValue::Int(_) => "integer",
            SqlValue::Decimal(_) => "decimal",
            SqlValue::Float(_) => "float",
            SqlValue::Text(_) => "text",
            SqlValue::Bytes(_) => "bytes",
            SqlValue::Timestamp(_) => "timestamp",
            SqlValue::Date(_) => "date",
        }
    }

    /// Interpret a numeric value as `i64`, if it has no fractional part.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(*v),
            SqlValue::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            SqlValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    /// Interpret a numeric value as `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Int(v) => Some(*v as f64),
            SqlValue::Decimal(d) => d.to_f64(),
            SqlValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Interpret a numeric value as an exact decimal.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            SqlValue::Int(v) => Some(Decimal::from(*v)),
            SqlValue::Decimal(d) => Some(*d),
            SqlValue::Float(f) => Decimal::from_f64_retain(*f),
            _ => None,
        }
    }

    /// Whether the value is numerically zero. Non-numeric values never are.
    pub fn is_zero(&self) -> bool {
        match self {
            SqlValue::Int(v) => *v == 0,
            SqlValue::Decimal(d) => d.is_zero(),
            SqlValue::Float(f) => *f == 0.0,
            _ => false,
        }
    }

    /// Whether the value is a number of any representation.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            SqlValue::Int(_) | SqlValue::Decimal(_) | SqlValue::Float(_)
        )
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Bool(v) => write!(f, "{}", v),
            SqlValue::Int(v) => write!(f, "{}", v),
            SqlValue::Decimal(v) => write!(f, "{}", v),
            SqlValue::Float(v) => write!(f, "{}", v),
            SqlValue::Text(v) => f.write_str(v),
            SqlValue::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            SqlValue::Timestamp(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.f")),
            SqlValue::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(i64::from(v))
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::Timestamp(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

/// YAML/JSON form of a literal value (required-column defaults).
#[derive(Deserialize)]
#[serde(untagged)]
enum Literal {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for SqlValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(match Literal::deserialize(deserializer)? {
            Literal::Bool(v) => SqlValue::Bool(v),
            Literal::Int(v) => SqlValue::Int(v),
            Literal::Float(v) => SqlValue::Float(v),
            Literal::Text(v) => SqlValue::Text(v),
        })
    }
}

impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            SqlValue::Bool(v) => serializer.serialize_bool(*v),
            SqlValue::Int(v) => serializer.serialize_i64(*v),
            SqlValue::Float(v) => serializer.serialize_f64(*v),
            SqlValue::Bytes(v) => serializer.serialize_bytes(v),
            SqlValue::Text(v) => serializer.serialize_str(v),
            other => serializer.serialize_str(&other.to_string()),
        }
    }
}

/// A large-binary handle (Oracle `BLOB`, ODBC long binary) positioned on the
/// current row of an open cursor.
///
/// Handles are cursor-scoped: they must be read to the end before the cursor
/// advances. Some drivers only learn that the value is NULL when it is read,
/// so [`read_all`](LargeBinary::read_all) may still yield `None`.
pub trait LargeBinary {
    /// Length reported by the source, when the driver exposes one.
    fn reported_len(&mut self) -> Result<Option<u64>>;

    /// Read the whole value, `None` if it turned out to be NULL.
    fn read_all(&mut self) -> Result<Option<Vec<u8>>>;
}

/// A value as it comes off a source cursor, before transformation.
pub enum RawValue<'r> {
    /// SQL NULL.
    Null,

    /// A plain value.
    Value(SqlValue),

    /// A large-binary handle that still has to be read.
    LargeBinary(Box<dyn LargeBinary + 'r>),
}

impl fmt::Debug for RawValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Null => f.write_str("Null"),
            RawValue::Value(v) => f.debug_tuple("Value").field(v).finish(),
            RawValue::LargeBinary(_) => f.write_str("LargeBinary(..)"),
        }
    }
}

impl From<Option<SqlValue>> for RawValue<'_> {
    fn from(v: Option<SqlValue>) -> Self {
        match v {
            Some(v) => RawValue::Value(v),
            None => RawValue::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_views() {
        assert_eq!(SqlValue::Int(7).as_i64(), Some(7));
        assert_eq!(SqlValue::Decimal(Decimal::new(700, 2)).as_i64(), Some(7));
        assert_eq!(SqlValue::Decimal(Decimal::new(705, 2)).as_i64(), None);
        assert_eq!(SqlValue::Text("7".into()).as_i64(), None);
        assert_eq!(SqlValue::Int(2).as_f64(), Some(2.0));
        assert_eq!(
            SqlValue::Int(12).as_decimal(),
            Some(Decimal::from(12))
        );
    }

    #[test]
    fn test_is_zero() {
        assert!(SqlValue::Int(0).is_zero());
        assert!(SqlValue::Decimal(Decimal::new(0, 3)).is_zero());
        assert!(SqlValue::Float(0.0).is_zero());
        assert!(!SqlValue::Int(1).is_zero());
        assert!(!SqlValue::Text("0".into()).is_zero());
    }

    #[test]
    fn test_literal_deserialization() {
        let v: SqlValue = serde_yaml::from_str("true").unwrap();
        assert_eq!(v, SqlValue::Bool(true));

        let v: SqlValue = serde_yaml::from_str("42").unwrap();
        assert_eq!(v, SqlValue::Int(42));

        let v: SqlValue = serde_yaml::from_str("1.5").unwrap();
        assert_eq!(v, SqlValue::Float(1.5));

        let v: SqlValue = serde_yaml::from_str("MONETARY_AMOUNT").unwrap();
        assert_eq!(v, SqlValue::Text("MONETARY_AMOUNT".into()));
    }

    #[test]
    fn test_literal_serialization() {
        assert_eq!(serde_json::to_string(&SqlValue::Bool(true)).unwrap(), "true");
        assert_eq!(serde_json::to_string(&SqlValue::Int(3)).unwrap(), "3");
        assert_eq!(
            serde_json::to_string(&SqlValue::Decimal(Decimal::new(125, 2))).unwrap(),
            "\"1.25\""
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(SqlValue::Bytes(vec![1, 2, 3]).to_string(), "<3 bytes>");
        let ts = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        assert_eq!(SqlValue::Timestamp(ts).to_string(), "2024-01-15 10:30:00");
    }
}
