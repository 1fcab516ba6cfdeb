//! Per-column value converters.
//!
//! A converter is a plain function of one value. It sees neither the row nor
//! any other column, is only ever called with non-null values, and must
//! return a value (converters cannot produce NULL). Converters are looked up
//! by name so step lists can reference them from configuration.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};

use crate::core::SqlValue;

/// Signature of a value converter. An `Err` aborts the run as a conversion error.
pub type ConverterFn = fn(SqlValue) -> Result<SqlValue, String>;

/// A converter bound to its registry name.
#[derive(Clone, Copy)]
pub struct ValueConverter {
    name: &'static str,
    func: ConverterFn,
}

impl ValueConverter {
    /// Create a named converter.
    pub const fn new(name: &'static str, func: ConverterFn) -> Self {
        Self { name, func }
    }

    /// Registry name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Apply the converter.
    pub fn apply(&self, value: SqlValue) -> Result<SqlValue, String> {
        (self.func)(value)
    }
}

impl fmt::Debug for ValueConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueConverter({})", self.name)
    }
}

impl Serialize for ValueConverter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name)
    }
}

/// Name → converter lookup table.
#[derive(Debug, Clone, Default)]
pub struct ConverterRegistry {
    converters: BTreeMap<&'static str, ValueConverter>,
}

impl ConverterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in converters.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("zero_is_true", zero_is_true);
        registry.register("nonzero_is_true", nonzero_is_true);
        registry.register("to_text", to_text);
        registry.register("trim", trim);
        registry
    }

    /// Register `func` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: &'static str, func: ConverterFn) -> &mut Self {
        self.converters.insert(name, ValueConverter::new(name, func));
        self
    }

    /// Look up a converter by name.
    pub fn get(&self, name: &str) -> Option<ValueConverter> {
        self.converters.get(name).copied()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.converters.keys().copied()
    }
}

/// Number → boolean, `0` meaning `true`.
///
/// Used where a numeric type code became a flag, e.g. a subscriber
/// `user_type` of `0` (prepaid) becoming `prepaid = true`.
pub fn zero_is_true(value: SqlValue) -> Result<SqlValue, String> {
    match value {
        SqlValue::Bool(b) => Ok(SqlValue::Bool(b)),
        v if v.is_numeric() => Ok(SqlValue::Bool(v.is_zero())),
        other => Err(format!("expected a number, got {}", other.kind())),
    }
}

/// Number → boolean, any non-zero value meaning `true`.
pub fn nonzero_is_true(value: SqlValue) -> Result<SqlValue, String> {
    match value {
        SqlValue::Bool(b) => Ok(SqlValue::Bool(b)),
        v if v.is_numeric() => Ok(SqlValue::Bool(!v.is_zero())),
        other => Err(format!("expected a number, got {}", other.kind())),
    }
}

/// Any scalar → its text rendering.
pub fn to_text(value: SqlValue) -> Result<SqlValue, String> {
    match value {
        SqlValue::Bytes(_) => Err("cannot render binary data as text".to_string()),
        SqlValue::Text(s) => Ok(SqlValue::Text(s)),
        other => Ok(SqlValue::Text(other.to_string())),
    }
}

/// Strip leading and trailing whitespace (Oracle `CHAR` padding).
pub fn trim(value: SqlValue) -> Result<SqlValue, String> {
    match value {
        SqlValue::Text(s) => Ok(SqlValue::Text(s.trim().to_string())),
        other => Err(format!("expected text, got {}", other.kind())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_zero_is_true() {
        assert_eq!(zero_is_true(SqlValue::Int(0)), Ok(SqlValue::Bool(true)));
        assert_eq!(zero_is_true(SqlValue::Int(1)), Ok(SqlValue::Bool(false)));
        assert_eq!(
            zero_is_true(SqlValue::Decimal(Decimal::new(0, 0))),
            Ok(SqlValue::Bool(true))
        );
        assert!(zero_is_true(SqlValue::Text("0".into())).is_err());
    }

    #[test]
    fn test_nonzero_is_true() {
        assert_eq!(nonzero_is_true(SqlValue::Int(0)), Ok(SqlValue::Bool(false)));
        assert_eq!(nonzero_is_true(SqlValue::Float(2.5)), Ok(SqlValue::Bool(true)));
    }

    #[test]
    fn test_to_text_and_trim() {
        assert_eq!(to_text(SqlValue::Int(12)), Ok(SqlValue::Text("12".into())));
        assert!(to_text(SqlValue::Bytes(vec![0])).is_err());
        assert_eq!(
            trim(SqlValue::Text("AB   ".into())),
            Ok(SqlValue::Text("AB".into()))
        );
        assert!(trim(SqlValue::Int(1)).is_err());
    }

    #[test]
    fn test_registry_lookup() {
        let registry = ConverterRegistry::builtin();
        assert!(registry.get("zero_is_true").is_some());
        assert!(registry.get("no_such_converter").is_none());
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["nonzero_is_true", "to_text", "trim", "zero_is_true"]
        );

        let conv = registry.get("zero_is_true").unwrap();
        assert_eq!(conv.name(), "zero_is_true");
        assert_eq!(conv.apply(SqlValue::Int(0)), Ok(SqlValue::Bool(true)));
    }

    #[test]
    fn test_registry_custom_converter() {
        fn negate(v: SqlValue) -> Result<SqlValue, String> {
            v.as_i64()
                .map(|n| SqlValue::Int(-n))
                .ok_or_else(|| "not an integer".to_string())
        }

        let mut registry = ConverterRegistry::new();
        registry.register("negate", negate);
        let conv = registry.get("negate").unwrap();
        assert_eq!(conv.apply(SqlValue::Int(5)), Ok(SqlValue::Int(-5)));
    }
}
