//! SQL type definitions and mapping.

use crate::identifiers::Dialect;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Physical SQL column types a declaration may name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    // Integer types
    SmallInt,
    Integer,
    BigInt,

    // Floating point
    Real,
    Double,

    // Fixed precision
    Decimal { precision: u8, scale: u8 },

    Boolean,

    // String types
    VarChar(u32),
    Text,

    Blob,

    // Date/time types
    Date,
    Timestamp,

    Uuid,
    Json,

    /// Vendor type name passed through verbatim.
    Custom(String),
}

impl SqlType {
    /// Get the SQL type name for this type.
    pub fn sql_name(&self) -> String {
        match self {
            SqlType::SmallInt => "SMALLINT".to_string(),
            SqlType::Integer => "INTEGER".to_string(),
            SqlType::BigInt => "BIGINT".to_string(),
            SqlType::Real => "REAL".to_string(),
            SqlType::Double => "DOUBLE PRECISION".to_string(),
            SqlType::Decimal { precision, scale } => format!("DECIMAL({}, {})", precision, scale),
            SqlType::Boolean => "BOOLEAN".to_string(),
            SqlType::VarChar(len) => format!("VARCHAR({})", len),
            SqlType::Text => "TEXT".to_string(),
            SqlType::Blob => "BLOB".to_string(),
            SqlType::Date => "DATE".to_string(),
            SqlType::Timestamp => "TIMESTAMP".to_string(),
            SqlType::Uuid => "UUID".to_string(),
            SqlType::Json => "JSON".to_string(),
            SqlType::Custom(name) => name.clone(),
        }
    }

    /// Static family name used in type mismatch diagnostics.
    pub const fn kind_name(&self) -> &'static str {
        match self {
            SqlType::SmallInt | SqlType::Integer | SqlType::BigInt => "integer",
            SqlType::Real | SqlType::Double => "floating point",
            SqlType::Decimal { .. } => "decimal",
            SqlType::Boolean => "boolean",
            SqlType::VarChar(_) | SqlType::Text => "text",
            SqlType::Blob => "binary",
            SqlType::Date => "date",
            SqlType::Timestamp => "timestamp",
            SqlType::Uuid => "uuid",
            SqlType::Json => "json",
            SqlType::Custom(_) => "custom",
        }
    }

    /// Type name as rendered in DDL for a specific dialect.
    pub fn ddl_name(&self, dialect: Dialect) -> String {
        match (dialect, self) {
            (Dialect::Postgres, SqlType::Blob) => "BYTEA".to_string(),
            (Dialect::Postgres, SqlType::Json) => "JSONB".to_string(),
            (Dialect::Mysql, SqlType::Double) => "DOUBLE".to_string(),
            (Dialect::Mysql, SqlType::Uuid) => "BINARY(16)".to_string(),
            (Dialect::Sqlite, SqlType::Uuid) => "BLOB".to_string(),
            (Dialect::Sqlite, SqlType::Json) => "TEXT".to_string(),
            _ => self.sql_name(),
        }
    }

    /// Check if this type is an integer type.
    pub const fn is_integer(&self) -> bool {
        matches!(self, SqlType::SmallInt | SqlType::Integer | SqlType::BigInt)
    }

    /// Whether a (non-null) value is storable in a column of this type.
    ///
    /// Integer widths are interchangeable; drivers widen on read. See
    /// [`SqlType::coerce`] for the declared-width form.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (SqlType::Custom(_), _) => true,
            (t, Value::SmallInt(_) | Value::Int(_) | Value::BigInt(_)) if t.is_integer() => true,
            (SqlType::Real | SqlType::Double, Value::Double(_)) => true,
            (SqlType::Real | SqlType::Double, v) => v.as_i64().is_some(),
            (SqlType::Decimal { .. }, Value::Decimal(_) | Value::Double(_)) => true,
            (SqlType::Boolean, Value::Bool(_)) => true,
            (SqlType::Boolean, v) => v.as_i64().is_some(),
            (SqlType::VarChar(_) | SqlType::Text, Value::Text(_)) => true,
            (SqlType::Blob, Value::Bytes(_)) => true,
            (SqlType::Date, Value::Date(_)) => true,
            (SqlType::Timestamp, Value::Timestamp(_)) => true,
            (SqlType::Uuid, Value::Uuid(_) | Value::Text(_)) => true,
            (SqlType::Json, Value::Json(_) | Value::Text(_)) => true,
            _ => false,
        }
    }

    /// `value` at this type's declared integer width.
    ///
    /// Drivers report integers at whatever width they like (SQLite always
    /// widens to 64 bits), so `Int(7)` and `BigInt(7)` must collapse to one
    /// variant before they are compared or hashed. Non-integer types and
    /// non-integer values pass through unchanged. Returns `None` when the
    /// value does not fit the declared width.
    pub fn coerce(&self, value: &Value) -> Option<Value> {
        if !matches!(value, Value::SmallInt(_) | Value::Int(_) | Value::BigInt(_)) {
            return Some(value.clone());
        }
        let n = value.as_i64()?;
        match self {
            SqlType::SmallInt => i16::try_from(n).ok().map(Value::SmallInt),
            SqlType::Integer => i32::try_from(n).ok().map(Value::Int),
            SqlType::BigInt => Some(Value::BigInt(n)),
            _ => Some(value.clone()),
        }
    }
}
