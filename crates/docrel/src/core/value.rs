//! Native column values exchanged with drivers.
//!
//! Bindings translate between document values and [`SqlValue`]s; drivers
//! translate between [`SqlValue`]s and their wire types. Nothing above the
//! binding layer inspects a `SqlValue` directly.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

use crate::error::{DocrelError, Result};

/// Native column value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,

    /// Boolean value.
    Bool(bool),

    /// 32-bit signed integer (integer).
    I32(i32),

    /// 64-bit signed integer (bigint, SQLite INTEGER).
    I64(i64),

    /// 64-bit floating point (double precision, SQLite REAL).
    F64(f64),

    /// Decimal value with arbitrary precision.
    Decimal(Decimal),

    /// Text data.
    Text(String),

    /// Binary data.
    Bytes(Vec<u8>),

    /// Date without time component.
    Date(NaiveDate),

    /// Time without date component.
    Time(NaiveTime),

    /// Timestamp without timezone (UTC by convention).
    DateTime(NaiveDateTime),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Short variant name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::I32(_) => "i32",
            SqlValue::I64(_) => "i64",
            SqlValue::F64(_) => "f64",
            SqlValue::Decimal(_) => "decimal",
            SqlValue::Text(_) => "text",
            SqlValue::Bytes(_) => "bytes",
            SqlValue::Date(_) => "date",
            SqlValue::Time(_) => "time",
            SqlValue::DateTime(_) => "datetime",
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
        SqlValue::I32(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
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

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => SqlValue::Null,
        }
    }
}

/// Ordered statement parameters, addressed 1-based like SQL placeholders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementParams {
    values: Vec<SqlValue>,
}

impl StatementParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
        }
    }

    /// Set the parameter at 1-based `index`, padding gaps with NULL.
    pub fn set(&mut self, index: usize, value: SqlValue) {
        debug_assert!(index >= 1, "statement parameters are 1-based");
        let slot = index.saturating_sub(1);
        if self.values.len() <= slot {
            self.values.resize(slot + 1, SqlValue::Null);
        }
        self.values[slot] = value;
    }

    /// Append a parameter; returns its 1-based index.
    pub fn push(&mut self, value: impl Into<SqlValue>) -> usize {
        self.values.push(value.into());
        self.values.len()
    }

    /// Index the next pushed parameter will receive.
    pub fn next_index(&self) -> usize {
        self.values.len() + 1
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[SqlValue] {
        &self.values
    }
}

impl From<Vec<SqlValue>> for StatementParams {
    fn from(values: Vec<SqlValue>) -> Self {
        Self { values }
    }
}

/// A result row as decoded by a driver.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlRow {
    values: Vec<SqlValue>,
}

impl SqlRow {
    pub fn new(values: Vec<SqlValue>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Native value at 0-based `column`.
    pub fn get(&self, column: usize) -> Result<&SqlValue> {
        self.values.get(column).ok_or_else(|| {
            DocrelError::InvalidValue(format!(
                "column {} out of range (row has {} columns)",
                column,
                self.values.len()
            ))
        })
    }

    /// Whether the value at `column` was SQL NULL.
    pub fn was_null(&self, column: usize) -> bool {
        self.values.get(column).map_or(true, SqlValue::is_null)
    }

    /// Integer column that may come back as either width (internal id columns,
    /// aggregates).
    pub fn get_i32(&self, column: usize) -> Result<Option<i32>> {
        match self.get(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::I32(v) => Ok(Some(*v)),
            SqlValue::I64(v) => i32::try_from(*v).map(Some).map_err(|_| {
                DocrelError::InvalidValue(format!("column {} value {} overflows i32", column, v))
            }),
            other => Err(DocrelError::InvalidValue(format!(
                "column {} expected integer, got {}",
                column,
                other.kind()
            ))),
        }
    }

    /// 64-bit integer column (counts).
    pub fn get_i64(&self, column: usize) -> Result<Option<i64>> {
        match self.get(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::I32(v) => Ok(Some(i64::from(*v))),
            SqlValue::I64(v) => Ok(Some(*v)),
            other => Err(DocrelError::InvalidValue(format!(
                "column {} expected integer, got {}",
                column,
                other.kind()
            ))),
        }
    }

    /// Text column.
    pub fn get_str(&self, column: usize) -> Result<Option<&str>> {
        match self.get(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Text(v) => Ok(Some(v.as_str())),
            other => Err(DocrelError::InvalidValue(format!(
                "column {} expected text, got {}",
                column,
                other.kind()
            ))),
        }
    }

    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }
}
