//! Binding overrides for SQLite storage classes.
//!
//! SQLite stores booleans as integers and has no native decimal or temporal
//! types; those are kept as text in formats that compare equal when the
//! values are equal. A bound NaN is stored as NULL, so NaN doubles are kept
//! as a text tag.

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;

use crate::bindings::{native_mismatch, read_native, value_mismatch, ChildBinding, SqlBinding};
use crate::core::value::{SqlRow, SqlValue, StatementParams};
use crate::error::{DocrelError, Result};
use crate::kv::{FieldType, KvValue};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";
const INSTANT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const NAN_TAG: &str = "NaN";

fn read_flag(field_type: FieldType, row: &SqlRow, column: usize) -> Result<Option<bool>> {
    match read_native(row, column)? {
        None => Ok(None),
        Some(SqlValue::I64(v)) => Ok(Some(*v != 0)),
        Some(SqlValue::I32(v)) => Ok(Some(*v != 0)),
        Some(SqlValue::Bool(v)) => Ok(Some(*v)),
        Some(other) => Err(native_mismatch(field_type, other)),
    }
}

fn read_text<'r>(field_type: FieldType, row: &'r SqlRow, column: usize) -> Result<Option<&'r str>> {
    match read_native(row, column)? {
        None => Ok(None),
        Some(SqlValue::Text(v)) => Ok(Some(v.as_str())),
        Some(other) => Err(native_mismatch(field_type, other)),
    }
}

fn parse_error(field_type: FieldType, text: &str, e: impl std::fmt::Display) -> DocrelError {
    DocrelError::InvalidValue(format!("cannot parse {} from '{}': {}", field_type, text, e))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteNullBinding;

impl SqlBinding for SqliteNullBinding {
    fn field_type(&self) -> FieldType {
        FieldType::Null
    }

    fn get(&self, row: &SqlRow, column: usize) -> Result<Option<KvValue>> {
        Ok(read_flag(FieldType::Null, row, column)?.map(|_| KvValue::Null))
    }

    fn set(&self, params: &mut StatementParams, index: usize, value: &KvValue) -> Result<()> {
        match value {
            KvValue::Null => {
                params.set(index, SqlValue::I64(1));
                Ok(())
            }
            other => Err(value_mismatch(FieldType::Null, other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteBooleanBinding;

impl SqlBinding for SqliteBooleanBinding {
    fn field_type(&self) -> FieldType {
        FieldType::Boolean
    }

    fn get(&self, row: &SqlRow, column: usize) -> Result<Option<KvValue>> {
        Ok(read_flag(FieldType::Boolean, row, column)?.map(KvValue::Boolean))
    }

    fn set(&self, params: &mut StatementParams, index: usize, value: &KvValue) -> Result<()> {
        match value {
            KvValue::Boolean(v) => {
                params.set(index, SqlValue::I64(i64::from(*v)));
                Ok(())
            }
            other => Err(value_mismatch(FieldType::Boolean, other)),
        }
    }
}

/// SQLite returns every integer as 64-bit.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteIntegerBinding;

impl SqlBinding for SqliteIntegerBinding {
    fn field_type(&self) -> FieldType {
        FieldType::Integer
    }

    fn get(&self, row: &SqlRow, column: usize) -> Result<Option<KvValue>> {
        match read_native(row, column)? {
            None => Ok(None),
            Some(SqlValue::I32(v)) => Ok(Some(KvValue::Integer(*v))),
            Some(SqlValue::I64(v)) => i32::try_from(*v)
                .map(|v| Some(KvValue::Integer(v)))
                .map_err(|_| DocrelError::InvalidValue(format!("{} overflows an integer field", v))),
            Some(other) => Err(native_mismatch(FieldType::Integer, other)),
        }
    }

    fn set(&self, params: &mut StatementParams, index: usize, value: &KvValue) -> Result<()> {
        match value {
            KvValue::Integer(v) => {
                params.set(index, SqlValue::I64(i64::from(*v)));
                Ok(())
            }
            other => Err(value_mismatch(FieldType::Integer, other)),
        }
    }
}

/// Doubles as REAL, except NaN which SQLite would turn into NULL.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDoubleBinding;

impl SqlBinding for SqliteDoubleBinding {
    fn field_type(&self) -> FieldType {
        FieldType::Double
    }

    fn get(&self, row: &SqlRow, column: usize) -> Result<Option<KvValue>> {
        match read_native(row, column)? {
            None => Ok(None),
            Some(SqlValue::F64(v)) => Ok(Some(KvValue::Double(*v))),
            // REAL affinity keeps integral values it was handed as integers
            Some(SqlValue::I64(v)) => Ok(Some(KvValue::Double(*v as f64))),
            Some(SqlValue::Text(v)) if v == NAN_TAG => Ok(Some(KvValue::Double(f64::NAN))),
            Some(SqlValue::Text(v)) => Err(parse_error(FieldType::Double, v, "not a NaN tag")),
            Some(other) => Err(native_mismatch(FieldType::Double, other)),
        }
    }

    fn set(&self, params: &mut StatementParams, index: usize, value: &KvValue) -> Result<()> {
        match value {
            KvValue::Double(v) if v.is_nan() => {
                params.set(index, SqlValue::Text(NAN_TAG.to_string()));
                Ok(())
            }
            KvValue::Double(v) => {
                params.set(index, SqlValue::F64(*v));
                Ok(())
            }
            other => Err(value_mismatch(FieldType::Double, other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDecimalBinding;

impl SqlBinding for SqliteDecimalBinding {
    fn field_type(&self) -> FieldType {
        FieldType::Decimal
    }

    fn get(&self, row: &SqlRow, column: usize) -> Result<Option<KvValue>> {
        read_text(FieldType::Decimal, row, column)?
            .map(|text| {
                Decimal::from_str(text)
                    .map(KvValue::Decimal)
                    .map_err(|e| parse_error(FieldType::Decimal, text, e))
            })
            .transpose()
    }

    fn set(&self, params: &mut StatementParams, index: usize, value: &KvValue) -> Result<()> {
        match value {
            KvValue::Decimal(v) => {
                params.set(index, SqlValue::Text(v.to_string()));
                Ok(())
            }
            other => Err(value_mismatch(FieldType::Decimal, other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDateBinding;

impl SqlBinding for SqliteDateBinding {
    fn field_type(&self) -> FieldType {
        FieldType::Date
    }

    fn get(&self, row: &SqlRow, column: usize) -> Result<Option<KvValue>> {
        read_text(FieldType::Date, row, column)?
            .map(|text| {
                NaiveDate::parse_from_str(text, DATE_FORMAT)
                    .map(KvValue::Date)
                    .map_err(|e| parse_error(FieldType::Date, text, e))
            })
            .transpose()
    }

    fn set(&self, params: &mut StatementParams, index: usize, value: &KvValue) -> Result<()> {
        match value {
            KvValue::Date(v) => {
                params.set(index, SqlValue::Text(v.format(DATE_FORMAT).to_string()));
                Ok(())
            }
            other => Err(value_mismatch(FieldType::Date, other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteTimeBinding;

impl SqlBinding for SqliteTimeBinding {
    fn field_type(&self) -> FieldType {
        FieldType::Time
    }

    fn get(&self, row: &SqlRow, column: usize) -> Result<Option<KvValue>> {
        read_text(FieldType::Time, row, column)?
            .map(|text| {
                NaiveTime::parse_from_str(text, TIME_FORMAT)
                    .map(KvValue::Time)
                    .map_err(|e| parse_error(FieldType::Time, text, e))
            })
            .transpose()
    }

    fn set(&self, params: &mut StatementParams, index: usize, value: &KvValue) -> Result<()> {
        match value {
            KvValue::Time(v) => {
                params.set(index, SqlValue::Text(v.format(TIME_FORMAT).to_string()));
                Ok(())
            }
            other => Err(value_mismatch(FieldType::Time, other)),
        }
    }
}

/// UTC, without offset.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteInstantBinding;

impl SqlBinding for SqliteInstantBinding {
    fn field_type(&self) -> FieldType {
        FieldType::Instant
    }

    fn get(&self, row: &SqlRow, column: usize) -> Result<Option<KvValue>> {
        read_text(FieldType::Instant, row, column)?
            .map(|text| {
                NaiveDateTime::parse_from_str(text, INSTANT_FORMAT)
                    .map(|v| KvValue::Instant(Utc.from_utc_datetime(&v)))
                    .map_err(|e| parse_error(FieldType::Instant, text, e))
            })
            .transpose()
    }

    fn set(&self, params: &mut StatementParams, index: usize, value: &KvValue) -> Result<()> {
        match value {
            KvValue::Instant(v) => {
                let text = v.naive_utc().format(INSTANT_FORMAT).to_string();
                params.set(index, SqlValue::Text(text));
                Ok(())
            }
            other => Err(value_mismatch(FieldType::Instant, other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteChildBinding;

impl SqlBinding for SqliteChildBinding {
    fn field_type(&self) -> FieldType {
        FieldType::Child
    }

    fn get(&self, row: &SqlRow, column: usize) -> Result<Option<KvValue>> {
        Ok(read_flag(FieldType::Child, row, column)?.map(KvValue::Boolean))
    }

    fn set(&self, params: &mut StatementParams, index: usize, value: &KvValue) -> Result<()> {
        let flag = ChildBinding::flag(value).ok_or_else(|| value_mismatch(FieldType::Child, value))?;
        params.set(index, SqlValue::I64(i64::from(flag)));
        Ok(())
    }
}
