//! Bindings for backends with native types for every scalar (PostgreSQL).

use chrono::{TimeZone, Utc};

use crate::core::value::{SqlRow, SqlValue, StatementParams};
use crate::error::Result;
use crate::kv::{FieldType, KvValue};

use super::{native_mismatch, read_native, value_mismatch, SqlBinding};

/// `Null` fields are stored as a non-null marker in a boolean column; the
/// column being NULL means the row has no such field.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBinding;

impl SqlBinding for NullBinding {
    fn field_type(&self) -> FieldType {
        FieldType::Null
    }

    fn get(&self, row: &SqlRow, column: usize) -> Result<Option<KvValue>> {
        match read_native(row, column)? {
            None => Ok(None),
            Some(SqlValue::Bool(_)) => Ok(Some(KvValue::Null)),
            Some(other) => Err(native_mismatch(FieldType::Null, other)),
        }
    }

    fn set(&self, params: &mut StatementParams, index: usize, value: &KvValue) -> Result<()> {
        match value {
            KvValue::Null => {
                params.set(index, SqlValue::Bool(true));
                Ok(())
            }
            other => Err(value_mismatch(FieldType::Null, other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanBinding;

impl SqlBinding for BooleanBinding {
    fn field_type(&self) -> FieldType {
        FieldType::Boolean
    }

    fn get(&self, row: &SqlRow, column: usize) -> Result<Option<KvValue>> {
        match read_native(row, column)? {
            None => Ok(None),
            Some(SqlValue::Bool(v)) => Ok(Some(KvValue::Boolean(*v))),
            Some(other) => Err(native_mismatch(FieldType::Boolean, other)),
        }
    }

    fn set(&self, params: &mut StatementParams, index: usize, value: &KvValue) -> Result<()> {
        match value {
            KvValue::Boolean(v) => {
                params.set(index, SqlValue::Bool(*v));
                Ok(())
            }
            other => Err(value_mismatch(FieldType::Boolean, other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerBinding;

impl SqlBinding for IntegerBinding {
    fn field_type(&self) -> FieldType {
        FieldType::Integer
    }

    fn get(&self, row: &SqlRow, column: usize) -> Result<Option<KvValue>> {
        match read_native(row, column)? {
            None => Ok(None),
            Some(SqlValue::I32(v)) => Ok(Some(KvValue::Integer(*v))),
            Some(other) => Err(native_mismatch(FieldType::Integer, other)),
        }
    }

    fn set(&self, params: &mut StatementParams, index: usize, value: &KvValue) -> Result<()> {
        match value {
            KvValue::Integer(v) => {
                params.set(index, SqlValue::I32(*v));
                Ok(())
            }
            other => Err(value_mismatch(FieldType::Integer, other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LongBinding;

impl SqlBinding for LongBinding {
    fn field_type(&self) -> FieldType {
        FieldType::Long
    }

    fn get(&self, row: &SqlRow, column: usize) -> Result<Option<KvValue>> {
        match read_native(row, column)? {
            None => Ok(None),
            Some(SqlValue::I64(v)) => Ok(Some(KvValue::Long(*v))),
            Some(other) => Err(native_mismatch(FieldType::Long, other)),
        }
    }

    fn set(&self, params: &mut StatementParams, index: usize, value: &KvValue) -> Result<()> {
        match value {
            KvValue::Long(v) => {
                params.set(index, SqlValue::I64(*v));
                Ok(())
            }
            other => Err(value_mismatch(FieldType::Long, other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DoubleBinding;

impl SqlBinding for DoubleBinding {
    fn field_type(&self) -> FieldType {
        FieldType::Double
    }

    fn get(&self, row: &SqlRow, column: usize) -> Result<Option<KvValue>> {
        match read_native(row, column)? {
            None => Ok(None),
            Some(SqlValue::F64(v)) => Ok(Some(KvValue::Double(*v))),
            Some(other) => Err(native_mismatch(FieldType::Double, other)),
        }
    }

    fn set(&self, params: &mut StatementParams, index: usize, value: &KvValue) -> Result<()> {
        match value {
            KvValue::Double(v) => {
                params.set(index, SqlValue::F64(*v));
                Ok(())
            }
            other => Err(value_mismatch(FieldType::Double, other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DecimalBinding;

impl SqlBinding for DecimalBinding {
    fn field_type(&self) -> FieldType {
        FieldType::Decimal
    }

    fn get(&self, row: &SqlRow, column: usize) -> Result<Option<KvValue>> {
        match read_native(row, column)? {
            None => Ok(None),
            Some(SqlValue::Decimal(v)) => Ok(Some(KvValue::Decimal(*v))),
            Some(other) => Err(native_mismatch(FieldType::Decimal, other)),
        }
    }

    fn set(&self, params: &mut StatementParams, index: usize, value: &KvValue) -> Result<()> {
        match value {
            KvValue::Decimal(v) => {
                params.set(index, SqlValue::Decimal(*v));
                Ok(())
            }
            other => Err(value_mismatch(FieldType::Decimal, other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StringBinding;

impl SqlBinding for StringBinding {
    fn field_type(&self) -> FieldType {
        FieldType::String
    }

    fn get(&self, row: &SqlRow, column: usize) -> Result<Option<KvValue>> {
        match read_native(row, column)? {
            None => Ok(None),
            Some(SqlValue::Text(v)) => Ok(Some(KvValue::String(v.clone()))),
            Some(other) => Err(native_mismatch(FieldType::String, other)),
        }
    }

    fn set(&self, params: &mut StatementParams, index: usize, value: &KvValue) -> Result<()> {
        match value {
            KvValue::String(v) => {
                params.set(index, SqlValue::Text(v.clone()));
                Ok(())
            }
            other => Err(value_mismatch(FieldType::String, other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DateBinding;

impl SqlBinding for DateBinding {
    fn field_type(&self) -> FieldType {
        FieldType::Date
    }

    fn get(&self, row: &SqlRow, column: usize) -> Result<Option<KvValue>> {
        match read_native(row, column)? {
            None => Ok(None),
            Some(SqlValue::Date(v)) => Ok(Some(KvValue::Date(*v))),
            Some(other) => Err(native_mismatch(FieldType::Date, other)),
        }
    }

    fn set(&self, params: &mut StatementParams, index: usize, value: &KvValue) -> Result<()> {
        match value {
            KvValue::Date(v) => {
                params.set(index, SqlValue::Date(*v));
                Ok(())
            }
            other => Err(value_mismatch(FieldType::Date, other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TimeBinding;

impl SqlBinding for TimeBinding {
    fn field_type(&self) -> FieldType {
        FieldType::Time
    }

    fn get(&self, row: &SqlRow, column: usize) -> Result<Option<KvValue>> {
        match read_native(row, column)? {
            None => Ok(None),
            Some(SqlValue::Time(v)) => Ok(Some(KvValue::Time(*v))),
            Some(other) => Err(native_mismatch(FieldType::Time, other)),
        }
    }

    fn set(&self, params: &mut StatementParams, index: usize, value: &KvValue) -> Result<()> {
        match value {
            KvValue::Time(v) => {
                params.set(index, SqlValue::Time(*v));
                Ok(())
            }
            other => Err(value_mismatch(FieldType::Time, other)),
        }
    }
}

/// Instants are stored as timezone-less timestamps in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstantBinding;

impl SqlBinding for InstantBinding {
    fn field_type(&self) -> FieldType {
        FieldType::Instant
    }

    fn get(&self, row: &SqlRow, column: usize) -> Result<Option<KvValue>> {
        match read_native(row, column)? {
            None => Ok(None),
            Some(SqlValue::DateTime(v)) => Ok(Some(KvValue::Instant(Utc.from_utc_datetime(v)))),
            Some(other) => Err(native_mismatch(FieldType::Instant, other)),
        }
    }

    fn set(&self, params: &mut StatementParams, index: usize, value: &KvValue) -> Result<()> {
        match value {
            KvValue::Instant(v) => {
                params.set(index, SqlValue::DateTime(v.naive_utc()));
                Ok(())
            }
            other => Err(value_mismatch(FieldType::Instant, other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryBinding;

impl SqlBinding for BinaryBinding {
    fn field_type(&self) -> FieldType {
        FieldType::Binary
    }

    fn get(&self, row: &SqlRow, column: usize) -> Result<Option<KvValue>> {
        match read_native(row, column)? {
            None => Ok(None),
            Some(SqlValue::Bytes(v)) => Ok(Some(KvValue::Binary(v.clone()))),
            Some(other) => Err(native_mismatch(FieldType::Binary, other)),
        }
    }

    fn set(&self, params: &mut StatementParams, index: usize, value: &KvValue) -> Result<()> {
        match value {
            KvValue::Binary(v) => {
                params.set(index, SqlValue::Bytes(v.clone()));
                Ok(())
            }
            other => Err(value_mismatch(FieldType::Binary, other)),
        }
    }
}

/// 12-byte object ids in a binary column.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectIdBinding;

impl SqlBinding for ObjectIdBinding {
    fn field_type(&self) -> FieldType {
        FieldType::ObjectId
    }

    fn get(&self, row: &SqlRow, column: usize) -> Result<Option<KvValue>> {
        match read_native(row, column)? {
            None => Ok(None),
            Some(SqlValue::Bytes(v)) => {
                let id: [u8; 12] = v
                    .as_slice()
                    .try_into()
                    .map_err(|_| native_mismatch(FieldType::ObjectId, &SqlValue::Bytes(v.clone())))?;
                Ok(Some(KvValue::ObjectId(id)))
            }
            Some(other) => Err(native_mismatch(FieldType::ObjectId, other)),
        }
    }

    fn set(&self, params: &mut StatementParams, index: usize, value: &KvValue) -> Result<()> {
        match value {
            KvValue::ObjectId(v) => {
                params.set(index, SqlValue::Bytes(v.to_vec()));
                Ok(())
            }
            other => Err(value_mismatch(FieldType::ObjectId, other)),
        }
    }
}

/// Link column towards a child doc-part. The payload is the sub-document
/// flag: `true` for a sub-document, `false` for an array.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChildBinding;

impl ChildBinding {
    /// The flag a composite value (or an explicit flag) is stored as.
    pub fn flag(value: &KvValue) -> Option<bool> {
        match value {
            KvValue::Boolean(flag) => Some(*flag),
            KvValue::Document(_) => Some(true),
            KvValue::Array(_) => Some(false),
            _ => None,
        }
    }
}

impl SqlBinding for ChildBinding {
    fn field_type(&self) -> FieldType {
        FieldType::Child
    }

    fn get(&self, row: &SqlRow, column: usize) -> Result<Option<KvValue>> {
        match read_native(row, column)? {
            None => Ok(None),
            Some(SqlValue::Bool(v)) => Ok(Some(KvValue::Boolean(*v))),
            Some(other) => Err(native_mismatch(FieldType::Child, other)),
        }
    }

    fn set(&self, params: &mut StatementParams, index: usize, value: &KvValue) -> Result<()> {
        let flag = ChildBinding::flag(value).ok_or_else(|| value_mismatch(FieldType::Child, value))?;
        params.set(index, SqlValue::Bool(flag));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::KvDocument;

    #[test]
    fn test_null_marker() {
        let mut params = StatementParams::new();
        NullBinding.set(&mut params, 1, &KvValue::Null).unwrap();
        assert_eq!(params.as_slice(), &[SqlValue::Bool(true)]);
    }

    #[test]
    fn test_object_id_wrong_length() {
        let row = SqlRow::new(vec![SqlValue::Bytes(vec![1, 2, 3])]);
        assert!(ObjectIdBinding.get(&row, 0).is_err());
    }

    #[test]
    fn test_instant_stored_as_utc() {
        let instant = Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap();
        let mut params = StatementParams::new();
        InstantBinding
            .set(&mut params, 1, &KvValue::Instant(instant))
            .unwrap();
        assert_eq!(params.as_slice(), &[SqlValue::DateTime(instant.naive_utc())]);
    }

    #[test]
    fn test_child_flag_from_composites() {
        assert_eq!(
            ChildBinding::flag(&KvValue::Document(KvDocument::new())),
            Some(true)
        );
        assert_eq!(ChildBinding::flag(&KvValue::Array(vec![])), Some(false));
        assert_eq!(ChildBinding::flag(&KvValue::Integer(1)), None);
    }
}
