//! Per-type value codecs between document values and native column values.
//!
//! A [`SqlBinding`] owns one [`FieldType`] and converts in both directions:
//! `set` writes a [`KvValue`] into statement parameters, `get` reads a column
//! of a result row back into a [`KvValue`]. `get` returns `None` for SQL NULL,
//! which means "this row does not have the field", and is always decided by
//! an explicit [`SqlRow::was_null`] check after the native read.
//!
//! [`BindingRegistry`] resolves a type to its binding through an array
//! indexed by the closed [`FieldType`] enum. Dialects start from
//! [`BindingRegistry::common`] and replace the entries their storage differs
//! on with [`BindingRegistry::with_override`].

mod common;

pub use common::{
    BinaryBinding, BooleanBinding, ChildBinding, DateBinding, DecimalBinding, DoubleBinding,
    InstantBinding, IntegerBinding, LongBinding, NullBinding, ObjectIdBinding, StringBinding,
    TimeBinding,
};

use std::fmt;
use std::sync::Arc;

use crate::core::value::{SqlRow, SqlValue, StatementParams};
use crate::error::{DocrelError, Result};
use crate::kv::{FieldType, KvValue};

/// Bidirectional codec for one field type.
pub trait SqlBinding: Send + Sync + fmt::Debug {
    /// The type this binding serves.
    fn field_type(&self) -> FieldType;

    /// Read `column` of `row`; `None` when the column is SQL NULL.
    fn get(&self, row: &SqlRow, column: usize) -> Result<Option<KvValue>>;

    /// Write `value` as the 1-based parameter `index`.
    fn set(&self, params: &mut StatementParams, index: usize, value: &KvValue) -> Result<()>;
}

/// Field type → binding table.
#[derive(Debug, Clone)]
pub struct BindingRegistry {
    bindings: [Arc<dyn SqlBinding>; FieldType::COUNT],
}

impl BindingRegistry {
    /// Bindings for backends with native boolean, numeric and temporal types.
    pub fn common() -> Self {
        Self {
            bindings: [
                Arc::new(NullBinding),
                Arc::new(BooleanBinding),
                Arc::new(IntegerBinding),
                Arc::new(LongBinding),
                Arc::new(DoubleBinding),
                Arc::new(DecimalBinding),
                Arc::new(StringBinding),
                Arc::new(DateBinding),
                Arc::new(TimeBinding),
                Arc::new(InstantBinding),
                Arc::new(BinaryBinding),
                Arc::new(ObjectIdBinding),
                Arc::new(ChildBinding),
            ],
        }
    }

    /// Replace the binding for `binding.field_type()`.
    #[must_use]
    pub fn with_override(mut self, binding: Arc<dyn SqlBinding>) -> Self {
        let index = binding.field_type().index();
        self.bindings[index] = binding;
        self
    }

    pub fn binding(&self, field_type: FieldType) -> &dyn SqlBinding {
        self.bindings[field_type.index()].as_ref()
    }

    pub fn get(&self, field_type: FieldType, row: &SqlRow, column: usize) -> Result<Option<KvValue>> {
        self.binding(field_type).get(row, column)
    }

    pub fn set(
        &self,
        field_type: FieldType,
        params: &mut StatementParams,
        index: usize,
        value: &KvValue,
    ) -> Result<()> {
        self.binding(field_type).set(params, index, value)
    }
}

impl Default for BindingRegistry {
    fn default() -> Self {
        Self::common()
    }
}

/// Native read shared by every binding: the value, or `None` for SQL NULL.
pub(crate) fn read_native(row: &SqlRow, column: usize) -> Result<Option<&SqlValue>> {
    let native = row.get(column)?;
    if row.was_null(column) {
        return Ok(None);
    }
    Ok(Some(native))
}

pub(crate) fn native_mismatch(field_type: FieldType, native: &SqlValue) -> DocrelError {
    DocrelError::InvalidValue(format!(
        "{} binding cannot read native {} value",
        field_type,
        native.kind()
    ))
}

pub(crate) fn value_mismatch(field_type: FieldType, value: &KvValue) -> DocrelError {
    DocrelError::InvalidValue(format!(
        "{} binding cannot write a {} value",
        field_type,
        value.field_type()
    ))
}
