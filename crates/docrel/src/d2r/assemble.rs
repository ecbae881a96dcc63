//! Doc-part rows back to documents.

use std::collections::HashMap;

use crate::backend::results::{DocPartResult, DocPartResults};
use crate::bindings::BindingRegistry;
use crate::core::value::SqlRow;
use crate::error::{DocrelError, Result};
use crate::kv::{FieldType, KvDocument, KvValue};
use crate::metainf::{TableRef, SCALAR_ELEMENT_FIELD};

/// Children waiting for their parent row, keyed by (doc-part, parent id).
type Pending = HashMap<(TableRef, i32), Vec<(Option<i32>, KvValue)>>;

/// Rebuilds documents from the rows of one fetched batch.
///
/// Results must come deepest first, so every child row is read before its
/// parent. Fields come back in registration order, which is not necessarily
/// the key order of the inserted document.
pub struct R2DTranslator<'a> {
    bindings: &'a BindingRegistry,
}

impl<'a> R2DTranslator<'a> {
    pub fn new(bindings: &'a BindingRegistry) -> Self {
        Self { bindings }
    }

    /// `(did, document)` pairs in the order the root rows were returned.
    pub fn translate(&self, results: &DocPartResults) -> Result<Vec<(i32, KvDocument)>> {
        let mut pending = Pending::new();
        let mut documents = Vec::with_capacity(results.dids().len());

        for result in results.iter() {
            let table_ref = result.doc_part().table_ref();
            for row in result.rows() {
                let did = required(row, 0, "did")?;
                if table_ref.is_root() {
                    let entries = self.entries(result, row, did, &mut pending)?;
                    documents.push((did, entries.into_iter().collect()));
                    continue;
                }

                let rid = required(row, 1, "rid")?;
                let pid = required(row, 2, "pid")?;
                let seq = row.get_i32(3)?;
                let mut entries = self.entries(result, row, rid, &mut pending)?;

                let scalar =
                    matches!(entries.as_slice(), [(name, _)] if name == SCALAR_ELEMENT_FIELD);
                let element = if scalar {
                    entries.pop().map_or(KvValue::Null, |(_, value)| value)
                } else {
                    KvValue::Document(entries.into_iter().collect())
                };
                pending
                    .entry((table_ref.clone(), pid))
                    .or_default()
                    .push((seq, element));
            }
        }

        Ok(documents)
    }

    /// Field values of one row, children resolved from `pending`.
    fn entries(
        &self,
        result: &DocPartResult,
        row: &SqlRow,
        id: i32,
        pending: &mut Pending,
    ) -> Result<Vec<(String, KvValue)>> {
        let doc_part = result.doc_part();
        let offset = result.internal_columns();
        let mut entries = Vec::new();

        for (index, field) in doc_part.fields().iter().enumerate() {
            let Some(value) = self
                .bindings
                .get(field.field_type(), row, offset + index)?
            else {
                continue;
            };

            let value = if field.field_type() == FieldType::Child {
                let child_ref = if field.name() == SCALAR_ELEMENT_FIELD {
                    doc_part.table_ref().child_array()
                } else {
                    doc_part.table_ref().child_field(field.name())
                };
                let mut children = pending.remove(&(child_ref, id)).unwrap_or_default();
                children.sort_by_key(|(seq, _)| *seq);
                let mut values = children.into_iter().map(|(_, value)| value);

                if value == KvValue::Boolean(true) {
                    values
                        .next()
                        .unwrap_or_else(|| KvValue::Document(KvDocument::new()))
                } else {
                    KvValue::Array(values.collect())
                }
            } else {
                value
            };
            entries.push((field.name().to_string(), value));
        }
        Ok(entries)
    }
}

fn required(row: &SqlRow, column: usize, name: &str) -> Result<i32> {
    row.get_i32(column)?
        .ok_or_else(|| DocrelError::InvalidValue(format!("internal column '{}' is NULL", name)))
}
