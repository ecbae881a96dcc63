//! Documents to doc-part rows.

use std::collections::BTreeMap;

use crate::backend::rid::RidGenerator;
use crate::error::{DocrelError, Result};
use crate::kv::{KvDocument, KvValue};
use crate::metainf::{MutableMetaSnapshot, TableRef, SCALAR_ELEMENT_FIELD};

use super::data::{CollectionData, DocPartData, DocPartRow};

/// Decomposes documents of one collection into rows, registering every
/// doc-part and field they need in a [`MutableMetaSnapshot`].
///
/// - a sub-document becomes one row of the child doc-part `[key]`, linked by
///   `pid`, with `seq` NULL;
/// - an array becomes one row per element in `[key]`, `seq` being the
///   element index; scalar elements are stored in the `$v` field and nested
///   arrays go one array dimension deeper;
/// - the parent stores a `Child` flag under the key: `true` for a
///   sub-document, `false` for an array.
pub struct D2RTranslator<'a> {
    meta: &'a mut MutableMetaSnapshot,
    rids: &'a RidGenerator,
    database: String,
    collection: String,
    dids: Vec<i32>,
    rows: BTreeMap<TableRef, Vec<DocPartRow>>,
}

type PendingRows = Vec<(TableRef, DocPartRow)>;

impl<'a> D2RTranslator<'a> {
    pub fn new(
        meta: &'a mut MutableMetaSnapshot,
        rids: &'a RidGenerator,
        database: &str,
        collection: &str,
    ) -> Self {
        Self {
            meta,
            rids,
            database: database.to_string(),
            collection: collection.to_string(),
            dids: Vec::new(),
            rows: BTreeMap::new(),
        }
    }

    /// Decompose one document and return its assigned id.
    ///
    /// A rejected document leaves no rows behind.
    pub fn translate(&mut self, document: &KvDocument) -> Result<i32> {
        validate_document(document)?;

        let root = TableRef::root();
        self.meta
            .ensure_doc_part(&self.database, &self.collection, &root)?;
        let did = self.next_rid(&root)?;

        let mut rows = Vec::new();
        self.document_row(&root, did, did, None, None, document, &mut rows)?;
        for (table_ref, row) in rows {
            self.rows.entry(table_ref).or_default().push(row);
        }
        self.dids.push(did);
        Ok(did)
    }

    /// Rows grouped per doc-part, bound to the final metadata of each.
    pub fn finish(self) -> Result<CollectionData> {
        if self.rows.is_empty() {
            return Ok(CollectionData::new(self.dids, BTreeMap::new()));
        }
        let collection = self
            .meta
            .snapshot()
            .collection(&self.database, &self.collection)
            .ok_or_else(|| {
                DocrelError::Precondition(format!(
                    "collection '{}.{}' not registered",
                    self.database, self.collection
                ))
            })?;

        let mut doc_parts = BTreeMap::new();
        for (table_ref, rows) in self.rows {
            let doc_part = collection.doc_part_by_table_ref(&table_ref).ok_or_else(|| {
                DocrelError::Precondition(format!("doc part {} not registered", table_ref))
            })?;
            doc_parts.insert(table_ref, DocPartData::new(doc_part, rows));
        }
        Ok(CollectionData::new(self.dids, doc_parts))
    }

    fn next_rid(&self, table_ref: &TableRef) -> Result<i32> {
        self.rids
            .next_rid(&self.database, &self.collection, table_ref)
    }

    #[allow(clippy::too_many_arguments)]
    fn document_row(
        &mut self,
        table_ref: &TableRef,
        did: i32,
        rid: i32,
        pid: Option<i32>,
        seq: Option<i32>,
        document: &KvDocument,
        out: &mut PendingRows,
    ) -> Result<()> {
        let mut values = Vec::with_capacity(document.len());
        let mut children = Vec::new();
        for (key, value) in document.iter() {
            let field = self.meta.ensure_field(
                &self.database,
                &self.collection,
                table_ref,
                key,
                value.field_type(),
            )?;
            let stored = self.column_value(table_ref.child_field(key), did, rid, value, &mut children)?;
            values.push((field, stored));
        }

        out.push((
            table_ref.clone(),
            DocPartRow {
                did,
                rid,
                pid,
                seq,
                values,
            },
        ));
        out.append(&mut children);
        Ok(())
    }

    /// The value stored in the parent column. Composite values push their
    /// rows into `out` and store the `Child` flag.
    fn column_value(
        &mut self,
        child_ref: TableRef,
        did: i32,
        parent_rid: i32,
        value: &KvValue,
        out: &mut PendingRows,
    ) -> Result<KvValue> {
        match value {
            KvValue::Document(sub) => {
                self.meta
                    .ensure_doc_part(&self.database, &self.collection, &child_ref)?;
                let rid = self.next_rid(&child_ref)?;
                self.document_row(&child_ref, did, rid, Some(parent_rid), None, sub, out)?;
                Ok(KvValue::Boolean(true))
            }
            KvValue::Array(items) => {
                self.meta
                    .ensure_doc_part(&self.database, &self.collection, &child_ref)?;
                for (index, item) in items.iter().enumerate() {
                    let seq = i32::try_from(index).map_err(|_| {
                        DocrelError::InvalidDocument(format!("array at {} is too long", child_ref))
                    })?;
                    let rid = self.next_rid(&child_ref)?;
                    if let KvValue::Document(sub) = item {
                        self.document_row(&child_ref, did, rid, Some(parent_rid), Some(seq), sub, out)?;
                        continue;
                    }

                    let field = self.meta.ensure_field(
                        &self.database,
                        &self.collection,
                        &child_ref,
                        SCALAR_ELEMENT_FIELD,
                        item.field_type(),
                    )?;
                    let mut nested = Vec::new();
                    let stored = self.column_value(child_ref.child_array(), did, rid, item, &mut nested)?;
                    out.push((
                        child_ref.clone(),
                        DocPartRow {
                            did,
                            rid,
                            pid: Some(parent_rid),
                            seq: Some(seq),
                            values: vec![(field, stored)],
                        },
                    ));
                    out.append(&mut nested);
                }
                Ok(KvValue::Boolean(false))
            }
            scalar => Ok(scalar.clone()),
        }
    }
}

/// Keys must be non-empty and must not start with `$`, at every level.
fn validate_document(document: &KvDocument) -> Result<()> {
    for (key, value) in document.iter() {
        if key.is_empty() {
            return Err(DocrelError::InvalidDocument("empty field name".into()));
        }
        if key.starts_with('$') {
            return Err(DocrelError::InvalidDocument(format!(
                "field name '{}' starts with '$'",
                key
            )));
        }
        validate_value(value)?;
    }
    Ok(())
}

fn validate_value(value: &KvValue) -> Result<()> {
    match value {
        KvValue::Document(sub) => validate_document(sub),
        KvValue::Array(items) => items.iter().try_for_each(validate_value),
        _ => Ok(()),
    }
}
