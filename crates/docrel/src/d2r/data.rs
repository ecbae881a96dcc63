//! Rows produced by decomposing documents, grouped per doc-part.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::kv::KvValue;
use crate::metainf::{MetaDocPart, MetaField, TableRef, TableRefOrder};

/// One row of a doc-part table.
///
/// Root rows use `did` as their row id and carry neither `pid` nor `seq`.
#[derive(Debug, Clone, PartialEq)]
pub struct DocPartRow {
    pub did: i32,
    pub rid: i32,
    pub pid: Option<i32>,
    /// Array index; `None` for sub-documents.
    pub seq: Option<i32>,
    pub values: Vec<(Arc<MetaField>, KvValue)>,
}

impl DocPartRow {
    /// Value stored in the column `identifier`, if this row has it.
    pub fn value(&self, identifier: &str) -> Option<&KvValue> {
        self.values
            .iter()
            .find(|(field, _)| field.identifier() == identifier)
            .map(|(_, value)| value)
    }
}

/// Rows to insert into one doc-part table.
#[derive(Debug, Clone)]
pub struct DocPartData {
    doc_part: Arc<MetaDocPart>,
    rows: Vec<DocPartRow>,
}

impl DocPartData {
    pub fn new(doc_part: Arc<MetaDocPart>, rows: Vec<DocPartRow>) -> Self {
        Self { doc_part, rows }
    }

    pub fn doc_part(&self) -> &Arc<MetaDocPart> {
        &self.doc_part
    }

    pub fn rows(&self) -> &[DocPartRow] {
        &self.rows
    }

    /// Fields used by at least one row, in registration order.
    pub fn columns(&self) -> Vec<Arc<MetaField>> {
        self.doc_part
            .fields()
            .iter()
            .filter(|field| {
                self.rows
                    .iter()
                    .any(|row| row.value(field.identifier()).is_some())
            })
            .cloned()
            .collect()
    }
}

/// Everything a batch of documents writes into one collection.
#[derive(Debug, Clone, Default)]
pub struct CollectionData {
    dids: Vec<i32>,
    doc_parts: BTreeMap<TableRef, DocPartData>,
}

impl CollectionData {
    pub fn new(dids: Vec<i32>, doc_parts: BTreeMap<TableRef, DocPartData>) -> Self {
        Self { dids, doc_parts }
    }

    /// Ids assigned to the documents, in input order.
    pub fn dids(&self) -> &[i32] {
        &self.dids
    }

    pub fn is_empty(&self) -> bool {
        self.dids.is_empty()
    }

    pub fn get(&self, table_ref: &TableRef) -> Option<&DocPartData> {
        self.doc_parts.get(table_ref)
    }

    pub fn doc_part_count(&self) -> usize {
        self.doc_parts.len()
    }

    /// Parents first for `Ascending` (insert order).
    pub fn doc_parts(&self, order: TableRefOrder) -> Vec<&DocPartData> {
        match order {
            TableRefOrder::Ascending => self.doc_parts.values().collect(),
            TableRefOrder::Descending => self.doc_parts.values().rev().collect(),
        }
    }
}
