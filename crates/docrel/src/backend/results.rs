//! Rows fetched for a batch of documents.

use std::sync::Arc;

use crate::core::value::SqlRow;
use crate::metainf::{MetaDocPart, TableRef};

/// The rows of one doc-part for one batch of dids.
///
/// Columns are the internal columns (`did` for the root; `did, rid, pid, seq`
/// otherwise) followed by `doc_part.fields()` in order.
#[derive(Debug, Clone)]
pub struct DocPartResult {
    doc_part: Arc<MetaDocPart>,
    rows: Vec<SqlRow>,
}

impl DocPartResult {
    pub fn new(doc_part: Arc<MetaDocPart>, rows: Vec<SqlRow>) -> Self {
        Self { doc_part, rows }
    }

    pub fn empty(doc_part: Arc<MetaDocPart>) -> Self {
        Self::new(doc_part, Vec::new())
    }

    pub fn doc_part(&self) -> &Arc<MetaDocPart> {
        &self.doc_part
    }

    pub fn rows(&self) -> &[SqlRow] {
        &self.rows
    }

    /// Number of internal columns preceding the field columns.
    pub fn internal_columns(&self) -> usize {
        if self.doc_part.is_root() {
            1
        } else {
            4
        }
    }
}

/// One entry per doc-part of the collection, deepest first.
#[derive(Debug, Clone, Default)]
pub struct DocPartResults {
    dids: Vec<i32>,
    results: Vec<DocPartResult>,
}

impl DocPartResults {
    pub fn new(dids: Vec<i32>, results: Vec<DocPartResult>) -> Self {
        Self { dids, results }
    }

    /// The dids this batch was fetched for.
    pub fn dids(&self) -> &[i32] {
        &self.dids
    }

    pub fn is_empty(&self) -> bool {
        self.dids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DocPartResult> {
        self.results.iter()
    }

    pub fn get(&self, table_ref: &TableRef) -> Option<&DocPartResult> {
        self.results
            .iter()
            .find(|r| r.doc_part().table_ref() == table_ref)
    }
}
