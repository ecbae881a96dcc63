//! Read interface: document ids and doc-part rows.
//!
//! Every operation holds at most one connection at a time through a
//! [`ConnectionLease`]. Cursors take ownership of the lease they were created
//! with, and row fetches for a cursor's ids run on that same lease while the
//! cursor is open; the other operations release theirs before returning.

use std::sync::Arc;

use tracing::debug;

use crate::core::traits::{ConnectionProvider, Dialect, SqlConnection};
use crate::core::value::{SqlValue, StatementParams};
use crate::error::{DocrelError, Result};
use crate::kv::KvValue;
use crate::metainf::{MetaCollection, MetaDatabase, MetaDocPart, MetaField, TableRefOrder};

use super::connection::ConnectionLease;
use super::cursor::{DidCursor, KeysetQuery};
use super::error_handler::Context;
use super::results::{DocPartResult, DocPartResults};
use super::sql_interface::SqlInterface;

pub struct ReadInterface<P: ConnectionProvider> {
    provider: P,
    sql: Arc<SqlInterface>,
}

impl<P: ConnectionProvider> Clone for ReadInterface<P> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            sql: Arc::clone(&self.sql),
        }
    }
}

impl<P: ConnectionProvider> ReadInterface<P> {
    pub fn new(provider: P, sql: Arc<SqlInterface>) -> Self {
        Self { provider, sql }
    }

    /// Ids of documents whose `field` in `doc_part` equals `value`.
    ///
    /// The value is bound through the binding of the field's type, so it
    /// must be a value of that type.
    pub async fn find_doc_ids_by_field_equal_to(
        &self,
        db: &MetaDatabase,
        collection: &MetaCollection,
        doc_part: &MetaDocPart,
        field: &MetaField,
        value: &KvValue,
    ) -> Result<DidCursor<P>> {
        check_ownership(db, collection, doc_part, Some(field))?;

        let sql = self
            .sql
            .dialect()
            .build_dids_by_field_equal_to(db.identifier(), doc_part, field);
        let mut params = StatementParams::with_capacity(3);
        self.sql
            .bindings()
            .set(field.field_type(), &mut params, 1, value)?;

        let lease = ConnectionLease::acquire(&self.provider).await?;
        Ok(DidCursor::from_query(
            lease,
            KeysetQuery::new(sql, params, 0),
            Arc::clone(self.sql.errors()),
        ))
    }

    /// Ids of every document of the collection.
    pub async fn find_all_doc_ids(
        &self,
        db: &MetaDatabase,
        collection: &MetaCollection,
    ) -> Result<DidCursor<P>> {
        let Some(root) = collection.root_doc_part() else {
            return Ok(DidCursor::empty());
        };
        check_ownership(db, collection, &root, None)?;

        let sql = self.sql.dialect().build_all_dids(db.identifier(), &root);
        let lease = ConnectionLease::acquire(&self.provider).await?;
        Ok(DidCursor::from_query(
            lease,
            KeysetQuery::new(sql, StatementParams::new(), 0),
            Arc::clone(self.sql.errors()),
        ))
    }

    /// Pull up to `batch_size` ids from `cursor` and fetch the rows of every
    /// doc-part for them, deepest doc-part first.
    pub async fn fetch_rows_for_doc_ids(
        &self,
        db: &MetaDatabase,
        collection: &MetaCollection,
        cursor: &mut DidCursor<P>,
        batch_size: usize,
    ) -> Result<DocPartResults> {
        let dids = cursor.next_batch(batch_size).await?;
        let doc_parts = collection.doc_parts(TableRefOrder::Descending);

        if dids.is_empty() {
            let empty = doc_parts.into_iter().map(DocPartResult::empty).collect();
            return Ok(DocPartResults::new(dids, empty));
        }

        let params: Vec<SqlValue> = dids.iter().map(|&did| SqlValue::I32(did)).collect();
        // An exhausted or in-memory cursor has already given its lease back
        let mut own_lease = None;
        let conn = match cursor.connection_mut() {
            Some(conn) => conn,
            None => &mut **own_lease.insert(ConnectionLease::acquire(&self.provider).await?),
        };

        let mut results = Vec::with_capacity(doc_parts.len());
        for doc_part in doc_parts {
            let sql = self
                .sql
                .dialect()
                .build_doc_part_select(db.identifier(), &doc_part, dids.len());
            let rows = self
                .sql
                .query(&mut *conn, Context::Fetch, &sql, &params)
                .await?;
            results.push(DocPartResult::new(doc_part, rows));
        }

        debug!(
            "Fetched {} documents of {}.{} across {} doc parts",
            dids.len(),
            db.name(),
            collection.name(),
            results.len()
        );
        Ok(DocPartResults::new(dids, results))
    }

    /// Highest row id stored in `doc_part`; `None` when the table is empty.
    ///
    /// Failures are never retryable: the call runs during startup, outside
    /// any unit of work that could be retried.
    pub async fn last_row_id_used(
        &self,
        db: &MetaDatabase,
        collection: &MetaCollection,
        doc_part: &MetaDocPart,
    ) -> Result<Option<i32>> {
        check_ownership(db, collection, doc_part, None)?;

        let sql = self
            .sql
            .dialect()
            .build_last_row_id_used(db.identifier(), doc_part);
        let mut lease = ConnectionLease::acquire(&self.provider).await?;
        let rows = match lease.query(&sql, &[]).await {
            Ok(rows) => rows,
            Err(e) => {
                return Err(match self.sql.errors().handle_exception(Context::Ddl, e) {
                    DocrelError::Rollback { context, source } => {
                        DocrelError::System { context, source }
                    }
                    other => other,
                })
            }
        };

        match rows.first() {
            Some(row) => row.get_i32(0),
            None => Ok(None),
        }
    }

    /// Number of documents in the collection.
    pub async fn count_documents(&self, db: &MetaDatabase, collection: &MetaCollection) -> Result<u64> {
        let Some(root) = collection.root_doc_part() else {
            return Ok(0);
        };
        let sql = self.sql.dialect().build_count_dids(db.identifier(), &root);
        let mut lease = ConnectionLease::acquire(&self.provider).await?;
        let rows = self
            .sql
            .query(&mut *lease, Context::Fetch, &sql, &[])
            .await?;
        let count = match rows.first() {
            Some(row) => row.get_i64(0)?.unwrap_or(0),
            None => 0,
        };
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

/// The database must own the collection, the collection the doc-part and the
/// doc-part the field, each looked up by identifier.
fn check_ownership(
    db: &MetaDatabase,
    collection: &MetaCollection,
    doc_part: &MetaDocPart,
    field: Option<&MetaField>,
) -> Result<()> {
    let owned = db
        .collection_by_identifier(collection.identifier())
        .is_some_and(|c| c.name() == collection.name());
    if !owned {
        return Err(DocrelError::Precondition(format!(
            "database '{}' does not contain collection '{}'",
            db.name(),
            collection.name()
        )));
    }

    let owned = collection
        .doc_part_by_identifier(doc_part.identifier())
        .is_some_and(|d| d.table_ref() == doc_part.table_ref());
    if !owned {
        return Err(DocrelError::Precondition(format!(
            "collection '{}' does not contain doc part '{}'",
            collection.name(),
            doc_part.identifier()
        )));
    }

    if let Some(field) = field {
        let owned = doc_part
            .field_by_identifier(field.identifier())
            .is_some_and(|f| f.name() == field.name() && f.field_type() == field.field_type());
        if !owned {
            return Err(DocrelError::Precondition(format!(
                "doc part '{}' does not contain field '{}'",
                doc_part.identifier(),
                field.identifier()
            )));
        }
    }
    Ok(())
}
