//! Keyset-paginated cursors.
//!
//! A cursor owns the [`ConnectionLease`] it was created with. Each
//! `next_batch(max)` re-runs its statement for the `max` rows following the
//! last key seen, so no backend cursor or read lock stays open between
//! batches. A batch shorter than requested exhausts the cursor, which then
//! releases its connection; `close()` and drop release it too.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::debug;

use crate::core::traits::{ConnectionProvider, SqlConnection};
use crate::core::value::{SqlRow, SqlValue, StatementParams};
use crate::error::Result;

use super::connection::ConnectionLease;
use super::error_handler::{Context, ErrorHandler};

/// A statement paged by an integer key.
///
/// The statement takes the fixed `params` first, then the last key seen
/// (exclusive) and the page size as its two final parameters, and must order
/// by the key column.
#[derive(Debug, Clone)]
pub struct KeysetQuery {
    pub sql: String,
    pub params: StatementParams,
    /// Result column holding the key.
    pub key_column: usize,
}

impl KeysetQuery {
    pub fn new(sql: impl Into<String>, params: StatementParams, key_column: usize) -> Self {
        Self {
            sql: sql.into(),
            params,
            key_column,
        }
    }

    fn page_params(&self, after: i32, limit: usize) -> Vec<SqlValue> {
        let mut params = self.params.as_slice().to_vec();
        params.push(SqlValue::I32(after));
        params.push(SqlValue::I64(i64::try_from(limit).unwrap_or(i64::MAX)));
        params
    }
}

/// Cursor over the rows of a [`KeysetQuery`].
pub struct RowCursor<P: ConnectionProvider> {
    lease: Option<ConnectionLease<P>>,
    query: KeysetQuery,
    errors: Arc<ErrorHandler>,
    last_key: i32,
}

impl<P: ConnectionProvider> RowCursor<P> {
    pub fn new(lease: ConnectionLease<P>, query: KeysetQuery, errors: Arc<ErrorHandler>) -> Self {
        Self {
            lease: Some(lease),
            query,
            errors,
            last_key: i32::MIN,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.lease.is_none()
    }

    /// Up to `max` further rows. Fewer than `max` exhausts the cursor.
    pub async fn next_batch(&mut self, max: usize) -> Result<Vec<SqlRow>> {
        if max == 0 {
            return Ok(Vec::new());
        }
        let Some(lease) = self.lease.as_mut() else {
            return Ok(Vec::new());
        };

        let params = self.query.page_params(self.last_key, max);
        let rows = match lease.query(&self.query.sql, &params).await {
            Ok(rows) => rows,
            Err(e) => {
                self.close();
                return Err(self.errors.handle_exception(Context::Fetch, e));
            }
        };

        if let Some(last) = rows.last() {
            match last.get_i32(self.query.key_column) {
                Ok(Some(key)) => self.last_key = key,
                Ok(None) => {}
                Err(e) => {
                    self.close();
                    return Err(e);
                }
            }
        }
        if rows.len() < max {
            debug!("Cursor exhausted after key {}", self.last_key);
            self.close();
        }
        Ok(rows)
    }

    /// The connection the cursor pages on, while it is open.
    pub fn connection_mut(&mut self) -> Option<&mut P::Connection> {
        self.lease.as_deref_mut()
    }

    /// Release the connection; further batches are empty.
    pub fn close(&mut self) {
        self.lease = None;
    }
}

enum DidSource<P: ConnectionProvider> {
    Query(RowCursor<P>),
    Ids(VecDeque<i32>),
}

/// Single-use cursor over document ids, ascending.
pub struct DidCursor<P: ConnectionProvider> {
    source: DidSource<P>,
}

impl<P: ConnectionProvider> DidCursor<P> {
    /// An already exhausted cursor holding no connection.
    pub fn empty() -> Self {
        Self::from_ids(Vec::new())
    }

    /// In-memory cursor over ids the caller already holds.
    pub fn from_ids(ids: Vec<i32>) -> Self {
        Self {
            source: DidSource::Ids(ids.into()),
        }
    }

    /// Cursor over column 0 of `query`.
    pub fn from_query(lease: ConnectionLease<P>, query: KeysetQuery, errors: Arc<ErrorHandler>) -> Self {
        Self {
            source: DidSource::Query(RowCursor::new(lease, query, errors)),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        match &self.source {
            DidSource::Query(rows) => rows.is_exhausted(),
            DidSource::Ids(ids) => ids.is_empty(),
        }
    }

    pub async fn next_batch(&mut self, max: usize) -> Result<Vec<i32>> {
        match &mut self.source {
            DidSource::Ids(ids) => {
                let take = max.min(ids.len());
                Ok(ids.drain(..take).collect())
            }
            DidSource::Query(rows) => {
                let batch = rows.next_batch(max).await?;
                let mut dids = Vec::with_capacity(batch.len());
                for row in &batch {
                    if let Some(did) = row.get_i32(0)? {
                        dids.push(did);
                    }
                }
                Ok(dids)
            }
        }
    }

    /// The open connection of a query cursor, so work for the ids it returns
    /// can run without leasing a second one. `None` once exhausted and for
    /// in-memory cursors.
    pub fn connection_mut(&mut self) -> Option<&mut P::Connection> {
        match &mut self.source {
            DidSource::Query(rows) => rows.connection_mut(),
            DidSource::Ids(_) => None,
        }
    }

    /// Drain the cursor in batches of `batch_size`.
    pub async fn collect_all(&mut self, batch_size: usize) -> Result<Vec<i32>> {
        let mut all = Vec::new();
        while !self.is_exhausted() {
            all.extend(self.next_batch(batch_size.max(1)).await?);
        }
        Ok(all)
    }

    pub fn close(&mut self) {
        match &mut self.source {
            DidSource::Query(rows) => rows.close(),
            DidSource::Ids(ids) => ids.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::RecordingProvider;
    use crate::error::{DocrelError, SqlError};

    fn ids(values: &[i32]) -> Vec<Vec<SqlValue>> {
        values.iter().map(|&v| vec![SqlValue::I32(v)]).collect()
    }

    async fn query_cursor(provider: &RecordingProvider) -> DidCursor<RecordingProvider> {
        let lease = ConnectionLease::acquire(provider).await.unwrap();
        let query = KeysetQuery::new("SELECT did", StatementParams::new(), 0);
        DidCursor::from_query(lease, query, Arc::new(ErrorHandler::new(Vec::new())))
    }

    #[tokio::test]
    async fn test_empty_cursor() {
        let mut cursor: DidCursor<RecordingProvider> = DidCursor::empty();
        assert!(cursor.is_exhausted());
        assert!(cursor.next_batch(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_from_ids_batches() {
        let mut cursor: DidCursor<RecordingProvider> = DidCursor::from_ids(vec![1, 2, 3]);
        assert_eq!(cursor.next_batch(2).await.unwrap(), vec![1, 2]);
        assert!(!cursor.is_exhausted());
        assert_eq!(cursor.next_batch(2).await.unwrap(), vec![3]);
        assert!(cursor.is_exhausted());
    }

    #[tokio::test]
    async fn test_keyset_paging_and_release() {
        let provider = RecordingProvider::new();
        provider.push_rows(ids(&[1, 4]));
        provider.push_rows(ids(&[9]));

        let mut cursor = query_cursor(&provider).await;
        assert_eq!(cursor.next_batch(2).await.unwrap(), vec![1, 4]);
        assert!(!cursor.is_exhausted());
        assert_eq!(provider.outstanding(), 1);

        assert_eq!(cursor.next_batch(2).await.unwrap(), vec![9]);
        assert!(cursor.is_exhausted());
        assert_eq!(provider.outstanding(), 0);

        // Second page starts after the last key of the first
        assert_eq!(provider.params(0), vec![SqlValue::I32(i32::MIN), SqlValue::I64(2)]);
        assert_eq!(provider.params(1), vec![SqlValue::I32(4), SqlValue::I64(2)]);
    }

    #[tokio::test]
    async fn test_close_releases_connection() {
        let provider = RecordingProvider::new();
        let mut cursor = query_cursor(&provider).await;
        cursor.close();
        assert!(cursor.is_exhausted());
        assert_eq!(provider.outstanding(), 0);
        assert!(cursor.next_batch(5).await.unwrap().is_empty());
        assert!(provider.statements().is_empty());
    }

    #[tokio::test]
    async fn test_drop_releases_connection() {
        let provider = RecordingProvider::new();
        drop(query_cursor(&provider).await);
        assert_eq!(provider.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_failure_closes_cursor() {
        let provider = RecordingProvider::new();
        provider.push_error(SqlError::with_sqlstate("57014", "canceled"));
        let mut cursor = query_cursor(&provider).await;

        let err = cursor.next_batch(10).await.unwrap_err();
        assert!(matches!(err, DocrelError::System { context: Context::Fetch, .. }));
        assert!(cursor.is_exhausted());
        assert_eq!(provider.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_connection_available_until_exhausted() {
        let provider = RecordingProvider::new();
        provider.push_rows(ids(&[1, 2]));
        provider.push_rows(ids(&[3]));

        let mut cursor = query_cursor(&provider).await;
        cursor.next_batch(2).await.unwrap();
        assert!(cursor.connection_mut().is_some());
        cursor.next_batch(2).await.unwrap();
        assert!(cursor.connection_mut().is_none());

        let mut cursor: DidCursor<RecordingProvider> = DidCursor::from_ids(vec![1]);
        assert!(cursor.connection_mut().is_none());
    }

    #[tokio::test]
    async fn test_collect_all() {
        let provider = RecordingProvider::new();
        provider.push_rows(ids(&[1, 2]));
        provider.push_rows(ids(&[3, 4]));
        provider.push_rows(ids(&[]));

        let mut cursor = query_cursor(&provider).await;
        assert_eq!(cursor.collect_all(2).await.unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(provider.statements().len(), 3);
    }
}
