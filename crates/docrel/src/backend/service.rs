//! Document-level operations over one backend.
//!
//! A write runs in three steps:
//!
//! 1. decompose the documents against a private copy of the metadata,
//! 2. create the new structures and record them in the metadata tables, in
//!    autocommit (a concurrent writer creating them too is benign), then
//!    publish them in the shared repository,
//! 3. insert the rows in one transaction.
//!
//! Step 2 runs one writer at a time per backend and starts by checking the
//! new entries against the current metadata. When another process recorded
//! a conflicting entry first, the metadata is reloaded from the backend.
//! Either way the write fails with `MetaConflict` before touching any row.
//!
//! A retryable failure anywhere re-runs the whole write under the
//! [`RetryPolicy`].

use std::sync::Arc;

use futures::future::try_join_all;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{BackendKind, Config};
use crate::core::traits::{ConnectionProvider, Dialect, SqlConnection};
use crate::d2r::{D2RTranslator, R2DTranslator};
use crate::drivers::postgres::PgConnectionProvider;
use crate::drivers::sqlite::SqliteConnectionProvider;
use crate::drivers::DialectImpl;
use crate::error::{DocrelError, Result};
use crate::kv::{KvDocument, KvValue};
use crate::metainf::{ImmutableMetaSnapshot, MetainfoRepository, MutableMetaSnapshot, TableRef, TableRefOrder};

use super::connection::ConnectionLease;
use super::cursor::DidCursor;
use super::error_handler::Context;
use super::meta_tables::MetaTables;
use super::read::ReadInterface;
use super::retry::RetryPolicy;
use super::rid::RidGenerator;
use super::sql_interface::SqlInterface;
use super::write::WriteInterface;

/// Default number of documents fetched per batch.
pub const DEFAULT_FETCH_BATCH: usize = 100;

pub struct Backend<P: ConnectionProvider> {
    provider: P,
    sql: Arc<SqlInterface>,
    read: ReadInterface<P>,
    write: WriteInterface<P>,
    meta_tables: MetaTables,
    repository: MetainfoRepository,
    // Serializes structure creation and metadata recording
    structure: Mutex<()>,
    rids: RidGenerator,
    retry: RetryPolicy,
    fetch_batch: usize,
}

impl<P: ConnectionProvider> Backend<P> {
    /// Create the metadata tables if needed, load the metadata and seed row
    /// id counters from the stored data.
    pub async fn open(provider: P, sql: SqlInterface, retry: RetryPolicy, fetch_batch: usize) -> Result<Self> {
        let sql = Arc::new(sql);
        let meta_tables = MetaTables::new(Arc::clone(&sql));

        let snapshot = {
            let mut lease = ConnectionLease::acquire(&provider).await?;
            meta_tables.create(&mut *lease).await?;
            meta_tables.load(&mut *lease).await?
        };

        let backend = Self {
            read: ReadInterface::new(provider.clone(), Arc::clone(&sql)),
            write: WriteInterface::new(provider.clone(), Arc::clone(&sql)),
            repository: MetainfoRepository::with_snapshot(snapshot, sql.identifier_policy()),
            provider,
            sql,
            meta_tables,
            structure: Mutex::new(()),
            rids: RidGenerator::new(),
            retry,
            fetch_batch: fetch_batch.max(1),
        };
        backend.seed_rids().await?;

        info!("Opened {} backend", backend.dialect_name());
        Ok(backend)
    }

    pub fn dialect_name(&self) -> &str {
        self.sql.dialect().name()
    }

    pub fn sql(&self) -> &Arc<SqlInterface> {
        &self.sql
    }

    pub fn read(&self) -> &ReadInterface<P> {
        &self.read
    }

    pub fn write(&self) -> &WriteInterface<P> {
        &self.write
    }

    pub fn repository(&self) -> &MetainfoRepository {
        &self.repository
    }

    pub fn snapshot(&self) -> Arc<ImmutableMetaSnapshot> {
        self.repository.snapshot()
    }

    /// Insert documents; returns their ids in input order.
    pub async fn insert_documents(
        &self,
        database: &str,
        collection: &str,
        documents: &[KvDocument],
    ) -> Result<Vec<i32>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        self.retry
            .run("insert", || self.try_insert(database, collection, documents))
            .await
    }

    /// Ids of documents whose value at the dotted `path` equals `value`.
    ///
    /// Only the column of `value`'s own type is searched. A path or type no
    /// document has used yet matches nothing.
    pub async fn find_by_field(
        &self,
        database: &str,
        collection: &str,
        path: &str,
        value: &KvValue,
    ) -> Result<DidCursor<P>> {
        if value.is_composite() {
            return Err(DocrelError::InvalidValue(format!(
                "cannot match '{}' against a composite value",
                path
            )));
        }
        let (table_ref, name) = split_path(path)?;

        let snapshot = self.repository.snapshot();
        let (Some(db), Some(col)) = (
            snapshot.database(database),
            snapshot.collection(database, collection),
        ) else {
            return Ok(DidCursor::empty());
        };
        let Some(doc_part) = col.doc_part_by_table_ref(&table_ref) else {
            return Ok(DidCursor::empty());
        };
        let Some(field) = doc_part.field(name, value.field_type()) else {
            return Ok(DidCursor::empty());
        };

        self.read
            .find_doc_ids_by_field_equal_to(&db, &col, &doc_part, &field, value)
            .await
    }

    pub async fn find_all(&self, database: &str, collection: &str) -> Result<DidCursor<P>> {
        let snapshot = self.repository.snapshot();
        match (snapshot.database(database), snapshot.collection(database, collection)) {
            (Some(db), Some(col)) => self.read.find_all_doc_ids(&db, &col).await,
            _ => Ok(DidCursor::empty()),
        }
    }

    /// Drain `cursor` and rebuild its documents, in cursor order.
    pub async fn fetch_documents(
        &self,
        database: &str,
        collection: &str,
        cursor: &mut DidCursor<P>,
    ) -> Result<Vec<(i32, KvDocument)>> {
        let snapshot = self.repository.snapshot();
        let (Some(db), Some(col)) = (
            snapshot.database(database),
            snapshot.collection(database, collection),
        ) else {
            cursor.close();
            return Ok(Vec::new());
        };

        let translator = R2DTranslator::new(self.sql.bindings());
        let mut documents = Vec::new();
        while !cursor.is_exhausted() {
            let results = self
                .read
                .fetch_rows_for_doc_ids(&db, &col, cursor, self.fetch_batch)
                .await?;
            if results.is_empty() {
                continue;
            }
            documents.extend(translator.translate(&results)?);
        }
        debug!(
            "Fetched {} documents from {}.{}",
            documents.len(),
            database,
            collection
        );
        Ok(documents)
    }

    pub async fn count_documents(&self, database: &str, collection: &str) -> Result<u64> {
        let snapshot = self.repository.snapshot();
        match (snapshot.database(database), snapshot.collection(database, collection)) {
            (Some(db), Some(col)) => self.read.count_documents(&db, &col).await,
            _ => Ok(0),
        }
    }

    /// Delete documents by id; returns how many existed.
    pub async fn delete_documents(&self, database: &str, collection: &str, dids: &[i32]) -> Result<u64> {
        if dids.is_empty() {
            return Ok(0);
        }
        self.retry
            .run("delete", || self.try_delete(database, collection, dids))
            .await
    }

    /// Drop a collection with its tables and metadata. Returns `false` when
    /// it does not exist.
    pub async fn drop_collection(&self, database: &str, collection: &str) -> Result<bool> {
        let snapshot = self.repository.snapshot();
        let (Some(db), Some(col)) = (
            snapshot.database(database),
            snapshot.collection(database, collection),
        ) else {
            return Ok(false);
        };

        let _structure = self.structure.lock().await;
        self.write.drop_collection(&db, &col).await?;
        {
            let mut lease = ConnectionLease::acquire(&self.provider).await?;
            self.meta_tables
                .delete_collection(&mut *lease, database, collection)
                .await?;
        }
        self.repository.remove_collection(database, collection);
        self.rids.forget_collection(database, collection);
        Ok(true)
    }

    async fn try_insert(&self, database: &str, collection: &str, documents: &[KvDocument]) -> Result<Vec<i32>> {
        let mut meta = self.repository.begin();
        let data = {
            let mut translator = D2RTranslator::new(&mut meta, &self.rids, database, collection);
            for document in documents {
                translator.translate(document)?;
            }
            translator.finish()?
        };

        if meta.has_changes() {
            self.publish(&meta).await?;
        }

        let db = meta.snapshot().database(database).ok_or_else(|| {
            DocrelError::Precondition(format!("database '{}' not registered", database))
        })?;

        let mut lease = ConnectionLease::acquire(&self.provider).await?;
        self.begin(&mut *lease, Context::Insert).await?;
        let inserted: Result<u64> = async {
            let mut rows = 0;
            for part in data.doc_parts(TableRefOrder::Ascending) {
                rows += self
                    .write
                    .insert_doc_part_data(&mut *lease, &db, part)
                    .await?;
            }
            Ok(rows)
        }
        .await;

        match inserted {
            Ok(rows) => {
                self.commit(&mut *lease).await?;
                debug!(
                    "Inserted {} documents ({} rows) into {}.{}",
                    data.dids().len(),
                    rows,
                    database,
                    collection
                );
                Ok(data.dids().to_vec())
            }
            Err(e) => {
                self.rollback(&mut *lease).await;
                Err(e)
            }
        }
    }

    /// Create, record and merge the structures `meta` registered.
    async fn publish(&self, meta: &MutableMetaSnapshot) -> Result<()> {
        let _structure = self.structure.lock().await;
        self.repository.check(meta.changes())?;
        self.write
            .apply_changes(meta.snapshot(), meta.changes())
            .await?;

        let mut lease = ConnectionLease::acquire(&self.provider).await?;
        match self.meta_tables.record_all(&mut *lease, meta.changes()).await {
            Ok(()) => {}
            Err(e @ DocrelError::MetaConflict(_)) => {
                warn!("Metadata changed by another writer, reloading: {}", e);
                let loaded = self.meta_tables.load(&mut *lease).await?;
                self.repository.replace(loaded);
                return Err(e);
            }
            Err(e) => return Err(e),
        }
        drop(lease);

        self.repository.merge(meta.changes())?;
        Ok(())
    }

    async fn try_delete(&self, database: &str, collection: &str, dids: &[i32]) -> Result<u64> {
        let snapshot = self.repository.snapshot();
        let (Some(db), Some(col)) = (
            snapshot.database(database),
            snapshot.collection(database, collection),
        ) else {
            return Ok(0);
        };

        let mut lease = ConnectionLease::acquire(&self.provider).await?;
        self.begin(&mut *lease, Context::Delete).await?;
        match self.write.delete_dids(&mut *lease, &db, &col, dids).await {
            Ok(deleted) => {
                self.commit(&mut *lease).await?;
                Ok(deleted)
            }
            Err(e) => {
                self.rollback(&mut *lease).await;
                Err(e)
            }
        }
    }

    async fn seed_rids(&self) -> Result<()> {
        let snapshot = self.repository.snapshot();
        let mut lookups = Vec::new();
        for db in snapshot.databases() {
            for col in db.collections() {
                for doc_part in col.doc_parts(TableRefOrder::Ascending) {
                    let (db, col) = (Arc::clone(db), Arc::clone(col));
                    lookups.push(async move {
                        let last = self.read.last_row_id_used(&db, &col, &doc_part).await?;
                        Ok::<_, DocrelError>((db, col, doc_part, last))
                    });
                }
            }
        }

        for (db, col, doc_part, last) in try_join_all(lookups).await? {
            self.rids
                .seed(db.name(), col.name(), doc_part.table_ref(), last);
        }
        Ok(())
    }

    async fn begin<C: SqlConnection>(&self, conn: &mut C, context: Context) -> Result<()> {
        conn.begin()
            .await
            .map_err(|e| self.sql.errors().handle_exception(context, e))
    }

    async fn commit<C: SqlConnection>(&self, conn: &mut C) -> Result<()> {
        conn.commit()
            .await
            .map_err(|e| self.sql.errors().handle_exception(Context::Commit, e))
    }

    /// A failed rollback leaves the connection inside its transaction; the
    /// provider then discards it on release.
    async fn rollback<C: SqlConnection>(&self, conn: &mut C) {
        if let Err(e) = conn.rollback().await {
            warn!("Rollback failed: {}", e);
        }
    }
}

/// `"a.b.c"` → (`[a, b]`, `"c"`).
fn split_path(path: &str) -> Result<(TableRef, &str)> {
    let mut segments: Vec<&str> = path.split('.').collect();
    let name = segments.pop().unwrap_or_default();
    if name.is_empty() || segments.iter().any(|s| s.is_empty()) {
        return Err(DocrelError::InvalidValue(format!("invalid field path '{}'", path)));
    }
    let table_ref = segments
        .into_iter()
        .fold(TableRef::root(), |table_ref, segment| table_ref.child_field(segment));
    Ok((table_ref, name))
}

/// A backend selected by configuration.
pub enum BackendImpl {
    Postgres(Backend<PgConnectionProvider>),
    Sqlite(Backend<SqliteConnectionProvider>),
}

impl BackendImpl {
    /// Open the backend named by `config.backend.kind`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let retry = RetryPolicy::from(&config.retry);
        let batch = config.read.batch_size;

        match config.backend.kind {
            BackendKind::Postgres => {
                let pg = config.backend.postgres.as_ref().ok_or_else(|| {
                    DocrelError::Config("backend.postgres section is required".into())
                })?;
                let provider = PgConnectionProvider::new(pg).await?;
                let sql = SqlInterface::new(DialectImpl::from_kind(config.backend.kind));
                Ok(Self::Postgres(Backend::open(provider, sql, retry, batch).await?))
            }
            BackendKind::Sqlite => {
                let lite = config.backend.sqlite.as_ref().ok_or_else(|| {
                    DocrelError::Config("backend.sqlite section is required".into())
                })?;
                let provider = SqliteConnectionProvider::new(lite)?;
                let sql = SqlInterface::new(DialectImpl::from_kind(config.backend.kind));
                Ok(Self::Sqlite(Backend::open(provider, sql, retry, batch).await?))
            }
        }
    }

    pub fn dialect_name(&self) -> &str {
        match self {
            Self::Postgres(b) => b.dialect_name(),
            Self::Sqlite(b) => b.dialect_name(),
        }
    }

    pub fn snapshot(&self) -> Arc<ImmutableMetaSnapshot> {
        match self {
            Self::Postgres(b) => b.snapshot(),
            Self::Sqlite(b) => b.snapshot(),
        }
    }

    pub async fn insert_documents(
        &self,
        database: &str,
        collection: &str,
        documents: &[KvDocument],
    ) -> Result<Vec<i32>> {
        match self {
            Self::Postgres(b) => b.insert_documents(database, collection, documents).await,
            Self::Sqlite(b) => b.insert_documents(database, collection, documents).await,
        }
    }

    /// Documents whose value at `path` equals `value`.
    pub async fn find_documents(
        &self,
        database: &str,
        collection: &str,
        path: &str,
        value: &KvValue,
    ) -> Result<Vec<(i32, KvDocument)>> {
        match self {
            Self::Postgres(b) => {
                let mut cursor = b.find_by_field(database, collection, path, value).await?;
                b.fetch_documents(database, collection, &mut cursor).await
            }
            Self::Sqlite(b) => {
                let mut cursor = b.find_by_field(database, collection, path, value).await?;
                b.fetch_documents(database, collection, &mut cursor).await
            }
        }
    }

    pub async fn all_documents(&self, database: &str, collection: &str) -> Result<Vec<(i32, KvDocument)>> {
        match self {
            Self::Postgres(b) => {
                let mut cursor = b.find_all(database, collection).await?;
                b.fetch_documents(database, collection, &mut cursor).await
            }
            Self::Sqlite(b) => {
                let mut cursor = b.find_all(database, collection).await?;
                b.fetch_documents(database, collection, &mut cursor).await
            }
        }
    }

    pub async fn count_documents(&self, database: &str, collection: &str) -> Result<u64> {
        match self {
            Self::Postgres(b) => b.count_documents(database, collection).await,
            Self::Sqlite(b) => b.count_documents(database, collection).await,
        }
    }

    pub async fn delete_documents(&self, database: &str, collection: &str, dids: &[i32]) -> Result<u64> {
        match self {
            Self::Postgres(b) => b.delete_documents(database, collection, dids).await,
            Self::Sqlite(b) => b.delete_documents(database, collection, dids).await,
        }
    }

    pub async fn drop_collection(&self, database: &str, collection: &str) -> Result<bool> {
        match self {
            Self::Postgres(b) => b.drop_collection(database, collection).await,
            Self::Sqlite(b) => b.drop_collection(database, collection).await,
        }
    }
}
