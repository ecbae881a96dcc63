//! Write interface: structural DDL, row inserts and deletes.
//!
//! Structural statements (schemas, tables, columns, indexes) run through
//! [`SqlInterface::execute_structural`], so a concurrent writer having created
//! the same structure first is not an error. Data statements take the caller's
//! connection so they can share its transaction.

use std::sync::Arc;

use tracing::{debug, info};

use crate::core::traits::{ConnectionProvider, Dialect, SqlConnection};
use crate::core::value::{SqlValue, StatementParams};
use crate::d2r::DocPartData;
use crate::error::{DocrelError, Result};
use crate::metainf::{
    ImmutableMetaSnapshot, MetaChange, MetaCollection, MetaDatabase, MetaDocPart, MetaField,
    TableRefOrder,
};

use super::connection::ConnectionLease;
use super::error_handler::Context;
use super::sql_interface::SqlInterface;

/// Upper bound on bind parameters per statement. Below the PostgreSQL limit
/// (65535) and SQLite's default (32766).
const MAX_PARAMS_PER_STATEMENT: usize = 30_000;

pub struct WriteInterface<P: ConnectionProvider> {
    provider: P,
    sql: Arc<SqlInterface>,
}

impl<P: ConnectionProvider> Clone for WriteInterface<P> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            sql: Arc::clone(&self.sql),
        }
    }
}

impl<P: ConnectionProvider> WriteInterface<P> {
    pub fn new(provider: P, sql: Arc<SqlInterface>) -> Self {
        Self { provider, sql }
    }

    pub async fn create_schema(&self, db: &MetaDatabase) -> Result<()> {
        let mut lease = ConnectionLease::acquire(&self.provider).await?;
        self.create_schema_on(&mut *lease, db.identifier()).await
    }

    /// Create the table of `doc_part` with its internal columns, plus the
    /// `did` and `pid` indexes of non-root tables.
    pub async fn create_doc_part_table(
        &self,
        db: &MetaDatabase,
        collection: &MetaCollection,
        doc_part: &MetaDocPart,
    ) -> Result<()> {
        debug!(
            "Creating doc part {} of {}.{}",
            doc_part.table_ref(),
            db.name(),
            collection.name()
        );
        let mut lease = ConnectionLease::acquire(&self.provider).await?;
        self.create_doc_part_table_on(&mut *lease, db.identifier(), doc_part)
            .await
    }

    pub async fn add_column(&self, db: &MetaDatabase, doc_part: &MetaDocPart, field: &MetaField) -> Result<()> {
        let mut lease = ConnectionLease::acquire(&self.provider).await?;
        self.add_column_on(&mut *lease, db.identifier(), doc_part, field)
            .await
    }

    /// Insert the rows of one doc-part on the caller's connection.
    ///
    /// Columns are the internal ones plus every field used by at least one
    /// row; rows lacking a field get NULL. Large inputs are split into
    /// several statements. Returns the number of rows inserted.
    pub async fn insert_doc_part_data<C: SqlConnection>(
        &self,
        conn: &mut C,
        db: &MetaDatabase,
        data: &DocPartData,
    ) -> Result<u64> {
        if data.rows().is_empty() {
            return Ok(0);
        }

        let doc_part = data.doc_part();
        let fields = data.columns();
        let mut columns: Vec<&str> = if doc_part.is_root() {
            vec!["did"]
        } else {
            vec!["did", "rid", "pid", "seq"]
        };
        let internal = columns.len();
        columns.extend(fields.iter().map(|f| f.identifier()));

        let rows_per_statement = (MAX_PARAMS_PER_STATEMENT / columns.len()).max(1);
        let bindings = self.sql.bindings();
        let mut inserted = 0;

        for chunk in data.rows().chunks(rows_per_statement) {
            let mut params = StatementParams::with_capacity(chunk.len() * columns.len());
            for row in chunk {
                params.push(row.did);
                if !doc_part.is_root() {
                    params.push(row.rid);
                    params.push(SqlValue::from(row.pid));
                    params.push(SqlValue::from(row.seq));
                }
                for field in &fields {
                    let index = params.next_index();
                    match row.value(field.identifier()) {
                        Some(value) => bindings.set(field.field_type(), &mut params, index, value)?,
                        None => params.set(index, SqlValue::Null),
                    }
                }
            }
            debug_assert_eq!(params.len(), chunk.len() * (internal + fields.len()));

            let sql = self
                .sql
                .dialect()
                .build_insert(db.identifier(), doc_part, &columns, chunk.len());
            inserted += self
                .sql
                .execute(conn, Context::Insert, &sql, params.as_slice())
                .await?;
        }

        debug!(
            "Inserted {} rows into {}.{}",
            inserted,
            db.identifier(),
            doc_part.identifier()
        );
        Ok(inserted)
    }

    /// Delete documents, children first. Returns the number of root rows
    /// deleted.
    pub async fn delete_dids<C: SqlConnection>(
        &self,
        conn: &mut C,
        db: &MetaDatabase,
        collection: &MetaCollection,
        dids: &[i32],
    ) -> Result<u64> {
        if dids.is_empty() {
            return Ok(0);
        }

        let mut deleted = 0;
        for doc_part in collection.doc_parts(TableRefOrder::Descending) {
            for chunk in dids.chunks(MAX_PARAMS_PER_STATEMENT) {
                let sql = self
                    .sql
                    .dialect()
                    .build_delete_dids(db.identifier(), &doc_part, chunk.len());
                let params: Vec<SqlValue> = chunk.iter().map(|&did| SqlValue::I32(did)).collect();
                let count = self
                    .sql
                    .execute(conn, Context::Delete, &sql, &params)
                    .await?;
                if doc_part.is_root() {
                    deleted += count;
                }
            }
        }
        Ok(deleted)
    }

    /// Drop every table of the collection, children first.
    pub async fn drop_collection(&self, db: &MetaDatabase, collection: &MetaCollection) -> Result<()> {
        let mut lease = ConnectionLease::acquire(&self.provider).await?;
        self.drop_collection_on(&mut *lease, db.identifier(), collection)
            .await?;
        info!(
            "Dropped collection {}.{} ({} tables)",
            db.name(),
            collection.name(),
            collection.doc_part_count()
        );
        Ok(())
    }

    /// Drop the schema of `db`; backends without schemas drop its tables.
    pub async fn drop_schema(&self, db: &MetaDatabase) -> Result<()> {
        let mut lease = ConnectionLease::acquire(&self.provider).await?;
        match self.sql.dialect().build_drop_schema(db.identifier()) {
            Some(sql) => {
                self.sql
                    .execute(&mut *lease, Context::DropSchema, &sql, &[])
                    .await?;
            }
            None => {
                for collection in db.collections() {
                    self.drop_collection_on(&mut *lease, db.identifier(), collection)
                        .await?;
                }
            }
        }
        info!("Dropped database {}", db.name());
        Ok(())
    }

    /// Create the structures registered by `changes`, looking them up in
    /// `snapshot` (which must already contain them). Runs in autocommit.
    pub async fn apply_changes(&self, snapshot: &ImmutableMetaSnapshot, changes: &[MetaChange]) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut lease = ConnectionLease::acquire(&self.provider).await?;
        let conn = &mut *lease;

        for change in changes {
            match change {
                MetaChange::Database { name, .. } => {
                    let db = require(snapshot.database(name), || format!("database '{}'", name))?;
                    self.create_schema_on(conn, db.identifier()).await?;
                }
                MetaChange::Collection { .. } => {}
                MetaChange::DocPart {
                    database,
                    collection,
                    table_ref,
                    ..
                } => {
                    let db = require(snapshot.database(database), || format!("database '{}'", database))?;
                    let doc_part = require(snapshot.doc_part(database, collection, table_ref), || {
                        format!("doc part {} of '{}.{}'", table_ref, database, collection)
                    })?;
                    self.create_doc_part_table_on(conn, db.identifier(), &doc_part)
                        .await?;
                }
                MetaChange::Field {
                    database,
                    collection,
                    table_ref,
                    field,
                } => {
                    let db = require(snapshot.database(database), || format!("database '{}'", database))?;
                    let doc_part = require(snapshot.doc_part(database, collection, table_ref), || {
                        format!("doc part {} of '{}.{}'", table_ref, database, collection)
                    })?;
                    self.add_column_on(conn, db.identifier(), &doc_part, field)
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn create_schema_on<C: SqlConnection>(&self, conn: &mut C, schema: &str) -> Result<()> {
        let Some(sql) = self.sql.dialect().build_create_schema(schema) else {
            return Ok(());
        };
        self.sql
            .execute_structural(conn, Context::CreateSchema, &sql)
            .await
    }

    async fn create_doc_part_table_on<C: SqlConnection>(
        &self,
        conn: &mut C,
        schema: &str,
        doc_part: &MetaDocPart,
    ) -> Result<()> {
        let dialect = self.sql.dialect();
        let sql = dialect.build_create_doc_part_table(schema, doc_part);
        self.sql
            .execute_structural(conn, Context::CreateTable, &sql)
            .await?;

        if !doc_part.is_root() {
            for column in ["did", "pid"] {
                let sql = dialect.build_create_index(schema, doc_part, column);
                self.sql
                    .execute_structural(conn, Context::CreateIndex, &sql)
                    .await?;
            }
        }
        Ok(())
    }

    async fn add_column_on<C: SqlConnection>(
        &self,
        conn: &mut C,
        schema: &str,
        doc_part: &MetaDocPart,
        field: &MetaField,
    ) -> Result<()> {
        let sql = self.sql.dialect().build_add_column(schema, doc_part, field);
        self.sql
            .execute_structural(conn, Context::AddColumn, &sql)
            .await
    }

    async fn drop_collection_on<C: SqlConnection>(
        &self,
        conn: &mut C,
        schema: &str,
        collection: &MetaCollection,
    ) -> Result<()> {
        for doc_part in collection.doc_parts(TableRefOrder::Descending) {
            let sql = self
                .sql
                .dialect()
                .build_drop_table(schema, doc_part.identifier());
            self.sql
                .execute(conn, Context::DropTable, &sql, &[])
                .await?;
        }
        Ok(())
    }
}

fn require<T>(value: Option<T>, what: impl FnOnce() -> String) -> Result<T> {
    value.ok_or_else(|| DocrelError::Precondition(format!("{} missing from snapshot", what())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::rid::RidGenerator;
    use crate::backend::testing::RecordingProvider;
    use crate::core::identifier::IdentifierFactory;
    use crate::d2r::D2RTranslator;
    use crate::drivers::{DialectImpl, PostgresDialect};
    use crate::error::SqlError;
    use crate::kv::{FieldType, KvDocument, KvValue};
    use crate::metainf::{MutableMetaSnapshot, TableRef};

    fn write_interface() -> (RecordingProvider, WriteInterface<RecordingProvider>) {
        let provider = RecordingProvider::new();
        let sql = Arc::new(SqlInterface::new(DialectImpl::Postgres(PostgresDialect::new())));
        (provider.clone(), WriteInterface::new(provider, sql))
    }

    fn mutable() -> MutableMetaSnapshot {
        let policy = PostgresDialect::new().identifier_policy();
        MutableMetaSnapshot::new(&ImmutableMetaSnapshot::new(), IdentifierFactory::new(policy))
    }

    #[tokio::test]
    async fn test_apply_changes_creates_structures_in_order() {
        let (provider, write) = write_interface();
        let mut meta = mutable();
        meta.ensure_field("db", "users", &TableRef::root(), "a", FieldType::Integer)
            .unwrap();
        meta.ensure_field(
            "db",
            "users",
            &TableRef::root().child_field("b"),
            "c",
            FieldType::String,
        )
        .unwrap();

        write
            .apply_changes(meta.snapshot(), meta.changes())
            .await
            .unwrap();

        let statements = provider.statements();
        assert_eq!(
            statements,
            vec![
                "CREATE SCHEMA \"db\"".to_string(),
                "CREATE TABLE \"db\".\"users\" (\"did\" INTEGER NOT NULL PRIMARY KEY)".to_string(),
                "ALTER TABLE \"db\".\"users\" ADD COLUMN \"a_i\" INTEGER".to_string(),
                "CREATE TABLE \"db\".\"users_b\" (\"did\" INTEGER NOT NULL, \"rid\" INTEGER NOT NULL PRIMARY KEY, \"pid\" INTEGER NOT NULL, \"seq\" INTEGER)".to_string(),
                "CREATE INDEX \"users_b_did_idx\" ON \"db\".\"users_b\" (\"did\")".to_string(),
                "CREATE INDEX \"users_b_pid_idx\" ON \"db\".\"users_b\" (\"pid\")".to_string(),
                "ALTER TABLE \"db\".\"users_b\" ADD COLUMN \"c_s\" TEXT".to_string(),
            ]
        );
        assert_eq!(provider.acquired(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_create_is_benign() {
        let (provider, write) = write_interface();
        let mut meta = mutable();
        meta.ensure_doc_part("db", "users", &TableRef::root()).unwrap();
        let db = meta.snapshot().database("db").unwrap();
        let col = meta.snapshot().collection("db", "users").unwrap();
        let root = col.root_doc_part().unwrap();

        provider.push_error(SqlError::with_sqlstate("42P07", "relation \"users\" already exists"));
        write.create_doc_part_table(&db, &col, &root).await.unwrap();

        // The same code outside its registered context is fatal
        let field = MetaField::new("a", "a_i", FieldType::Integer);
        provider.push_error(SqlError::with_sqlstate("42P07", "relation exists"));
        let err = write.add_column(&db, &root, &field).await.unwrap_err();
        assert!(matches!(err, DocrelError::System { context: Context::AddColumn, .. }));
    }

    #[tokio::test]
    async fn test_create_schema_tolerates_existing() {
        let (provider, write) = write_interface();
        let mut meta = mutable();
        meta.ensure_collection("db", "users").unwrap();
        let db = meta.snapshot().database("db").unwrap();

        write.create_schema(&db).await.unwrap();
        provider.push_error(SqlError::with_sqlstate("42P06", "schema \"db\" already exists"));
        write.create_schema(&db).await.unwrap();

        assert_eq!(
            provider.statements(),
            vec!["CREATE SCHEMA \"db\"".to_string(), "CREATE SCHEMA \"db\"".to_string()]
        );
        assert_eq!(provider.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_insert_fills_missing_fields_with_null() {
        let (provider, write) = write_interface();
        let mut meta = mutable();
        let rids = RidGenerator::new();
        let data = {
            let mut translator = D2RTranslator::new(&mut meta, &rids, "db", "users");
            translator.translate(&KvDocument::new().with("a", 1)).unwrap();
            translator
                .translate(&KvDocument::new().with("b", "x"))
                .unwrap();
            translator.finish().unwrap()
        };
        let db = meta.snapshot().database("db").unwrap();
        let root = data.get(&TableRef::root()).unwrap();

        let mut conn = provider.acquire().await.unwrap();
        write
            .insert_doc_part_data(&mut conn, &db, root)
            .await
            .unwrap();

        assert_eq!(
            provider.statements()[0],
            "INSERT INTO \"db\".\"users\" (\"did\", \"a_i\", \"b_s\") VALUES ($1, $2, $3), ($4, $5, $6)"
        );
        assert_eq!(
            provider.params(0),
            vec![
                SqlValue::I32(0),
                SqlValue::I32(1),
                SqlValue::Null,
                SqlValue::I32(1),
                SqlValue::Null,
                SqlValue::Text("x".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_insert_child_rows_carry_internal_columns() {
        let (provider, write) = write_interface();
        let mut meta = mutable();
        let rids = RidGenerator::new();
        let data = {
            let mut translator = D2RTranslator::new(&mut meta, &rids, "db", "users");
            let doc = KvDocument::new().with("xs", KvValue::Array(vec![KvValue::from(true)]));
            translator.translate(&doc).unwrap();
            translator.finish().unwrap()
        };
        let db = meta.snapshot().database("db").unwrap();
        let xs = data.get(&TableRef::root().child_field("xs")).unwrap();

        let mut conn = provider.acquire().await.unwrap();
        write.insert_doc_part_data(&mut conn, &db, xs).await.unwrap();
        assert_eq!(
            provider.params(0),
            vec![
                SqlValue::I32(0),
                SqlValue::I32(0),
                SqlValue::I32(0),
                SqlValue::I32(0),
                SqlValue::Bool(true),
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_children_first_counts_roots() {
        let (provider, write) = write_interface();
        let mut meta = mutable();
        meta.ensure_doc_part("db", "users", &TableRef::root().child_field("b"))
            .unwrap();
        let db = meta.snapshot().database("db").unwrap();
        let col = meta.snapshot().collection("db", "users").unwrap();

        // child delete affects 3 rows, root delete 2
        provider.push_rows(vec![vec![]; 3]);
        provider.push_rows(vec![vec![]; 2]);

        let mut conn = provider.acquire().await.unwrap();
        let deleted = write
            .delete_dids(&mut conn, &db, &col, &[4, 9])
            .await
            .unwrap();
        assert_eq!(deleted, 2);

        let statements = provider.statements();
        assert_eq!(
            statements[0],
            "DELETE FROM \"db\".\"users_b\" WHERE \"did\" IN ($1, $2)"
        );
        assert_eq!(statements[1], "DELETE FROM \"db\".\"users\" WHERE \"did\" IN ($1, $2)");
    }

    #[tokio::test]
    async fn test_drop_collection_children_first() {
        let (provider, write) = write_interface();
        let mut meta = mutable();
        meta.ensure_doc_part("db", "users", &TableRef::root().child_field("b"))
            .unwrap();
        let db = meta.snapshot().database("db").unwrap();
        let col = meta.snapshot().collection("db", "users").unwrap();

        write.drop_collection(&db, &col).await.unwrap();
        assert_eq!(
            provider.statements(),
            vec![
                "DROP TABLE IF EXISTS \"db\".\"users_b\"".to_string(),
                "DROP TABLE IF EXISTS \"db\".\"users\"".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_drop_schema() {
        let (provider, write) = write_interface();
        let mut meta = mutable();
        meta.ensure_collection("db", "users").unwrap();
        let db = meta.snapshot().database("db").unwrap();

        write.drop_schema(&db).await.unwrap();
        assert_eq!(provider.statements(), vec!["DROP SCHEMA IF EXISTS \"db\" CASCADE".to_string()]);
    }
}
