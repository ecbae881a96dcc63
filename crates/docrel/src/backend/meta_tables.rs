//! Backend tables recording the metadata tree.
//!
//! Four tables in the `docrel_meta` schema, one per level of the tree. Every
//! column is text; field types are stored as their one-character code and
//! table refs as JSON. Rows are only ever inserted (idempotently) or deleted
//! with their collection, so replaying them in level order rebuilds the
//! snapshot. Identifiers are unique within their scope, so a writer that
//! lost a naming race finds its row refused instead of recorded.

use std::sync::Arc;

use tracing::{debug, info};

use crate::core::traits::{Dialect, SqlConnection};
use crate::core::value::{SqlRow, SqlValue};
use crate::error::{DocrelError, Result};
use crate::kv::FieldType;
use crate::metainf::{ImmutableMetaSnapshot, MetaChange, MetaField, TableRef, META_SCHEMA};

use super::error_handler::Context;
use super::sql_interface::SqlInterface;

const DATABASE_TABLE: &str = "database";
const DATABASE_COLUMNS: &[&str] = &["name", "identifier"];
const DATABASE_KEY: &[&str] = &["name"];
const DATABASE_UNIQUE: &[&str] = &["identifier"];

const COLLECTION_TABLE: &str = "collection";
const COLLECTION_COLUMNS: &[&str] = &["database", "name", "identifier"];
const COLLECTION_KEY: &[&str] = &["database", "name"];
const COLLECTION_UNIQUE: &[&str] = &["database", "identifier"];

const DOC_PART_TABLE: &str = "doc_part";
const DOC_PART_COLUMNS: &[&str] = &["database", "collection", "table_ref", "identifier"];
const DOC_PART_KEY: &[&str] = &["database", "collection", "table_ref"];
// Table names share the database schema
const DOC_PART_UNIQUE: &[&str] = &["database", "identifier"];

const FIELD_TABLE: &str = "field";
const FIELD_COLUMNS: &[&str] = &[
    "database",
    "collection",
    "table_ref",
    "name",
    "field_type",
    "identifier",
];
const FIELD_KEY: &[&str] = &["database", "collection", "table_ref", "name", "field_type"];
const FIELD_UNIQUE: &[&str] = &["database", "collection", "table_ref", "identifier"];

const TABLES: &[(&str, &[&str], &[&str], &[&str])] = &[
    (DATABASE_TABLE, DATABASE_COLUMNS, DATABASE_KEY, DATABASE_UNIQUE),
    (COLLECTION_TABLE, COLLECTION_COLUMNS, COLLECTION_KEY, COLLECTION_UNIQUE),
    (DOC_PART_TABLE, DOC_PART_COLUMNS, DOC_PART_KEY, DOC_PART_UNIQUE),
    (FIELD_TABLE, FIELD_COLUMNS, FIELD_KEY, FIELD_UNIQUE),
];

pub struct MetaTables {
    sql: Arc<SqlInterface>,
}

impl MetaTables {
    pub fn new(sql: Arc<SqlInterface>) -> Self {
        Self { sql }
    }

    /// Create the metadata schema and tables if missing.
    pub async fn create<C: SqlConnection>(&self, conn: &mut C) -> Result<()> {
        let dialect = self.sql.dialect();
        if let Some(sql) = dialect.build_create_schema(META_SCHEMA) {
            self.sql
                .execute_structural(conn, Context::CreateSchema, &sql)
                .await?;
        }
        for (table, columns, key, unique) in TABLES {
            let sql = dialect.build_create_meta_table(table, columns, key, unique);
            self.sql
                .execute_structural(conn, Context::CreateTable, &sql)
                .await?;
        }
        Ok(())
    }

    /// Rebuild the snapshot from the recorded rows.
    ///
    /// Doc-parts are replayed parents first. Fields are replayed in
    /// identifier order within their doc-part.
    pub async fn load<C: SqlConnection>(&self, conn: &mut C) -> Result<ImmutableMetaSnapshot> {
        let mut changes = Vec::new();

        for row in self.select(conn, DATABASE_TABLE, DATABASE_COLUMNS).await? {
            changes.push(MetaChange::Database {
                name: text(&row, 0)?,
                identifier: text(&row, 1)?,
            });
        }

        for row in self.select(conn, COLLECTION_TABLE, COLLECTION_COLUMNS).await? {
            changes.push(MetaChange::Collection {
                database: text(&row, 0)?,
                name: text(&row, 1)?,
                identifier: text(&row, 2)?,
            });
        }

        let mut doc_parts = Vec::new();
        for row in self.select(conn, DOC_PART_TABLE, DOC_PART_COLUMNS).await? {
            doc_parts.push((
                text(&row, 0)?,
                text(&row, 1)?,
                TableRef::from_json(&text(&row, 2)?)?,
                text(&row, 3)?,
            ));
        }
        doc_parts.sort_by(|a, b| a.2.cmp(&b.2));
        changes.extend(doc_parts.into_iter().map(
            |(database, collection, table_ref, identifier)| MetaChange::DocPart {
                database,
                collection,
                table_ref,
                identifier,
            },
        ));

        let mut fields = Vec::new();
        for row in self.select(conn, FIELD_TABLE, FIELD_COLUMNS).await? {
            let code = text(&row, 4)?;
            let field_type = code
                .chars()
                .next()
                .and_then(FieldType::from_code)
                .ok_or_else(|| DocrelError::InvalidValue(format!("unknown field type code '{}'", code)))?;
            fields.push((
                text(&row, 0)?,
                text(&row, 1)?,
                TableRef::from_json(&text(&row, 2)?)?,
                MetaField::new(text(&row, 3)?, text(&row, 5)?, field_type),
            ));
        }
        fields.sort_by(|a, b| a.2.cmp(&b.2).then_with(|| a.3.identifier().cmp(b.3.identifier())));
        changes.extend(fields.into_iter().map(
            |(database, collection, table_ref, field)| MetaChange::Field {
                database,
                collection,
                table_ref,
                field: Arc::new(field),
            },
        ));

        let mut snapshot = ImmutableMetaSnapshot::new();
        for change in &changes {
            snapshot.apply(change)?;
        }
        info!("Loaded {} metadata entries", changes.len());
        Ok(snapshot)
    }

    /// Record one change; recording an existing entry is a no-op.
    ///
    /// Fails with `MetaConflict` when the entry is already recorded under
    /// another identifier, or its identifier is taken by another entry.
    pub async fn record<C: SqlConnection>(&self, conn: &mut C, change: &MetaChange) -> Result<()> {
        let (table, columns, key, identifier, params) = match change {
            MetaChange::Database { name, identifier } => (
                DATABASE_TABLE,
                DATABASE_COLUMNS,
                DATABASE_KEY,
                identifier.as_str(),
                vec![SqlValue::from(name.as_str()), SqlValue::from(identifier.as_str())],
            ),
            MetaChange::Collection {
                database,
                name,
                identifier,
            } => (
                COLLECTION_TABLE,
                COLLECTION_COLUMNS,
                COLLECTION_KEY,
                identifier.as_str(),
                vec![
                    SqlValue::from(database.as_str()),
                    SqlValue::from(name.as_str()),
                    SqlValue::from(identifier.as_str()),
                ],
            ),
            MetaChange::DocPart {
                database,
                collection,
                table_ref,
                identifier,
            } => (
                DOC_PART_TABLE,
                DOC_PART_COLUMNS,
                DOC_PART_KEY,
                identifier.as_str(),
                vec![
                    SqlValue::from(database.as_str()),
                    SqlValue::from(collection.as_str()),
                    SqlValue::Text(table_ref.to_json()?),
                    SqlValue::from(identifier.as_str()),
                ],
            ),
            MetaChange::Field {
                database,
                collection,
                table_ref,
                field,
            } => (
                FIELD_TABLE,
                FIELD_COLUMNS,
                FIELD_KEY,
                field.identifier(),
                vec![
                    SqlValue::from(database.as_str()),
                    SqlValue::from(collection.as_str()),
                    SqlValue::Text(table_ref.to_json()?),
                    SqlValue::from(field.name()),
                    SqlValue::Text(field.field_type().code().to_string()),
                    SqlValue::from(field.identifier()),
                ],
            ),
        };

        let sql = self.sql.dialect().build_meta_insert(table, columns);
        let inserted = self
            .sql
            .execute(conn, Context::MetaInsert, &sql, &params)
            .await?;
        if inserted > 0 {
            return Ok(());
        }

        // Refused: either already recorded or the identifier is taken
        let sql = self.sql.dialect().build_meta_select(table, &["identifier"], key);
        let rows = self
            .sql
            .query(conn, Context::Fetch, &sql, &params[..key.len()])
            .await?;
        match rows.first().map(|row| text(row, 0)).transpose()? {
            Some(stored) if stored == identifier => Ok(()),
            Some(stored) => Err(DocrelError::MetaConflict(format!(
                "{} entry recorded as '{}', not '{}'",
                table, stored, identifier
            ))),
            None => Err(DocrelError::MetaConflict(format!(
                "{} identifier '{}' already recorded for another entry",
                table, identifier
            ))),
        }
    }

    pub async fn record_all<C: SqlConnection>(&self, conn: &mut C, changes: &[MetaChange]) -> Result<()> {
        for change in changes {
            self.record(conn, change).await?;
        }
        if !changes.is_empty() {
            debug!("Recorded {} metadata changes", changes.len());
        }
        Ok(())
    }

    /// Forget a collection and everything below it.
    pub async fn delete_collection<C: SqlConnection>(
        &self,
        conn: &mut C,
        database: &str,
        collection: &str,
    ) -> Result<()> {
        let dialect = self.sql.dialect();
        let params = [SqlValue::from(database), SqlValue::from(collection)];
        for table in [FIELD_TABLE, DOC_PART_TABLE] {
            let sql = dialect.build_meta_delete(table, &["database", "collection"]);
            self.sql
                .execute(conn, Context::MetaDelete, &sql, &params)
                .await?;
        }
        let sql = dialect.build_meta_delete(COLLECTION_TABLE, &["database", "name"]);
        self.sql
            .execute(conn, Context::MetaDelete, &sql, &params)
            .await?;
        Ok(())
    }

    async fn select<C: SqlConnection>(
        &self,
        conn: &mut C,
        table: &str,
        columns: &[&str],
    ) -> Result<Vec<SqlRow>> {
        let sql = self.sql.dialect().build_meta_select(table, columns, &[]);
        self.sql.query(conn, Context::Fetch, &sql, &[]).await
    }
}

fn text(row: &SqlRow, column: usize) -> Result<String> {
    row.get_str(column)?
        .map(str::to_string)
        .ok_or_else(|| DocrelError::InvalidValue(format!("metadata column {} is NULL", column)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::RecordingProvider;
    use crate::core::traits::ConnectionProvider;
    use crate::drivers::{DialectImpl, PostgresDialect};

    fn meta_tables() -> MetaTables {
        MetaTables::new(Arc::new(SqlInterface::new(DialectImpl::Postgres(
            PostgresDialect::new(),
        ))))
    }

    fn texts(values: &[&str]) -> Vec<SqlValue> {
        values.iter().map(|v| SqlValue::from(*v)).collect()
    }

    #[tokio::test]
    async fn test_create_statements() {
        let provider = RecordingProvider::new();
        let mut conn = provider.acquire().await.unwrap();
        meta_tables().create(&mut conn).await.unwrap();

        let statements = provider.statements();
        assert_eq!(statements.len(), 5);
        assert_eq!(statements[0], "CREATE SCHEMA \"docrel_meta\"");
        assert_eq!(
            statements[1],
            "CREATE TABLE IF NOT EXISTS \"docrel_meta\".\"database\" (\"name\" TEXT NOT NULL, \"identifier\" TEXT NOT NULL, PRIMARY KEY (\"name\"), UNIQUE (\"identifier\"))"
        );
    }

    #[tokio::test]
    async fn test_record_field() {
        let provider = RecordingProvider::new();
        let mut conn = provider.acquire().await.unwrap();
        let change = MetaChange::Field {
            database: "db".into(),
            collection: "users".into(),
            table_ref: TableRef::root().child_field("b"),
            field: Arc::new(MetaField::new("c", "c_s", FieldType::String)),
        };
        meta_tables().record(&mut conn, &change).await.unwrap();

        assert_eq!(
            provider.statements()[0],
            "INSERT INTO \"docrel_meta\".\"field\" (\"database\", \"collection\", \"table_ref\", \"name\", \"field_type\", \"identifier\") VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT DO NOTHING"
        );
        assert_eq!(
            provider.params(0),
            texts(&["db", "users", "[{\"field\":\"b\"}]", "c", "s", "c_s"])
        );
    }

    fn field_change(identifier: &str) -> MetaChange {
        MetaChange::Field {
            database: "db".into(),
            collection: "users".into(),
            table_ref: TableRef::root(),
            field: Arc::new(MetaField::new("a", identifier, FieldType::Integer)),
        }
    }

    #[tokio::test]
    async fn test_record_existing_entry_is_noop() {
        let provider = RecordingProvider::new();
        provider.push_rows(vec![]);
        provider.push_rows(vec![texts(&["a_i"])]);
        let mut conn = provider.acquire().await.unwrap();
        meta_tables()
            .record(&mut conn, &field_change("a_i"))
            .await
            .unwrap();

        assert_eq!(
            provider.statements()[1],
            "SELECT \"identifier\" FROM \"docrel_meta\".\"field\" WHERE \"database\" = $1 AND \"collection\" = $2 AND \"table_ref\" = $3 AND \"name\" = $4 AND \"field_type\" = $5"
        );
        assert_eq!(provider.params(1), texts(&["db", "users", "[]", "a", "i"]));
    }

    #[tokio::test]
    async fn test_record_refused_entry_conflicts() {
        let tables = meta_tables();

        // Recorded under another identifier
        let provider = RecordingProvider::new();
        provider.push_rows(vec![]);
        provider.push_rows(vec![texts(&["a_1_i"])]);
        let mut conn = provider.acquire().await.unwrap();
        assert!(matches!(
            tables.record(&mut conn, &field_change("a_i")).await,
            Err(DocrelError::MetaConflict(_))
        ));

        // Identifier owned by a differently named field
        let provider = RecordingProvider::new();
        provider.push_rows(vec![]);
        provider.push_rows(vec![]);
        let mut conn = provider.acquire().await.unwrap();
        assert!(matches!(
            tables.record(&mut conn, &field_change("a_i")).await,
            Err(DocrelError::MetaConflict(_))
        ));
        assert_eq!(provider.statements().len(), 2);
    }

    #[tokio::test]
    async fn test_load_replays_parents_first() {
        let provider = RecordingProvider::new();
        provider.push_rows(vec![texts(&["db", "db"])]);
        provider.push_rows(vec![texts(&["db", "users", "users"])]);
        // Child returned before root
        provider.push_rows(vec![
            texts(&["db", "users", "[{\"field\":\"b\"}]", "users_b"]),
            texts(&["db", "users", "[]", "users"]),
        ]);
        provider.push_rows(vec![
            texts(&["db", "users", "[]", "b", "e", "b_e"]),
            texts(&["db", "users", "[{\"field\":\"b\"}]", "c", "s", "c_s"]),
            texts(&["db", "users", "[]", "a", "i", "a_i"]),
        ]);

        let mut conn = provider.acquire().await.unwrap();
        let snapshot = meta_tables().load(&mut conn).await.unwrap();

        let col = snapshot.collection("db", "users").unwrap();
        assert_eq!(col.doc_part_count(), 2);
        let root = col.root_doc_part().unwrap();
        let identifiers: Vec<_> = root.fields().iter().map(|f| f.identifier()).collect();
        assert_eq!(identifiers, vec!["a_i", "b_e"]);
        assert!(snapshot
            .doc_part("db", "users", &TableRef::root().child_field("b"))
            .unwrap()
            .field("c", FieldType::String)
            .is_some());
    }

    #[tokio::test]
    async fn test_load_rejects_unknown_type_code() {
        let provider = RecordingProvider::new();
        provider.push_rows(vec![texts(&["db", "db"])]);
        provider.push_rows(vec![texts(&["db", "users", "users"])]);
        provider.push_rows(vec![texts(&["db", "users", "[]", "users"])]);
        provider.push_rows(vec![texts(&["db", "users", "[]", "a", "?", "a_q"])]);

        let mut conn = provider.acquire().await.unwrap();
        assert!(matches!(
            meta_tables().load(&mut conn).await,
            Err(DocrelError::InvalidValue(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_collection() {
        let provider = RecordingProvider::new();
        let mut conn = provider.acquire().await.unwrap();
        meta_tables()
            .delete_collection(&mut conn, "db", "users")
            .await
            .unwrap();
        let statements = provider.statements();
        assert_eq!(
            statements[0],
            "DELETE FROM \"docrel_meta\".\"field\" WHERE \"database\" = $1 AND \"collection\" = $2"
        );
        assert_eq!(
            statements[2],
            "DELETE FROM \"docrel_meta\".\"collection\" WHERE \"database\" = $1 AND \"name\" = $2"
        );
        assert_eq!(provider.params(2), texts(&["db", "users"]));
    }
}
