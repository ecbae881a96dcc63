//! Core traits for the relational backend.
//!
//! This module defines the abstractions the read/write interfaces are built
//! on:
//!
//! - [`Dialect`]: SQL syntax strategy for one backend engine
//! - [`ConnectionProvider`]: acquire/release contract of a connection pool
//! - [`SqlConnection`]: one leased connection
//!
//! # Design Patterns
//!
//! - **Strategy**: each backend supplies a `Dialect`
//! - **Template Method**: the statement builders are default methods written
//!   against a handful of primitives (quoting, qualification, placeholders,
//!   column types), so dialects override only what their syntax changes

use async_trait::async_trait;

use crate::backend::error_handler::ErrorRule;
use crate::bindings::BindingRegistry;
use crate::error::{Result, SqlError};
use crate::kv::FieldType;
use crate::metainf::{MetaDocPart, MetaField, META_SCHEMA};

use super::identifier::IdentifierPolicy;
use super::value::{SqlRow, SqlValue};

/// SQL dialect strategy.
pub trait Dialect: Send + Sync {
    // ===== Primitives =====

    /// Get the dialect name (e.g., "postgres", "sqlite").
    fn name(&self) -> &str;

    /// Quote an identifier for this dialect.
    fn quote_ident(&self, name: &str) -> String;

    /// Fully qualified, quoted table name.
    fn qualify(&self, schema: &str, table: &str) -> String;

    /// Quoted name for the index on `table.column`.
    fn index_name(&self, schema: &str, table: &str, column: &str) -> String;

    /// Get the parameter placeholder for prepared statements (1-based).
    fn param_placeholder(&self, index: usize) -> String;

    /// Column type used in DDL for `field_type`.
    fn column_type(&self, field_type: FieldType) -> &'static str;

    fn identifier_policy(&self) -> IdentifierPolicy;

    /// Ordered vendor error rules.
    fn error_rules(&self) -> &'static [ErrorRule];

    /// Value codecs, with this dialect's overrides applied.
    fn binding_registry(&self) -> BindingRegistry;

    /// `None` when the backend has no schemas to create.
    fn build_create_schema(&self, schema: &str) -> Option<String>;

    /// `None` when the backend cannot drop a schema in one statement; tables
    /// are then dropped one by one.
    fn build_drop_schema(&self, schema: &str) -> Option<String>;

    // ===== Statement templates =====

    /// Comma-separated placeholders `first..first+count`.
    fn placeholders(&self, first: usize, count: usize) -> String {
        (first..first + count)
            .map(|i| self.param_placeholder(i))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn build_create_doc_part_table(&self, schema: &str, doc_part: &MetaDocPart) -> String {
        let table = self.qualify(schema, doc_part.identifier());
        if doc_part.is_root() {
            format!(
                "CREATE TABLE {} ({} INTEGER NOT NULL PRIMARY KEY)",
                table,
                self.quote_ident("did")
            )
        } else {
            format!(
                "CREATE TABLE {} ({} INTEGER NOT NULL, {} INTEGER NOT NULL PRIMARY KEY, {} INTEGER NOT NULL, {} INTEGER)",
                table,
                self.quote_ident("did"),
                self.quote_ident("rid"),
                self.quote_ident("pid"),
                self.quote_ident("seq")
            )
        }
    }

    fn build_create_index(&self, schema: &str, doc_part: &MetaDocPart, column: &str) -> String {
        format!(
            "CREATE INDEX {} ON {} ({})",
            self.index_name(schema, doc_part.identifier(), column),
            self.qualify(schema, doc_part.identifier()),
            self.quote_ident(column)
        )
    }

    fn build_add_column(&self, schema: &str, doc_part: &MetaDocPart, field: &MetaField) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            self.qualify(schema, doc_part.identifier()),
            self.quote_ident(field.identifier()),
            self.column_type(field.field_type())
        )
    }

    fn build_drop_table(&self, schema: &str, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.qualify(schema, table))
    }

    /// Multi-row insert; parameters are row-major.
    fn build_insert(
        &self,
        schema: &str,
        doc_part: &MetaDocPart,
        columns: &[&str],
        row_count: usize,
    ) -> String {
        let quoted_cols = columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");

        let rows = (0..row_count)
            .map(|r| format!("({})", self.placeholders(r * columns.len() + 1, columns.len())))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.qualify(schema, doc_part.identifier()),
            quoted_cols,
            rows
        )
    }

    fn build_delete_dids(&self, schema: &str, doc_part: &MetaDocPart, did_count: usize) -> String {
        format!(
            "DELETE FROM {} WHERE {} IN ({})",
            self.qualify(schema, doc_part.identifier()),
            self.quote_ident("did"),
            self.placeholders(1, did_count)
        )
    }

    /// Keyset page of dids whose `field` equals parameter 1.
    /// Parameters: value, last did seen (exclusive), page size.
    fn build_dids_by_field_equal_to(
        &self,
        schema: &str,
        doc_part: &MetaDocPart,
        field: &MetaField,
    ) -> String {
        let did = self.quote_ident("did");
        format!(
            "SELECT DISTINCT {did} FROM {} WHERE {} = {} AND {did} > {} ORDER BY {did} LIMIT {}",
            self.qualify(schema, doc_part.identifier()),
            self.quote_ident(field.identifier()),
            self.param_placeholder(1),
            self.param_placeholder(2),
            self.param_placeholder(3),
        )
    }

    /// Keyset page of every did of a root table.
    /// Parameters: last did seen (exclusive), page size.
    fn build_all_dids(&self, schema: &str, root: &MetaDocPart) -> String {
        let did = self.quote_ident("did");
        format!(
            "SELECT {did} FROM {} WHERE {did} > {} ORDER BY {did} LIMIT {}",
            self.qualify(schema, root.identifier()),
            self.param_placeholder(1),
            self.param_placeholder(2),
        )
    }

    /// Rows of `doc_part` for a batch of dids: internal columns first (`did`
    /// for the root; `did, rid, pid, seq` otherwise), then every field in
    /// registration order.
    fn build_doc_part_select(&self, schema: &str, doc_part: &MetaDocPart, did_count: usize) -> String {
        let internal: &[&str] = if doc_part.is_root() {
            &["did"]
        } else {
            &["did", "rid", "pid", "seq"]
        };
        let columns = internal
            .iter()
            .map(|c| self.quote_ident(c))
            .chain(doc_part.fields().iter().map(|f| self.quote_ident(f.identifier())))
            .collect::<Vec<_>>()
            .join(", ");

        let order = if doc_part.is_root() {
            self.quote_ident("did")
        } else {
            format!("{}, {}", self.quote_ident("did"), self.quote_ident("rid"))
        };

        format!(
            "SELECT {} FROM {} WHERE {} IN ({}) ORDER BY {}",
            columns,
            self.qualify(schema, doc_part.identifier()),
            self.quote_ident("did"),
            self.placeholders(1, did_count),
            order
        )
    }

    /// Highest row id stored in `doc_part` (`did` for the root).
    fn build_last_row_id_used(&self, schema: &str, doc_part: &MetaDocPart) -> String {
        let column = if doc_part.is_root() { "did" } else { "rid" };
        format!(
            "SELECT MAX({}) FROM {}",
            self.quote_ident(column),
            self.qualify(schema, doc_part.identifier())
        )
    }

    fn build_count_dids(&self, schema: &str, root: &MetaDocPart) -> String {
        format!(
            "SELECT COUNT(*) FROM {}",
            self.qualify(schema, root.identifier())
        )
    }

    // ===== Metadata tables =====

    /// All metadata columns are text; `key` is the primary key and `unique`
    /// the columns that keep identifiers distinct.
    fn build_create_meta_table(&self, table: &str, columns: &[&str], key: &[&str], unique: &[&str]) -> String {
        let cols = columns
            .iter()
            .map(|c| format!("{} TEXT NOT NULL", self.quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");
        let list = |names: &[&str]| {
            names
                .iter()
                .map(|c| self.quote_ident(c))
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({}, PRIMARY KEY ({}), UNIQUE ({}))",
            self.qualify(META_SCHEMA, table),
            cols,
            list(key),
            list(unique)
        )
    }

    /// Idempotent single-row insert.
    fn build_meta_insert(&self, table: &str, columns: &[&str]) -> String {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT DO NOTHING",
            self.qualify(META_SCHEMA, table),
            columns
                .iter()
                .map(|c| self.quote_ident(c))
                .collect::<Vec<_>>()
                .join(", "),
            self.placeholders(1, columns.len())
        )
    }

    /// Select `columns`, restricted to rows matching every `key_columns`
    /// equality when any are given.
    fn build_meta_select(&self, table: &str, columns: &[&str], key_columns: &[&str]) -> String {
        let mut sql = format!(
            "SELECT {} FROM {}",
            columns
                .iter()
                .map(|c| self.quote_ident(c))
                .collect::<Vec<_>>()
                .join(", "),
            self.qualify(META_SCHEMA, table)
        );
        if !key_columns.is_empty() {
            let conditions = key_columns
                .iter()
                .enumerate()
                .map(|(i, c)| format!("{} = {}", self.quote_ident(c), self.param_placeholder(i + 1)))
                .collect::<Vec<_>>()
                .join(" AND ");
            sql.push_str(" WHERE ");
            sql.push_str(&conditions);
        }
        sql
    }

    /// Delete rows matching every `key_columns` equality.
    fn build_meta_delete(&self, table: &str, key_columns: &[&str]) -> String {
        let conditions = key_columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = {}", self.quote_ident(c), self.param_placeholder(i + 1)))
            .collect::<Vec<_>>()
            .join(" AND ");
        format!(
            "DELETE FROM {} WHERE {}",
            self.qualify(META_SCHEMA, table),
            conditions
        )
    }
}

/// One backend connection.
///
/// Methods report raw [`SqlError`]s; callers attach the [`Context`] and route
/// them through the error handler.
///
/// [`Context`]: crate::backend::error_handler::Context
#[async_trait]
pub trait SqlConnection: Send {
    /// Run a statement; returns the affected row count.
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> std::result::Result<u64, SqlError>;

    async fn query(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> std::result::Result<Vec<SqlRow>, SqlError>;

    async fn begin(&mut self) -> std::result::Result<(), SqlError>;

    async fn commit(&mut self) -> std::result::Result<(), SqlError>;

    async fn rollback(&mut self) -> std::result::Result<(), SqlError>;

    fn in_transaction(&self) -> bool;
}

/// Smallest supported pool. An open cursor keeps its lease until exhausted,
/// so a task holding one cursor still needs a connection for anything else.
pub const MIN_POOL_SIZE: usize = 2;

/// Connection pool contract.
///
/// A connection returned through `release` while still inside a transaction
/// must not be handed out again.
#[async_trait]
pub trait ConnectionProvider: Clone + Send + Sync + 'static {
    type Connection: SqlConnection + 'static;

    async fn acquire(&self) -> Result<Self::Connection>;

    fn release(&self, connection: Self::Connection);
}
