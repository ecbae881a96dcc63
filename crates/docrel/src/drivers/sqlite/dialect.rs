//! SQLite SQL dialect.
//!
//! SQLite has no schemas inside one database file. A schema-qualified table
//! is emulated as a single quoted identifier `"schema.table"`, so schema
//! creation is a no-op and dropping a schema drops its tables one by one.

use std::sync::Arc;

use crate::backend::error_handler::{Context, ErrorCode, ErrorRule};
use crate::bindings::BindingRegistry;
use crate::core::identifier::{quote_double, IdentifierPolicy};
use crate::core::traits::Dialect;
use crate::kv::FieldType;
use crate::metainf::META_SCHEMA;
use crate::typemap::sqlite_column_type;

use super::bindings::{
    SqliteBooleanBinding, SqliteChildBinding, SqliteDateBinding, SqliteDecimalBinding,
    SqliteDoubleBinding, SqliteInstantBinding, SqliteIntegerBinding, SqliteNullBinding,
    SqliteTimeBinding,
};

const MAX_IDENTIFIER_LENGTH: usize = 128;

const RESERVED_WORDS: &[&str] = &[
    "abort", "add", "all", "alter", "and", "as", "autoincrement", "between", "by", "case",
    "check", "collate", "column", "commit", "constraint", "create", "cross", "default",
    "deferrable", "delete", "distinct", "drop", "else", "escape", "except", "exists",
    "foreign", "from", "full", "glob", "group", "having", "in", "index", "inner", "insert",
    "intersect", "into", "is", "isnull", "join", "left", "like", "limit", "match", "natural",
    "not", "notnull", "null", "offset", "on", "or", "order", "outer", "pragma", "primary",
    "references", "regexp", "right", "rowid", "select", "set", "table", "then", "to",
    "transaction", "union", "unique", "update", "using", "values", "when", "where", "with",
];

/// SQLite primary result codes, first match wins.
///
/// - `5` BUSY, `6` LOCKED: another connection holds the lock, retry
/// - `1` ERROR with a duplicate-object message: lost a structural race
const SQLITE_RULES: &[ErrorRule] = &[
    ErrorRule::new(ErrorCode::Vendor(5), &[]),
    ErrorRule::new(ErrorCode::Vendor(6), &[]),
    ErrorRule::new(
        ErrorCode::VendorMessage(1, "already exists"),
        &[Context::CreateTable, Context::CreateIndex],
    ),
    ErrorRule::new(
        ErrorCode::VendorMessage(1, "duplicate column name"),
        &[Context::AddColumn],
    ),
];

/// SQLite dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_double(name)
    }

    fn qualify(&self, schema: &str, table: &str) -> String {
        self.quote_ident(&format!("{}.{}", schema, table))
    }

    fn index_name(&self, schema: &str, table: &str, column: &str) -> String {
        // Index names share the file-wide namespace
        self.quote_ident(&format!("{}.{}_{}_idx", schema, table, column))
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("?{}", index)
    }

    fn column_type(&self, field_type: FieldType) -> &'static str {
        sqlite_column_type(field_type)
    }

    fn identifier_policy(&self) -> IdentifierPolicy {
        IdentifierPolicy {
            max_length: MAX_IDENTIFIER_LENGTH,
            reserved_words: RESERVED_WORDS,
            reserved_prefixes: &["sqlite_"],
        }
    }

    fn error_rules(&self) -> &'static [ErrorRule] {
        SQLITE_RULES
    }

    fn binding_registry(&self) -> BindingRegistry {
        BindingRegistry::common()
            .with_override(Arc::new(SqliteNullBinding))
            .with_override(Arc::new(SqliteBooleanBinding))
            .with_override(Arc::new(SqliteIntegerBinding))
            .with_override(Arc::new(SqliteDoubleBinding))
            .with_override(Arc::new(SqliteDecimalBinding))
            .with_override(Arc::new(SqliteDateBinding))
            .with_override(Arc::new(SqliteTimeBinding))
            .with_override(Arc::new(SqliteInstantBinding))
            .with_override(Arc::new(SqliteChildBinding))
    }

    fn build_create_schema(&self, _schema: &str) -> Option<String> {
        None
    }

    fn build_drop_schema(&self, _schema: &str) -> Option<String> {
        None
    }

    fn build_meta_insert(&self, table: &str, columns: &[&str]) -> String {
        format!(
            "INSERT OR IGNORE INTO {} ({}) VALUES ({})",
            self.qualify(META_SCHEMA, table),
            columns
                .iter()
                .map(|c| self.quote_ident(c))
                .collect::<Vec<_>>()
                .join(", "),
            self.placeholders(1, columns.len())
        )
    }
}
