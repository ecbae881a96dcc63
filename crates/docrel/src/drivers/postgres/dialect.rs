//! PostgreSQL SQL dialect (Strategy pattern).
//!
//! Provides PostgreSQL-specific identifier quoting, placeholders, column types
//! and the SQLSTATE rule table.

use crate::backend::error_handler::{Context, ErrorCode, ErrorRule};
use crate::bindings::BindingRegistry;
use crate::core::identifier::{quote_double, IdentifierPolicy};
use crate::core::traits::Dialect;
use crate::kv::FieldType;
use crate::typemap::postgres_column_type;

/// Longest identifier PostgreSQL keeps (63) minus room for index suffixes.
const MAX_IDENTIFIER_LENGTH: usize = 55;

const RESERVED_WORDS: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric",
    "authorization", "binary", "both", "case", "cast", "check", "collate", "collation",
    "column", "concurrently", "constraint", "create", "cross", "current_catalog",
    "current_date", "current_role", "current_schema", "current_time", "current_timestamp",
    "current_user", "default", "deferrable", "desc", "distinct", "do", "else", "end",
    "except", "false", "fetch", "for", "foreign", "freeze", "from", "full", "grant",
    "group", "having", "ilike", "in", "initially", "inner", "intersect", "into", "is",
    "isnull", "join", "lateral", "leading", "left", "like", "limit", "localtime",
    "localtimestamp", "natural", "not", "notnull", "null", "offset", "on", "only", "or",
    "order", "outer", "overlaps", "placing", "primary", "references", "returning", "right",
    "select", "session_user", "similar", "some", "symmetric", "table", "tablesample",
    "then", "to", "trailing", "true", "union", "unique", "user", "using", "variadic",
    "verbose", "when", "where", "window", "with",
];

/// SQLSTATE rules, first match wins.
///
/// - `40001` serialization failure, `40P01` deadlock: retry in any context
/// - `42P06` duplicate schema, `42P07` duplicate table or index, `42701`
///   duplicate column: lost a structural race
/// - `23505` unique violation on the catalog while two sessions create the
///   same schema or table
const PG_RULES: &[ErrorRule] = &[
    ErrorRule::new(ErrorCode::SqlState("40001"), &[]),
    ErrorRule::new(ErrorCode::SqlState("40P01"), &[]),
    ErrorRule::new(ErrorCode::SqlState("42P06"), &[Context::CreateSchema]),
    ErrorRule::new(
        ErrorCode::SqlState("42P07"),
        &[Context::CreateTable, Context::CreateIndex],
    ),
    ErrorRule::new(ErrorCode::SqlState("42701"), &[Context::AddColumn]),
    ErrorRule::new(
        ErrorCode::SqlState("23505"),
        &[Context::CreateSchema, Context::CreateTable],
    ),
];

/// PostgreSQL dialect implementation.
///
/// Implements the Strategy pattern for SQL syntax differences.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Create a new PostgreSQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_double(name)
    }

    fn qualify(&self, schema: &str, table: &str) -> String {
        format!("{}.{}", self.quote_ident(schema), self.quote_ident(table))
    }

    fn index_name(&self, _schema: &str, table: &str, column: &str) -> String {
        // Indexes live in the table's schema; the name is unqualified
        self.quote_ident(&format!("{}_{}_idx", table, column))
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn column_type(&self, field_type: FieldType) -> &'static str {
        postgres_column_type(field_type)
    }

    fn identifier_policy(&self) -> IdentifierPolicy {
        IdentifierPolicy {
            max_length: MAX_IDENTIFIER_LENGTH,
            reserved_words: RESERVED_WORDS,
            reserved_prefixes: &["pg_"],
        }
    }

    fn error_rules(&self) -> &'static [ErrorRule] {
        PG_RULES
    }

    fn binding_registry(&self) -> BindingRegistry {
        BindingRegistry::common()
    }

    fn build_create_schema(&self, schema: &str) -> Option<String> {
        Some(format!("CREATE SCHEMA {}", self.quote_ident(schema)))
    }

    fn build_drop_schema(&self, schema: &str) -> Option<String> {
        Some(format!("DROP SCHEMA IF EXISTS {} CASCADE", self.quote_ident(schema)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::error_handler::{Classification, ErrorHandler};
    use crate::error::SqlError;
    use crate::metainf::{MetaDocPart, MetaField, TableRef};

    #[test]
    fn test_quote_ident() {
        let dialect = PostgresDialect::new();
        assert_eq!(dialect.quote_ident("users"), "\"users\"");
        assert_eq!(dialect.quote_ident("a\"b"), "\"a\"\"b\"");
        assert_eq!(dialect.qualify("db", "users"), "\"db\".\"users\"");
    }

    #[test]
    fn test_param_placeholder() {
        let dialect = PostgresDialect::new();
        assert_eq!(dialect.param_placeholder(1), "$1");
        assert_eq!(dialect.placeholders(3, 3), "$3, $4, $5");
    }

    #[test]
    fn test_create_child_table() {
        let dialect = PostgresDialect::new();
        let root = TableRef::root();
        let child = MetaDocPart::new(root.child_field("b"), "users_b");
        assert_eq!(
            dialect.build_create_doc_part_table("db", &child),
            "CREATE TABLE \"db\".\"users_b\" (\"did\" INTEGER NOT NULL, \"rid\" INTEGER NOT NULL PRIMARY KEY, \"pid\" INTEGER NOT NULL, \"seq\" INTEGER)"
        );
        assert_eq!(
            dialect.build_create_index("db", &child, "pid"),
            "CREATE INDEX \"users_b_pid_idx\" ON \"db\".\"users_b\" (\"pid\")"
        );
    }

    #[test]
    fn test_add_column_type() {
        let dialect = PostgresDialect::new();
        let doc_part = MetaDocPart::new(TableRef::root(), "users");
        let field = MetaField::new("d", "d_d", FieldType::Double);
        assert_eq!(
            dialect.build_add_column("db", &doc_part, &field),
            "ALTER TABLE \"db\".\"users\" ADD COLUMN \"d_d\" DOUBLE PRECISION"
        );
    }

    #[test]
    fn test_insert_rows() {
        let dialect = PostgresDialect::new();
        let doc_part = MetaDocPart::new(TableRef::root(), "users");
        assert_eq!(
            dialect.build_insert("db", &doc_part, &["did", "a_i"], 2),
            "INSERT INTO \"db\".\"users\" (\"did\", \"a_i\") VALUES ($1, $2), ($3, $4)"
        );
    }

    #[test]
    fn test_meta_statements() {
        let dialect = PostgresDialect::new();
        assert_eq!(
            dialect.build_meta_insert("collection", &["database", "name"]),
            "INSERT INTO \"docrel_meta\".\"collection\" (\"database\", \"name\") VALUES ($1, $2) ON CONFLICT DO NOTHING"
        );
        assert_eq!(
            dialect.build_meta_delete("field", &["database", "collection"]),
            "DELETE FROM \"docrel_meta\".\"field\" WHERE \"database\" = $1 AND \"collection\" = $2"
        );
    }

    #[test]
    fn test_schema_statements() {
        let dialect = PostgresDialect::new();
        assert_eq!(dialect.build_create_schema("db").as_deref(), Some("CREATE SCHEMA \"db\""));
        assert_eq!(
            dialect.build_drop_schema("db").as_deref(),
            Some("DROP SCHEMA IF EXISTS \"db\" CASCADE")
        );
    }

    #[test]
    fn test_reserved_identifiers() {
        let policy = PostgresDialect::new().identifier_policy();
        assert!(policy.is_reserved("user"));
        assert!(policy.is_reserved("select"));
        assert!(policy.is_reserved("pg_stats"));
        assert!(policy.is_reserved("did"));
        assert!(!policy.is_reserved("users"));
    }

    #[test]
    fn test_rule_table() {
        let handler = ErrorHandler::new(PostgresDialect::new().error_rules());

        let duplicate_table = SqlError::with_sqlstate("42P07", "relation already exists");
        assert_eq!(
            handler.classify(Context::CreateTable, &duplicate_table),
            Classification::BenignConflict
        );
        assert_eq!(
            handler.classify(Context::Insert, &duplicate_table),
            Classification::Fatal
        );

        let deadlock = SqlError::with_sqlstate("40P01", "deadlock detected");
        assert_eq!(handler.classify(Context::Insert, &deadlock), Classification::Retryable);
        assert_eq!(
            handler.classify(Context::CreateTable, &deadlock),
            Classification::Retryable
        );

        let catalog_race = SqlError::with_sqlstate("23505", "duplicate key value");
        assert_eq!(
            handler.classify(Context::CreateSchema, &catalog_race),
            Classification::BenignConflict
        );
        assert_eq!(
            handler.classify(Context::Insert, &catalog_race),
            Classification::Fatal
        );
    }
}
