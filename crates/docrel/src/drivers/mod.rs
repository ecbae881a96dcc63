//! Database driver implementations.
//!
//! This module provides backend-specific implementations of the core traits:
//!
//! - [`postgres`]: PostgreSQL driver
//! - [`sqlite`]: SQLite driver
//!
//! # Architecture
//!
//! Each driver module implements:
//! - `Dialect`: SQL syntax strategy, column types, error rules and binding
//!   overrides for the engine
//! - `ConnectionProvider`: the connection pool the backend leases from
//!
//! # Adding New Backends
//!
//! 1. Create a new module under `drivers/`
//! 2. Implement `Dialect` and `ConnectionProvider`
//! 3. Add an enum variant to `DialectImpl` and to `BackendImpl`

pub mod postgres;
pub mod sqlite;

pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use crate::backend::error_handler::ErrorRule;
use crate::bindings::BindingRegistry;
use crate::config::BackendKind;
use crate::core::identifier::IdentifierPolicy;
use crate::core::traits::Dialect;
use crate::kv::FieldType;

/// Enum-based static dispatch for dialects.
///
/// Only the primitives and the statements a dialect overrides are forwarded;
/// every other builder is the trait default written against the forwarded
/// primitives.
#[derive(Debug, Clone)]
pub enum DialectImpl {
    Postgres(PostgresDialect),
    Sqlite(SqliteDialect),
}

impl DialectImpl {
    pub fn from_kind(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Postgres => DialectImpl::Postgres(PostgresDialect::new()),
            BackendKind::Sqlite => DialectImpl::Sqlite(SqliteDialect::new()),
        }
    }
}

impl Dialect for DialectImpl {
    fn name(&self) -> &str {
        match self {
            DialectImpl::Postgres(d) => d.name(),
            DialectImpl::Sqlite(d) => d.name(),
        }
    }

    fn quote_ident(&self, name: &str) -> String {
        match self {
            DialectImpl::Postgres(d) => d.quote_ident(name),
            DialectImpl::Sqlite(d) => d.quote_ident(name),
        }
    }

    fn qualify(&self, schema: &str, table: &str) -> String {
        match self {
            DialectImpl::Postgres(d) => d.qualify(schema, table),
            DialectImpl::Sqlite(d) => d.qualify(schema, table),
        }
    }

    fn index_name(&self, schema: &str, table: &str, column: &str) -> String {
        match self {
            DialectImpl::Postgres(d) => d.index_name(schema, table, column),
            DialectImpl::Sqlite(d) => d.index_name(schema, table, column),
        }
    }

    fn param_placeholder(&self, index: usize) -> String {
        match self {
            DialectImpl::Postgres(d) => d.param_placeholder(index),
            DialectImpl::Sqlite(d) => d.param_placeholder(index),
        }
    }

    fn column_type(&self, field_type: FieldType) -> &'static str {
        match self {
            DialectImpl::Postgres(d) => d.column_type(field_type),
            DialectImpl::Sqlite(d) => d.column_type(field_type),
        }
    }

    fn identifier_policy(&self) -> IdentifierPolicy {
        match self {
            DialectImpl::Postgres(d) => d.identifier_policy(),
            DialectImpl::Sqlite(d) => d.identifier_policy(),
        }
    }

    fn error_rules(&self) -> &'static [ErrorRule] {
        match self {
            DialectImpl::Postgres(d) => d.error_rules(),
            DialectImpl::Sqlite(d) => d.error_rules(),
        }
    }

    fn binding_registry(&self) -> BindingRegistry {
        match self {
            DialectImpl::Postgres(d) => d.binding_registry(),
            DialectImpl::Sqlite(d) => d.binding_registry(),
        }
    }

    fn build_create_schema(&self, schema: &str) -> Option<String> {
        match self {
            DialectImpl::Postgres(d) => d.build_create_schema(schema),
            DialectImpl::Sqlite(d) => d.build_create_schema(schema),
        }
    }

    fn build_drop_schema(&self, schema: &str) -> Option<String> {
        match self {
            DialectImpl::Postgres(d) => d.build_drop_schema(schema),
            DialectImpl::Sqlite(d) => d.build_drop_schema(schema),
        }
    }

    fn build_meta_insert(&self, table: &str, columns: &[&str]) -> String {
        match self {
            DialectImpl::Postgres(d) => d.build_meta_insert(table, columns),
            DialectImpl::Sqlite(d) => d.build_meta_insert(table, columns),
        }
    }
}
