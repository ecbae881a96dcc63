//! The per-backend bundle shared by the read and write interfaces.

use std::sync::Arc;

use tracing::debug;

use crate::bindings::BindingRegistry;
use crate::core::identifier::IdentifierPolicy;
use crate::core::traits::{Dialect, SqlConnection};
use crate::core::value::{SqlRow, SqlValue};
use crate::drivers::DialectImpl;
use crate::error::Result;

use super::error_handler::{Context, ErrorHandler, ErrorRule};

/// Dialect, binding registry, error handler and identifier policy of one
/// backend.
#[derive(Debug)]
pub struct SqlInterface {
    dialect: DialectImpl,
    bindings: BindingRegistry,
    errors: Arc<ErrorHandler>,
    identifiers: IdentifierPolicy,
}

impl SqlInterface {
    pub fn new(dialect: DialectImpl) -> Self {
        let bindings = dialect.binding_registry();
        let errors = Arc::new(ErrorHandler::new(dialect.error_rules()));
        let identifiers = dialect.identifier_policy();
        Self {
            dialect,
            bindings,
            errors,
            identifiers,
        }
    }

    /// Replace the binding registry.
    #[must_use]
    pub fn with_bindings(mut self, bindings: BindingRegistry) -> Self {
        self.bindings = bindings;
        self
    }

    /// Replace the error rule table.
    #[must_use]
    pub fn with_error_rules(mut self, rules: Vec<ErrorRule>) -> Self {
        self.errors = Arc::new(ErrorHandler::new(rules));
        self
    }

    pub fn dialect(&self) -> &DialectImpl {
        &self.dialect
    }

    pub fn bindings(&self) -> &BindingRegistry {
        &self.bindings
    }

    pub fn errors(&self) -> &Arc<ErrorHandler> {
        &self.errors
    }

    pub fn identifier_policy(&self) -> IdentifierPolicy {
        self.identifiers
    }

    /// Run a statement, classifying failures under `context`.
    pub(crate) async fn execute<C: SqlConnection>(
        &self,
        conn: &mut C,
        context: Context,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<u64> {
        conn.execute(sql, params)
            .await
            .map_err(|e| self.errors.handle_exception(context, e))
    }

    pub(crate) async fn query<C: SqlConnection>(
        &self,
        conn: &mut C,
        context: Context,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Vec<SqlRow>> {
        conn.query(sql, params)
            .await
            .map_err(|e| self.errors.handle_exception(context, e))
    }

    /// Run a structural statement; a benign conflict counts as success.
    pub(crate) async fn execute_structural<C: SqlConnection>(
        &self,
        conn: &mut C,
        context: Context,
        sql: &str,
    ) -> Result<()> {
        match conn.execute(sql, &[]).await {
            Ok(_) => {
                debug!("{}: {}", context, sql);
                Ok(())
            }
            Err(e) => self.errors.handle_structural(context, e),
        }
    }
}
