//! Vendor error classification.
//!
//! Every SQL failure is routed through an [`ErrorHandler`] together with the
//! [`Context`] of the operation that raised it. The handler walks an ordered
//! rule table; the first rule whose code matches and whose context list is
//! empty or contains the calling context decides:
//!
//! | rule contexts | calling context | outcome |
//! |---|---|---|
//! | restricted | structural (create schema/table/index, add column) | [`Classification::BenignConflict`] |
//! | restricted or empty | any other | [`Classification::Retryable`] |
//! | (no rule matched) | any | [`Classification::Fatal`] |
//!
//! Benign conflicts arise when two writers create the same structure
//! concurrently: the loser's statement fails, but the structure it wanted now
//! exists.

use std::fmt;

use tracing::{debug, warn};

use crate::error::{DocrelError, Result, SqlError};

/// The operation during which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Context {
    Unknown,
    GetConnection,
    CreateSchema,
    CreateTable,
    AddColumn,
    CreateIndex,
    DropSchema,
    DropTable,
    Fetch,
    Insert,
    Delete,
    MetaInsert,
    MetaDelete,
    Commit,
    Rollback,
    Ddl,
}

impl Context {
    /// Structural contexts create objects another writer may have created
    /// first.
    pub fn is_structural(self) -> bool {
        matches!(
            self,
            Context::CreateSchema | Context::CreateTable | Context::AddColumn | Context::CreateIndex
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Context::Unknown => "unknown",
            Context::GetConnection => "get_connection",
            Context::CreateSchema => "create_schema",
            Context::CreateTable => "create_table",
            Context::AddColumn => "add_column",
            Context::CreateIndex => "create_index",
            Context::DropSchema => "drop_schema",
            Context::DropTable => "drop_table",
            Context::Fetch => "fetch",
            Context::Insert => "insert",
            Context::Delete => "delete",
            Context::MetaInsert => "meta_insert",
            Context::MetaDelete => "meta_delete",
            Context::Commit => "commit",
            Context::Rollback => "rollback",
            Context::Ddl => "ddl",
        }
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a rule matches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// SQLSTATE, compared exactly.
    SqlState(&'static str),
    /// Vendor numeric code.
    Vendor(i32),
    /// Vendor numeric code whose message contains the fragment
    /// (case-insensitive).
    VendorMessage(i32, &'static str),
}

impl ErrorCode {
    pub fn matches(&self, error: &SqlError) -> bool {
        match *self {
            ErrorCode::SqlState(state) => error.sqlstate.as_deref() == Some(state),
            ErrorCode::Vendor(code) => error.vendor_code == Some(code),
            ErrorCode::VendorMessage(code, fragment) => {
                error.vendor_code == Some(code)
                    && error
                        .message
                        .to_ascii_lowercase()
                        .contains(&fragment.to_ascii_lowercase())
            }
        }
    }
}

/// One entry of a rule table. An empty context list matches every context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorRule {
    pub code: ErrorCode,
    pub contexts: &'static [Context],
}

impl ErrorRule {
    pub const fn new(code: ErrorCode, contexts: &'static [Context]) -> Self {
        Self { code, contexts }
    }

    fn applies(&self, context: Context, error: &SqlError) -> bool {
        self.code.matches(error) && (self.contexts.is_empty() || self.contexts.contains(&context))
    }
}

/// Outcome of classifying a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The structure already exists; treat the statement as successful.
    BenignConflict,
    /// Roll back and retry the whole unit of work.
    Retryable,
    /// Surface the failure.
    Fatal,
}

/// Stateless classifier over an ordered rule table.
#[derive(Debug, Clone)]
pub struct ErrorHandler {
    rules: Vec<ErrorRule>,
}

impl ErrorHandler {
    pub fn new(rules: impl Into<Vec<ErrorRule>>) -> Self {
        Self {
            rules: rules.into(),
        }
    }

    pub fn rules(&self) -> &[ErrorRule] {
        &self.rules
    }

    pub fn classify(&self, context: Context, error: &SqlError) -> Classification {
        match self.rules.iter().find(|rule| rule.applies(context, error)) {
            None => Classification::Fatal,
            Some(rule) if context.is_structural() && !rule.contexts.is_empty() => {
                Classification::BenignConflict
            }
            Some(_) => Classification::Retryable,
        }
    }

    /// For structural statements: benign conflicts are success.
    pub fn handle_structural(&self, context: Context, error: SqlError) -> Result<()> {
        if self.classify(context, &error) == Classification::BenignConflict {
            debug!("Ignoring benign conflict during {}: {}", context, error);
            return Ok(());
        }
        Err(self.handle_exception(context, error))
    }

    /// Translate a failure into the error to surface.
    pub fn handle_exception(&self, context: Context, error: SqlError) -> DocrelError {
        match self.classify(context, &error) {
            Classification::Retryable | Classification::BenignConflict => {
                warn!("Retryable failure during {}: {}", context, error);
                DocrelError::Rollback {
                    context,
                    source: error,
                }
            }
            Classification::Fatal => DocrelError::System {
                context,
                source: error,
            },
        }
    }
}
