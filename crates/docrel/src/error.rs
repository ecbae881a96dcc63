//! Error types for the document-relational layer.

use std::fmt;

use thiserror::Error;

use crate::backend::error_handler::Context;

/// A normalized backend error.
///
/// Drivers translate their native errors (`tokio_postgres::Error`,
/// `rusqlite::Error`) into this shape so the error handler can match rules
/// without knowing which driver produced the failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlError {
    /// Five-character SQLSTATE, when the backend reports one.
    pub sqlstate: Option<String>,
    /// Vendor numeric code (SQLite primary result code).
    pub vendor_code: Option<i32>,
    /// Backend error message.
    pub message: String,
}

impl SqlError {
    /// Error carrying a SQLSTATE code.
    pub fn with_sqlstate(sqlstate: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            sqlstate: Some(sqlstate.into()),
            vendor_code: None,
            message: message.into(),
        }
    }

    /// Error carrying a vendor numeric code.
    pub fn with_vendor_code(code: i32, message: impl Into<String>) -> Self {
        Self {
            sqlstate: None,
            vendor_code: Some(code),
            message: message.into(),
        }
    }

    /// Error with no code at all (driver-side failures such as type decoding).
    pub fn other(message: impl Into<String>) -> Self {
        Self {
            sqlstate: None,
            vendor_code: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for SqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.sqlstate, self.vendor_code) {
            (Some(state), _) => write!(f, "[{}] {}", state, self.message),
            (None, Some(code)) => write!(f, "[code {}] {}", code, self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for SqlError {}

/// Main error type for backend operations.
#[derive(Error, Debug)]
pub enum DocrelError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Transient failure; the whole unit of work may be retried.
    #[error("Retryable failure during {context}: {source}")]
    Rollback {
        context: Context,
        #[source]
        source: SqlError,
    },

    /// Unrecoverable backend failure.
    #[error("System error during {context}: {source}")]
    System {
        context: Context,
        #[source]
        source: SqlError,
    },

    /// Two writers registered the same structure with different identifiers.
    #[error("Metadata conflict: {0}")]
    MetaConflict(String),

    /// Caller violated an operation precondition.
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// Document cannot be mapped (reserved key, unsupported shape).
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Value does not fit the binding it was handed to.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DocrelError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl fmt::Display, context: impl Into<String>) -> Self {
        DocrelError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a System error for a failure that bypasses rule classification.
    pub fn system(context: Context, source: SqlError) -> Self {
        DocrelError::System { context, source }
    }

    /// Whether the failed unit of work may be retried from the start.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DocrelError::Rollback { .. } | DocrelError::MetaConflict(_))
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for backend operations.
pub type Result<T> = std::result::Result<T, DocrelError>;
