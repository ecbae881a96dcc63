//! Relational backend: SQL execution over the metadata tree.
//!
//! - [`SqlInterface`]: dialect, bindings, error handler and identifier policy
//!   of one backend
//! - [`ReadInterface`] / [`WriteInterface`]: statements built from metadata
//! - [`ErrorHandler`]: vendor error classification
//! - [`DidCursor`] / [`RowCursor`]: keyset-paginated cursors owning their
//!   connection
//! - [`Backend`]: document-level operations, metadata persistence and retries

pub mod connection;
pub mod cursor;
pub mod error_handler;
pub mod meta_tables;
pub mod read;
pub mod results;
pub mod retry;
pub mod rid;
pub mod service;
pub mod sql_interface;
pub mod write;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::ConnectionLease;
pub use cursor::{DidCursor, KeysetQuery, RowCursor};
pub use error_handler::{Classification, Context, ErrorCode, ErrorHandler, ErrorRule};
pub use meta_tables::MetaTables;
pub use read::ReadInterface;
pub use results::{DocPartResult, DocPartResults};
pub use retry::RetryPolicy;
pub use rid::RidGenerator;
pub use service::{Backend, BackendImpl};
pub use sql_interface::SqlInterface;
pub use write::WriteInterface;
