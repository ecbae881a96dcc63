//! # docrel
//!
//! Document-to-relational mapping layer.
//!
//! Schemaless documents are decomposed into rows of relational tables whose
//! shape is discovered while writing: every distinct path through a
//! collection's documents gets a table (a *doc-part*), every distinct
//! (field name, value type) pair at that path gets a column. Documents are
//! rebuilt from those rows on read.
//!
//! - **Metadata** ([`metainf`]): databases, collections, doc-parts and fields
//!   with their generated identifiers, published as immutable snapshots
//! - **Translation** ([`d2r`]): document to rows and rows to document
//! - **Backend** ([`backend`]): DDL and DML over a [`Dialect`], vendor error
//!   classification, keyset cursors and retries
//! - **Drivers** ([`drivers`]): PostgreSQL and SQLite
//!
//! ## Example
//!
//! ```rust,no_run
//! use docrel::{BackendImpl, Config, KvDocument, KvValue};
//!
//! #[tokio::main]
//! async fn main() -> docrel::Result<()> {
//!     let config = Config::load("docrel.yaml")?;
//!     let backend = BackendImpl::from_config(&config).await?;
//!
//!     let doc = KvDocument::new()
//!         .with("name", "ada")
//!         .with("address", KvDocument::new().with("city", "London"));
//!     backend.insert_documents("app", "users", &[doc]).await?;
//!
//!     let found = backend
//!         .find_documents("app", "users", "address.city", &KvValue::from("London"))
//!         .await?;
//!     println!("found {} documents", found.len());
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod bindings;
pub mod config;
pub mod core;
pub mod d2r;
pub mod drivers;
pub mod error;
pub mod kv;
pub mod metainf;
pub mod typemap;

// Re-exports for convenient access
pub use backend::{Backend, BackendImpl, DidCursor, RetryPolicy, SqlInterface};
pub use config::{BackendKind, Config, PostgresConfig, SqliteConfig};
pub use crate::core::{ConnectionProvider, Dialect, SqlConnection};
pub use drivers::{DialectImpl, PostgresDialect, SqliteDialect};
pub use error::{DocrelError, Result, SqlError};
pub use kv::{FieldType, KvDocument, KvValue};
pub use metainf::{ImmutableMetaSnapshot, MetainfoRepository, TableRef};
