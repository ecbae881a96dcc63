//! Core abstractions shared by every backend.
//!
//! - [`value`]: native column values, statement parameters and result rows
//! - [`identifier`]: identifier generation and quoting
//! - [`traits`]: the dialect strategy and the connection contracts
//!
//! # Architecture
//!
//! The core module defines backend-agnostic abstractions that are implemented
//! by driver modules (`drivers/postgres`, `drivers/sqlite`). The read and
//! write interfaces only ever talk to these traits.

pub mod identifier;
pub mod traits;
pub mod value;

pub use identifier::{IdentifierFactory, IdentifierPolicy};
pub use traits::{ConnectionProvider, Dialect, SqlConnection};
pub use value::{SqlRow, SqlValue, StatementParams};
