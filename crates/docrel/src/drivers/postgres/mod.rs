//! PostgreSQL driver.
//!
//! This module provides PostgreSQL-specific implementations:
//!
//! - [`PostgresDialect`]: SQL syntax strategy for PostgreSQL
//! - [`PgConnectionProvider`]: deadpool-postgres backed connection pool

mod connection;
mod dialect;

pub use connection::{PgConnection, PgConnectionProvider};
pub use dialect::PostgresDialect;
