//! SQLite driver.
//!
//! - [`SqliteDialect`]: SQL syntax strategy, schemas emulated by name prefix
//! - [`SqliteConnectionProvider`]: pool of connections to one database file
//! - binding overrides for SQLite storage classes

mod bindings;
mod connection;
mod dialect;

pub use bindings::{
    SqliteBooleanBinding, SqliteChildBinding, SqliteDateBinding, SqliteDecimalBinding,
    SqliteDoubleBinding, SqliteInstantBinding, SqliteIntegerBinding, SqliteNullBinding,
    SqliteTimeBinding,
};
pub use connection::{SqliteConnection, SqliteConnectionProvider};
pub use dialect::SqliteDialect;
