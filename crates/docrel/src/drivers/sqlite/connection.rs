//! SQLite connections over a small file-backed pool.
//!
//! rusqlite connections are synchronous; statements run inline on the calling
//! task. The pool bounds open connections with a semaphore and keeps idle
//! connections for reuse. Every connection opens the same database file, so
//! the path must not be `:memory:`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::config::SqliteConfig;
use crate::core::traits::{ConnectionProvider, SqlConnection, MIN_POOL_SIZE};
use crate::core::value::{SqlRow, SqlValue};
use crate::error::{DocrelError, Result, SqlError};

struct PoolState {
    path: PathBuf,
    busy_timeout: Duration,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<Connection>>,
}

/// Pool of SQLite connections to one database file.
#[derive(Clone)]
pub struct SqliteConnectionProvider {
    state: Arc<PoolState>,
}

impl SqliteConnectionProvider {
    /// Open the database file (creating it if needed) and check it is usable.
    pub fn new(config: &SqliteConfig) -> Result<Self> {
        if config.pool_size < MIN_POOL_SIZE {
            return Err(DocrelError::Config(format!(
                "sqlite.pool_size must be at least {}",
                MIN_POOL_SIZE
            )));
        }
        let state = PoolState {
            path: config.path.clone(),
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
            permits: Arc::new(Semaphore::new(config.pool_size)),
            idle: Mutex::new(Vec::with_capacity(config.pool_size)),
        };

        let connection = open_connection(&state.path, state.busy_timeout)
            .map_err(|e| DocrelError::pool(e, "opening SQLite database"))?;
        state.idle.lock().push(connection);

        info!(
            "Opened SQLite database: {} (pool size {})",
            config.path.display(),
            config.pool_size
        );

        Ok(Self {
            state: Arc::new(state),
        })
    }
}

fn open_connection(path: &Path, busy_timeout: Duration) -> std::result::Result<Connection, SqlError> {
    let connection = Connection::open(path).map_err(map_error)?;
    connection.busy_timeout(busy_timeout).map_err(map_error)?;
    // WAL lets readers proceed while a writer holds the lock
    connection
        .execute_batch("PRAGMA journal_mode = WAL;")
        .map_err(map_error)?;
    Ok(connection)
}

#[async_trait]
impl ConnectionProvider for SqliteConnectionProvider {
    type Connection = SqliteConnection;

    async fn acquire(&self) -> Result<SqliteConnection> {
        let permit = self
            .state
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| DocrelError::pool(e, "acquiring SQLite connection"))?;

        let idle = self.state.idle.lock().pop();
        let connection = match idle {
            Some(connection) => connection,
            None => {
                debug!("Opening SQLite connection to {}", self.state.path.display());
                open_connection(&self.state.path, self.state.busy_timeout)
                    .map_err(|e| DocrelError::pool(e, "opening SQLite connection"))?
            }
        };

        Ok(SqliteConnection {
            connection,
            _permit: permit,
        })
    }

    fn release(&self, connection: SqliteConnection) {
        if connection.in_transaction() {
            warn!("Discarding SQLite connection released inside a transaction");
            return;
        }
        self.state.idle.lock().push(connection.connection);
    }
}

/// One pooled SQLite connection. Holding it holds a pool permit.
pub struct SqliteConnection {
    connection: Connection,
    _permit: OwnedSemaphorePermit,
}

#[async_trait]
impl SqlConnection for SqliteConnection {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> std::result::Result<u64, SqlError> {
        let mut statement = self.connection.prepare_cached(sql).map_err(map_error)?;
        let affected = statement
            .execute(params_from_iter(params.iter().map(to_value)))
            .map_err(map_error)?;
        Ok(affected as u64)
    }

    async fn query(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> std::result::Result<Vec<SqlRow>, SqlError> {
        let mut statement = self.connection.prepare_cached(sql).map_err(map_error)?;
        let column_count = statement.column_count();
        let mut rows = statement
            .query(params_from_iter(params.iter().map(to_value)))
            .map_err(map_error)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(map_error)? {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                let value: Value = row.get(i).map_err(map_error)?;
                values.push(from_value(value));
            }
            out.push(SqlRow::new(values));
        }
        Ok(out)
    }

    async fn begin(&mut self) -> std::result::Result<(), SqlError> {
        self.connection.execute_batch("BEGIN").map_err(map_error)
    }

    async fn commit(&mut self) -> std::result::Result<(), SqlError> {
        self.connection.execute_batch("COMMIT").map_err(map_error)
    }

    async fn rollback(&mut self) -> std::result::Result<(), SqlError> {
        self.connection.execute_batch("ROLLBACK").map_err(map_error)
    }

    fn in_transaction(&self) -> bool {
        !self.connection.is_autocommit()
    }
}

fn map_error(e: rusqlite::Error) -> SqlError {
    match e {
        rusqlite::Error::SqliteFailure(failure, message) => {
            // Rules match on the primary result code
            let code = failure.extended_code & 0xff;
            SqlError::with_vendor_code(code, message.unwrap_or_else(|| failure.to_string()))
        }
        other => SqlError::other(other.to_string()),
    }
}

fn to_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Bool(v) => Value::Integer(i64::from(*v)),
        SqlValue::I32(v) => Value::Integer(i64::from(*v)),
        SqlValue::I64(v) => Value::Integer(*v),
        SqlValue::F64(v) => Value::Real(*v),
        SqlValue::Decimal(v) => Value::Text(v.to_string()),
        SqlValue::Text(v) => Value::Text(v.clone()),
        SqlValue::Bytes(v) => Value::Blob(v.clone()),
        SqlValue::Date(v) => Value::Text(v.to_string()),
        SqlValue::Time(v) => Value::Text(v.to_string()),
        SqlValue::DateTime(v) => Value::Text(v.to_string()),
    }
}

fn from_value(value: Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(v) => SqlValue::I64(v),
        Value::Real(v) => SqlValue::F64(v),
        Value::Text(v) => SqlValue::Text(v),
        Value::Blob(v) => SqlValue::Bytes(v),
    }
}
