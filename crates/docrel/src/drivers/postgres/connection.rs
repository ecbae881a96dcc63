//! PostgreSQL connections over a deadpool-postgres pool.

use std::error::Error as StdError;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use rust_decimal::Decimal;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::{Config as PgConfig, NoTls, Row};
use tracing::{debug, info, warn};

use crate::config::PostgresConfig;
use crate::core::traits::{ConnectionProvider, SqlConnection, MIN_POOL_SIZE};
use crate::core::value::{SqlRow, SqlValue};
use crate::error::{DocrelError, Result, SqlError};

/// Connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

type BoxError = Box<dyn StdError + Sync + Send>;

/// Pool of PostgreSQL connections.
#[derive(Clone)]
pub struct PgConnectionProvider {
    pool: Pool,
}

impl PgConnectionProvider {
    /// Create the pool and check that the server is reachable.
    pub async fn new(config: &PostgresConfig) -> Result<Self> {
        if config.pool_size < MIN_POOL_SIZE {
            return Err(DocrelError::Config(format!(
                "postgres.pool_size must be at least {}",
                MIN_POOL_SIZE
            )));
        }

        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);

        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(30));
        pg_config.connect_timeout(CONNECT_TIMEOUT);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(config.pool_size)
            .build()
            .map_err(|e| DocrelError::pool(e, "creating PostgreSQL pool"))?;

        // Test connection
        let client = pool
            .get()
            .await
            .map_err(|e| DocrelError::pool(e, "testing PostgreSQL connection"))?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| DocrelError::pool(e, "testing PostgreSQL connection"))?;

        info!(
            "Connected to PostgreSQL: {}:{}/{} (pool size {})",
            config.host, config.port, config.database, config.pool_size
        );

        Ok(Self { pool })
    }
}

#[async_trait]
impl ConnectionProvider for PgConnectionProvider {
    type Connection = PgConnection;

    async fn acquire(&self) -> Result<PgConnection> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| DocrelError::pool(e, "acquiring PostgreSQL connection"))?;
        Ok(PgConnection {
            client,
            in_transaction: false,
        })
    }

    fn release(&self, connection: PgConnection) {
        if connection.in_transaction {
            // Detach from the pool; dropping the client closes it
            warn!("Discarding PostgreSQL connection released inside a transaction");
            drop(Object::take(connection.client));
        }
    }
}

/// One pooled PostgreSQL client.
pub struct PgConnection {
    client: Object,
    in_transaction: bool,
}

impl PgConnection {
    async fn simple(&mut self, sql: &str) -> std::result::Result<(), SqlError> {
        self.client.batch_execute(sql).await.map_err(map_error)
    }
}

#[async_trait]
impl SqlConnection for PgConnection {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> std::result::Result<u64, SqlError> {
        let params: Vec<PgParam<'_>> = params.iter().map(PgParam).collect();
        let refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        self.client.execute(sql, &refs).await.map_err(map_error)
    }

    async fn query(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> std::result::Result<Vec<SqlRow>, SqlError> {
        let params: Vec<PgParam<'_>> = params.iter().map(PgParam).collect();
        let refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        let rows = self.client.query(sql, &refs).await.map_err(map_error)?;
        rows.iter().map(decode_row).collect()
    }

    async fn begin(&mut self) -> std::result::Result<(), SqlError> {
        self.simple("BEGIN").await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> std::result::Result<(), SqlError> {
        // A failed COMMIT leaves the flag set so the connection is discarded
        self.simple("COMMIT").await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> std::result::Result<(), SqlError> {
        self.simple("ROLLBACK").await?;
        self.in_transaction = false;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }
}

fn map_error(e: tokio_postgres::Error) -> SqlError {
    match (e.code(), e.as_db_error()) {
        (Some(state), Some(db)) => SqlError::with_sqlstate(state.code(), db.message()),
        (Some(state), None) => SqlError::with_sqlstate(state.code(), e.to_string()),
        _ => SqlError::other(e.to_string()),
    }
}

/// Parameter wrapper; integers and floats are widened or narrowed to the
/// type the server inferred for the placeholder.
#[derive(Debug)]
struct PgParam<'a>(&'a SqlValue);

impl ToSql for PgParam<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
        match self.0 {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(v) => v.to_sql(ty, out),
            SqlValue::I32(v) => write_integer(i64::from(*v), ty, out),
            SqlValue::I64(v) => write_integer(*v, ty, out),
            SqlValue::F64(v) => {
                if *ty == Type::FLOAT4 {
                    (*v as f32).to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            SqlValue::Decimal(v) => v.to_sql(ty, out),
            SqlValue::Text(v) => v.as_str().to_sql(ty, out),
            SqlValue::Bytes(v) => v.as_slice().to_sql(ty, out),
            SqlValue::Date(v) => v.to_sql(ty, out),
            SqlValue::Time(v) => v.to_sql(ty, out),
            SqlValue::DateTime(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn write_integer(v: i64, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
    if *ty == Type::INT2 {
        i16::try_from(v)?.to_sql(ty, out)
    } else if *ty == Type::INT4 {
        i32::try_from(v)?.to_sql(ty, out)
    } else {
        v.to_sql(ty, out)
    }
}

fn decode_row(row: &Row) -> std::result::Result<SqlRow, SqlError> {
    let mut values = Vec::with_capacity(row.len());
    for (i, column) in row.columns().iter().enumerate() {
        values.push(decode_column(row, i, column.type_())?);
    }
    Ok(SqlRow::new(values))
}

fn decode_column(row: &Row, i: usize, ty: &Type) -> std::result::Result<SqlValue, SqlError> {
    fn get<'a, T: tokio_postgres::types::FromSql<'a>>(
        row: &'a Row,
        i: usize,
    ) -> std::result::Result<Option<T>, SqlError> {
        row.try_get::<_, Option<T>>(i)
            .map_err(|e| SqlError::other(format!("decoding column {}: {}", i, e)))
    }

    let value = if *ty == Type::BOOL {
        get::<bool>(row, i)?.map(SqlValue::Bool)
    } else if *ty == Type::INT2 {
        get::<i16>(row, i)?.map(|v| SqlValue::I32(i32::from(v)))
    } else if *ty == Type::INT4 {
        get::<i32>(row, i)?.map(SqlValue::I32)
    } else if *ty == Type::INT8 {
        get::<i64>(row, i)?.map(SqlValue::I64)
    } else if *ty == Type::FLOAT4 {
        get::<f32>(row, i)?.map(|v| SqlValue::F64(f64::from(v)))
    } else if *ty == Type::FLOAT8 {
        get::<f64>(row, i)?.map(SqlValue::F64)
    } else if *ty == Type::NUMERIC {
        get::<Decimal>(row, i)?.map(SqlValue::Decimal)
    } else if *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR || *ty == Type::NAME {
        get::<String>(row, i)?.map(SqlValue::Text)
    } else if *ty == Type::BYTEA {
        get::<Vec<u8>>(row, i)?.map(SqlValue::Bytes)
    } else if *ty == Type::DATE {
        get::<NaiveDate>(row, i)?.map(SqlValue::Date)
    } else if *ty == Type::TIME {
        get::<NaiveTime>(row, i)?.map(SqlValue::Time)
    } else if *ty == Type::TIMESTAMP {
        get::<NaiveDateTime>(row, i)?.map(SqlValue::DateTime)
    } else if *ty == Type::TIMESTAMPTZ {
        get::<DateTime<Utc>>(row, i)?.map(|v| SqlValue::DateTime(v.naive_utc()))
    } else {
        debug!("Unsupported PostgreSQL column type {} at {}", ty, i);
        return Err(SqlError::other(format!(
            "unsupported PostgreSQL column type {} at column {}",
            ty, i
        )));
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: SqlValue, ty: Type) -> (IsNull, Vec<u8>) {
        let mut out = BytesMut::new();
        let is_null = PgParam(&value).to_sql(&ty, &mut out).unwrap();
        (is_null, out.to_vec())
    }

    #[tokio::test]
    async fn test_pool_size_below_minimum_rejected() {
        let config = PostgresConfig {
            host: "localhost".into(),
            port: 5432,
            database: "docs".into(),
            user: "docs".into(),
            password: String::new(),
            pool_size: 1,
        };
        let result = PgConnectionProvider::new(&config).await;
        assert!(matches!(result, Err(DocrelError::Config(_))));
    }

    #[test]
    fn test_null_param() {
        let (is_null, bytes) = encode(SqlValue::Null, Type::INT4);
        assert!(matches!(is_null, IsNull::Yes));
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_integer_follows_inferred_type() {
        let (_, narrow) = encode(SqlValue::I64(7), Type::INT4);
        assert_eq!(narrow, 7i32.to_be_bytes().to_vec());

        let (_, wide) = encode(SqlValue::I32(7), Type::INT8);
        assert_eq!(wide, 7i64.to_be_bytes().to_vec());
    }

    #[test]
    fn test_integer_overflow_is_rejected() {
        let mut out = BytesMut::new();
        let value = SqlValue::I64(i64::from(i32::MAX) + 1);
        assert!(PgParam(&value).to_sql(&Type::INT4, &mut out).is_err());
    }

    #[test]
    fn test_text_param() {
        let (_, bytes) = encode(SqlValue::Text("abc".into()), Type::TEXT);
        assert_eq!(bytes, b"abc".to_vec());
    }
}
