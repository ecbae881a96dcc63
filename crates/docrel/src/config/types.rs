//! Configuration type definitions.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Which backend to open and how to connect to it.
    pub backend: BackendConfig,

    /// Retry behavior for retryable failures.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Read-path tuning.
    #[serde(default)]
    pub read: ReadConfig,
}

/// Backend engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Postgres,
    Sqlite,
}

/// Backend selection. Only the section matching `kind` is required.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub kind: BackendKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postgres: Option<PostgresConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqlite: Option<SqliteConfig>,
}

/// PostgreSQL connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// Maximum pooled connections (default: 10, at least 2). An open cursor
    /// holds one until exhausted.
    #[serde(default = "default_pg_pool_size")]
    pub pool_size: usize,
}

/// SQLite database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// Database file, created if missing.
    pub path: PathBuf,

    /// Maximum open connections (default: 4, at least 2).
    #[serde(default = "default_sqlite_pool_size")]
    pub pool_size: usize,

    /// How long a statement waits on a locked database (default: 5000).
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

/// Retry configuration for units of work that fail with a retryable error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts including the first (default: 5).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry; doubles per attempt (default: 50).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on the delay (default: 2000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Read-path configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadConfig {
    /// Documents fetched per round trip (default: 100).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for ReadConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

fn default_pg_port() -> u16 {
    5432
}

fn default_pg_pool_size() -> usize {
    10
}

fn default_sqlite_pool_size() -> usize {
    4
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    50
}

fn default_max_delay_ms() -> u64 {
    2000
}

fn default_batch_size() -> usize {
    100
}
