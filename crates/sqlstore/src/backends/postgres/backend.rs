//! PostgreSQL backend implementation.

use std::fmt::Debug;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Config, Pool, Runtime, SslMode};
use serde::{Deserialize, Serialize};
use tokio_postgres::NoTls;
use tokio_postgres::config::Host;

use crate::core::{BackendKind, Row, SqlBackend};
use crate::error::{BackendError, ConfigError, StorageError, StorageResult};
use crate::query::{Dialect, SqlFragment};

use super::transaction::PostgresTransaction;
use super::values::{decode_row, params};

/// PostgreSQL backend.
pub struct PostgresBackend {
    pool: Pool,
    config: PostgresConfig,
}

impl Debug for PostgresBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresBackend")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("dbname", &self.config.dbname)
            .finish_non_exhaustive()
    }
}

/// Configuration for the PostgreSQL backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// PostgreSQL host.
    #[serde(default = "default_host")]
    pub host: String,

    /// PostgreSQL port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database name.
    #[serde(default = "default_dbname")]
    pub dbname: String,

    /// Database user.
    #[serde(default = "default_user")]
    pub user: String,

    /// Database password.
    #[serde(default)]
    pub password: Option<String>,

    /// SSL mode.
    #[serde(default)]
    pub ssl_mode: PostgresSslMode,

    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Statement timeout in milliseconds.
    #[serde(default = "default_statement_timeout_ms")]
    pub statement_timeout_ms: u64,
}

/// SSL mode for PostgreSQL connections.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PostgresSslMode {
    /// Disable SSL.
    Disable,
    /// Prefer SSL, but allow non-SSL.
    #[default]
    Prefer,
    /// Require SSL.
    Require,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_dbname() -> String {
    "sqlstore".to_string()
}

fn default_user() -> String {
    "sqlstore".to_string()
}

fn default_max_connections() -> usize {
    10
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_statement_timeout_ms() -> u64 {
    30000
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dbname: default_dbname(),
            user: default_user(),
            password: None,
            ssl_mode: PostgresSslMode::default(),
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
            statement_timeout_ms: default_statement_timeout_ms(),
        }
    }
}

impl PostgresConfig {
    /// Reads the configuration from environment variables.
    ///
    /// - `SQLSTORE_PG_HOST` (default: "localhost")
    /// - `SQLSTORE_PG_PORT` (default: 5432)
    /// - `SQLSTORE_PG_DBNAME` (default: "sqlstore")
    /// - `SQLSTORE_PG_USER` (default: "sqlstore")
    /// - `SQLSTORE_PG_PASSWORD`
    /// - `SQLSTORE_PG_MAX_CONNECTIONS` (default: 10)
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("SQLSTORE_PG_HOST").unwrap_or_else(|_| default_host()),
            port: std::env::var("SQLSTORE_PG_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or_else(default_port),
            dbname: std::env::var("SQLSTORE_PG_DBNAME").unwrap_or_else(|_| default_dbname()),
            user: std::env::var("SQLSTORE_PG_USER").unwrap_or_else(|_| default_user()),
            password: std::env::var("SQLSTORE_PG_PASSWORD").ok(),
            max_connections: std::env::var("SQLSTORE_PG_MAX_CONNECTIONS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or_else(default_max_connections),
            ..Default::default()
        }
    }

    /// Parses a `postgres://` URL or a `key=value` connection string.
    pub fn from_connection_string(url: &str) -> Result<Self, ConfigError> {
        let parsed =
            tokio_postgres::Config::from_str(url).map_err(|e| ConfigError::InvalidValue {
                key: "connection_string".to_string(),
                message: e.to_string(),
            })?;

        let mut config = Self::default();
        if let Some(Host::Tcp(host)) = parsed.get_hosts().first() {
            config.host = host.clone();
        }
        if let Some(port) = parsed.get_ports().first() {
            config.port = *port;
        }
        if let Some(dbname) = parsed.get_dbname() {
            config.dbname = dbname.to_string();
        }
        if let Some(user) = parsed.get_user() {
            config.user = user.to_string();
        }
        if let Some(password) = parsed.get_password() {
            config.password = Some(String::from_utf8_lossy(password).into_owned());
        }
        if let Some(timeout) = parsed.get_connect_timeout() {
            config.connect_timeout_secs = timeout.as_secs();
        }
        Ok(config)
    }
}

impl PostgresBackend {
    /// Creates a new PostgreSQL backend and verifies connectivity.
    pub async fn new(config: PostgresConfig) -> StorageResult<Self> {
        let pool = Self::create_pool(&config)?;

        // Verify connectivity
        let client = pool.get().await.map_err(|e| {
            StorageError::Backend(BackendError::ConnectionFailed {
                backend_name: "postgres".to_string(),
                message: e.to_string(),
            })
        })?;
        drop(client);

        tracing::info!(
            "Connected to PostgreSQL at {}:{}/{} (pool size {})",
            config.host,
            config.port,
            config.dbname,
            config.max_connections
        );

        Ok(Self { pool, config })
    }

    /// Creates a backend from a connection string.
    pub async fn from_connection_string(url: &str) -> StorageResult<Self> {
        Self::new(PostgresConfig::from_connection_string(url)?).await
    }

    /// Creates a backend from `SQLSTORE_PG_*` environment variables.
    pub async fn from_env() -> StorageResult<Self> {
        Self::new(PostgresConfig::from_env()).await
    }

    fn create_pool(config: &PostgresConfig) -> StorageResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(config.host.clone());
        cfg.port = Some(config.port);
        cfg.dbname = Some(config.dbname.clone());
        cfg.user = Some(config.user.clone());
        cfg.password = config.password.clone();
        cfg.connect_timeout = Some(Duration::from_secs(config.connect_timeout_secs));
        // Applied to every pooled session, not just the first.
        cfg.options = Some(format!("-c statement_timeout={}", config.statement_timeout_ms));
        cfg.ssl_mode = Some(match config.ssl_mode {
            PostgresSslMode::Disable => SslMode::Disable,
            PostgresSslMode::Prefer => SslMode::Prefer,
            PostgresSslMode::Require => SslMode::Require,
        });

        let pool = cfg
            .builder(NoTls)
            .map_err(|e| {
                StorageError::Backend(BackendError::ConnectionFailed {
                    backend_name: "postgres".to_string(),
                    message: format!("Failed to create pool builder: {}", e),
                })
            })?
            .max_size(config.max_connections)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| {
                StorageError::Backend(BackendError::ConnectionFailed {
                    backend_name: "postgres".to_string(),
                    message: e.to_string(),
                })
            })?;

        Ok(pool)
    }

    /// Returns the backend configuration.
    pub fn config(&self) -> &PostgresConfig {
        &self.config
    }

    async fn get_client(&self) -> StorageResult<deadpool_postgres::Client> {
        Ok(self.pool.get().await?)
    }
}

#[async_trait]
impl SqlBackend for PostgresBackend {
    type Transaction = PostgresTransaction;

    fn kind(&self) -> BackendKind {
        BackendKind::Postgres
    }

    fn dialect(&self) -> Dialect {
        Dialect::Numbered
    }

    fn supports_returning(&self) -> bool {
        true
    }

    async fn execute(&self, stmt: &SqlFragment) -> StorageResult<u64> {
        let client = self.get_client().await?;
        Ok(client.execute(stmt.sql.as_str(), &params(&stmt.params)).await?)
    }

    async fn query(&self, stmt: &SqlFragment) -> StorageResult<Vec<Row>> {
        let client = self.get_client().await?;
        let rows = client.query(stmt.sql.as_str(), &params(&stmt.params)).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn begin(&self) -> StorageResult<PostgresTransaction> {
        let client = self.get_client().await?;
        PostgresTransaction::begin(client).await
    }

    async fn health_check(&self) -> StorageResult<()> {
        let client = self.get_client().await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }
}
