//! SQLite backend implementation.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use serde::{Deserialize, Serialize};

use crate::core::{BackendKind, Row, SqlBackend};
use crate::error::{BackendError, StorageResult};
use crate::query::{Dialect, SqlFragment};

use super::transaction::SqliteTransaction;
use super::values::{execute_on, query_on};

/// SQLite backend.
pub struct SqliteBackend {
    pool: Pool<SqliteConnectionManager>,
    config: SqliteBackendConfig,
    is_memory: bool,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("config", &self.config)
            .field("is_memory", &self.is_memory)
            .finish_non_exhaustive()
    }
}

/// Configuration for the SQLite backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteBackendConfig {
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of idle connections.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,

    /// Enable WAL mode for better concurrency. Ignored for in-memory databases.
    #[serde(default = "default_true")]
    pub enable_wal: bool,

    /// Enable foreign key constraints.
    #[serde(default = "default_true")]
    pub enable_foreign_keys: bool,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connection_timeout_ms() -> u64 {
    30000
}

fn default_busy_timeout_ms() -> u32 {
    5000
}

fn default_true() -> bool {
    true
}

impl Default for SqliteBackendConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connection_timeout_ms: default_connection_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            enable_wal: true,
            enable_foreign_keys: true,
        }
    }
}

impl SqliteBackend {
    /// Creates a new in-memory SQLite backend.
    ///
    /// Every connection to `:memory:` is a separate database, so the pool
    /// holds exactly one connection and never recycles it.
    pub fn in_memory() -> StorageResult<Self> {
        let config = SqliteBackendConfig::default();
        let manager = Self::configure(SqliteConnectionManager::memory(), &config, true);

        let pool = Pool::builder()
            .max_size(1)
            .min_idle(Some(1))
            .idle_timeout(None)
            .max_lifetime(None)
            .connection_timeout(Duration::from_millis(config.connection_timeout_ms))
            .build(manager)
            .map_err(|e| BackendError::ConnectionFailed {
                backend_name: "sqlite".to_string(),
                message: format!("Failed to create in-memory pool: {}", e),
            })?;

        tracing::info!("Opened in-memory SQLite database");

        Ok(Self {
            pool,
            config,
            is_memory: true,
        })
    }

    /// Opens or creates a file-based SQLite database.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        Self::with_config(path, SqliteBackendConfig::default())
    }

    /// Creates a backend with custom configuration.
    pub fn with_config<P: AsRef<Path>>(path: P, config: SqliteBackendConfig) -> StorageResult<Self> {
        let path = path.as_ref();
        let manager = Self::configure(SqliteConnectionManager::file(path), &config, false);

        let pool = Pool::builder()
            .max_size(config.max_connections)
            .min_idle(Some(config.min_connections))
            .connection_timeout(Duration::from_millis(config.connection_timeout_ms))
            .build(manager)
            .map_err(|e| BackendError::ConnectionFailed {
                backend_name: "sqlite".to_string(),
                message: format!("Failed to open {}: {}", path.display(), e),
            })?;

        tracing::info!(
            "Opened SQLite database {} (pool size {})",
            path.display(),
            config.max_connections
        );

        Ok(Self {
            pool,
            config,
            is_memory: false,
        })
    }

    /// Applies per-connection settings as each pooled connection is opened.
    fn configure(
        manager: SqliteConnectionManager,
        config: &SqliteBackendConfig,
        is_memory: bool,
    ) -> SqliteConnectionManager {
        let busy_timeout = Duration::from_millis(u64::from(config.busy_timeout_ms));
        let foreign_keys = config.enable_foreign_keys;
        let wal = config.enable_wal && !is_memory;

        manager.with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            if foreign_keys {
                conn.execute_batch("PRAGMA foreign_keys = ON")?;
            }
            if wal {
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                    row.get::<_, String>(0)
                })?;
            }
            Ok(())
        })
    }

    /// Returns the backend configuration.
    pub fn config(&self) -> &SqliteBackendConfig {
        &self.config
    }

    /// Returns true for an in-memory database.
    pub fn is_memory(&self) -> bool {
        self.is_memory
    }

    fn get_connection(&self) -> StorageResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }
}

#[async_trait]
impl SqlBackend for SqliteBackend {
    type Transaction = SqliteTransaction;

    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn dialect(&self) -> Dialect {
        Dialect::Default
    }

    fn supports_returning(&self) -> bool {
        true
    }

    async fn execute(&self, stmt: &SqlFragment) -> StorageResult<u64> {
        let conn = self.get_connection()?;
        execute_on(&conn, stmt)
    }

    async fn query(&self, stmt: &SqlFragment) -> StorageResult<Vec<Row>> {
        let conn = self.get_connection()?;
        query_on(&conn, stmt)
    }

    async fn begin(&self) -> StorageResult<SqliteTransaction> {
        let conn = self.get_connection()?;
        SqliteTransaction::begin(conn)
    }

    async fn health_check(&self) -> StorageResult<()> {
        let conn = self.get_connection()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }
}
