//! Transaction support for SQLite backend.

use async_trait::async_trait;
use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;

use crate::core::{Row, SqlTransaction};
use crate::error::{BackendError, StorageError, StorageResult};
use crate::query::SqlFragment;

use super::values::{execute_on, query_on};

fn transaction_error(action: &'static str, err: rusqlite::Error) -> StorageError {
    StorageError::Backend(BackendError::Transaction {
        backend_name: "sqlite".to_string(),
        action,
        message: err.to_string(),
    })
}

/// A SQLite transaction on a dedicated pooled connection.
pub struct SqliteTransaction {
    conn: PooledConnection<SqliteConnectionManager>,
    /// Whether the transaction is still active.
    active: bool,
}

impl std::fmt::Debug for SqliteTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteTransaction")
            .field("active", &self.active)
            .finish()
    }
}

impl SqliteTransaction {
    /// Starts a write transaction.
    ///
    /// `BEGIN IMMEDIATE` takes the write lock up front, so a conflicting
    /// writer waits on the busy timeout instead of failing at commit.
    pub(crate) fn begin(conn: PooledConnection<SqliteConnectionManager>) -> StorageResult<Self> {
        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| transaction_error("begin", e))?;
        Ok(Self { conn, active: true })
    }

    fn ensure_active(&self) -> StorageResult<()> {
        if self.active {
            Ok(())
        } else {
            Err(StorageError::Backend(BackendError::Transaction {
                backend_name: "sqlite".to_string(),
                action: "use",
                message: "transaction is no longer active".to_string(),
            }))
        }
    }
}

#[async_trait]
impl SqlTransaction for SqliteTransaction {
    async fn execute(&mut self, stmt: &SqlFragment) -> StorageResult<u64> {
        self.ensure_active()?;
        execute_on(&self.conn, stmt)
    }

    async fn query(&mut self, stmt: &SqlFragment) -> StorageResult<Vec<Row>> {
        self.ensure_active()?;
        query_on(&self.conn, stmt)
    }

    async fn commit(mut self) -> StorageResult<()> {
        self.ensure_active()?;
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| transaction_error("commit", e))?;
        self.active = false;
        Ok(())
    }

    async fn rollback(mut self) -> StorageResult<()> {
        self.ensure_active()?;
        // Mark inactive first so a failed ROLLBACK is not retried on drop.
        self.active = false;
        self.conn
            .execute_batch("ROLLBACK")
            .map_err(|e| transaction_error("rollback", e))
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        // If transaction wasn't explicitly committed or rolled back, roll it back
        if self.active {
            tracing::debug!("Rolling back dropped SQLite transaction");
            let _ = self.conn.execute_batch("ROLLBACK");
        }
    }
}
