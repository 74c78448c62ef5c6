//! Transaction support for PostgreSQL backend.

use async_trait::async_trait;
use deadpool_postgres::{Client, Object};

use crate::core::{Row, SqlTransaction};
use crate::error::{BackendError, StorageError, StorageResult};
use crate::query::SqlFragment;

use super::values::{decode_row, params};

fn transaction_error(action: &'static str, message: String) -> StorageError {
    StorageError::Backend(BackendError::Transaction {
        backend_name: "postgres".to_string(),
        action,
        message,
    })
}

/// A PostgreSQL transaction.
///
/// Wraps a pooled client that has an active transaction. A transaction that
/// is dropped while still active takes its connection out of the pool and
/// closes it, which makes the server abort the transaction.
pub struct PostgresTransaction {
    /// Option so the client can be detached on drop.
    client: Option<Client>,
    /// Whether the transaction is still active.
    active: bool,
}

impl std::fmt::Debug for PostgresTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresTransaction")
            .field("active", &self.active)
            .finish()
    }
}

impl PostgresTransaction {
    pub(crate) async fn begin(client: Client) -> StorageResult<Self> {
        client
            .batch_execute("BEGIN")
            .await
            .map_err(|e| transaction_error("begin", e.to_string()))?;

        Ok(Self {
            client: Some(client),
            active: true,
        })
    }

    fn client(&self) -> StorageResult<&Client> {
        match self.client.as_ref() {
            Some(client) if self.active => Ok(client),
            _ => Err(transaction_error(
                "use",
                "transaction is no longer active".to_string(),
            )),
        }
    }
}

#[async_trait]
impl SqlTransaction for PostgresTransaction {
    async fn execute(&mut self, stmt: &SqlFragment) -> StorageResult<u64> {
        let client = self.client()?;
        Ok(client.execute(stmt.sql.as_str(), &params(&stmt.params)).await?)
    }

    async fn query(&mut self, stmt: &SqlFragment) -> StorageResult<Vec<Row>> {
        let client = self.client()?;
        let rows = client.query(stmt.sql.as_str(), &params(&stmt.params)).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn commit(mut self) -> StorageResult<()> {
        self.client()?
            .batch_execute("COMMIT")
            .await
            .map_err(|e| transaction_error("commit", e.to_string()))?;
        self.active = false;
        Ok(())
    }

    async fn rollback(mut self) -> StorageResult<()> {
        self.client()?
            .batch_execute("ROLLBACK")
            .await
            .map_err(|e| transaction_error("rollback", e.to_string()))?;
        self.active = false;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for PostgresTransaction {
    fn drop(&mut self) {
        // No async in Drop: closing the connection is the only way to abort
        // without handing an open transaction back to the pool.
        if self.active {
            tracing::warn!("PostgreSQL transaction dropped without explicit commit or rollback");
            if let Some(client) = self.client.take() {
                drop(Object::take(client));
            }
        }
    }
}
