//! Backend abstraction for SQL drivers.
//!
//! This module defines the [`SqlBackend`] and [`SqlTransaction`] traits the
//! storage executor is written against. A backend owns a connection pool and
//! knows its [`Dialect`]; statements reach it already transformed for that
//! dialect, so a backend only binds parameters and decodes rows.

use std::fmt::Debug;

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::query::{Dialect, SqlFragment};
use crate::types::Value;

/// Identifies the type of database backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// SQLite database (file-based or in-memory).
    Sqlite,
    /// PostgreSQL database.
    Postgres,
    /// Custom or test backend.
    Custom(&'static str),
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Sqlite => write!(f, "sqlite"),
            BackendKind::Postgres => write!(f, "postgres"),
            BackendKind::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// A result row: column names and decoded values, in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    /// Column names.
    pub columns: Vec<String>,
    /// Column values, parallel to `columns`.
    pub values: Vec<Value>,
}

impl Row {
    /// Returns the value of a column by name.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    /// Iterates over `(column, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = std::iter::Zip<std::vec::IntoIter<String>, std::vec::IntoIter<Value>>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter().zip(self.values)
    }
}

/// A pooled SQL database.
///
/// # Example
///
/// ```ignore
/// use sqlstore::core::SqlBackend;
///
/// let mut tx = backend.begin().await?;
/// let affected = tx.execute(&stmt).await?;
/// tx.commit().await?;
/// ```
#[async_trait]
pub trait SqlBackend: Send + Sync + Debug {
    /// Transaction handle returned by [`begin`](Self::begin).
    type Transaction: SqlTransaction + 'static;

    /// Returns the kind of backend.
    fn kind(&self) -> BackendKind;

    /// Returns the dialect statements must be transformed to.
    fn dialect(&self) -> Dialect;

    /// Whether `INSERT ... RETURNING *` is supported.
    fn supports_returning(&self) -> bool {
        false
    }

    /// Executes a statement outside a transaction, returning the number of
    /// affected rows.
    async fn execute(&self, stmt: &SqlFragment) -> StorageResult<u64>;

    /// Runs a query outside a transaction.
    async fn query(&self, stmt: &SqlFragment) -> StorageResult<Vec<Row>>;

    /// Opens a transaction on a dedicated connection.
    async fn begin(&self) -> StorageResult<Self::Transaction>;

    /// Checks if the backend is healthy and accepting connections.
    async fn health_check(&self) -> StorageResult<()>;
}

/// An open transaction.
///
/// Dropping an active transaction aborts it; implementations make sure the
/// server never commits a transaction that was dropped.
#[async_trait]
pub trait SqlTransaction: Send + Sized {
    /// Executes a statement, returning the number of affected rows.
    async fn execute(&mut self, stmt: &SqlFragment) -> StorageResult<u64>;

    /// Runs a query, including `INSERT ... RETURNING`.
    async fn query(&mut self, stmt: &SqlFragment) -> StorageResult<Vec<Row>>;

    /// Commits the transaction.
    async fn commit(self) -> StorageResult<()>;

    /// Rolls back the transaction.
    async fn rollback(self) -> StorageResult<()>;

    /// Returns true until the transaction is committed or rolled back.
    fn is_active(&self) -> bool;
}
