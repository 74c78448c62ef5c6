//! Error types for the storage layer.
//!
//! Errors are grouped by where they originate: translating a query into SQL,
//! detecting a concurrent modification, talking to the database, honoring the
//! caller's cancellation signal, reading configuration, or handling an item.
//! Every variant is surfaced to the caller as-is; nothing here is retried.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

/// The primary error type for all storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Query translation errors
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Optimistic concurrency errors
    #[error(transparent)]
    Concurrency(#[from] ConcurrencyError),

    /// Backend-specific errors
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Cancellation and deadline errors
    #[error(transparent)]
    Request(#[from] RequestError),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Item state errors
    #[error(transparent)]
    Item(#[from] ItemError),
}

impl StorageError {
    /// Returns true when an etag-guarded statement matched no row.
    ///
    /// Callers typically refetch the item and retry the mutation.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Concurrency(_))
    }

    /// Returns true when a predicate or schema could not be translated to SQL.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            StorageError::Query(
                QueryError::UnsupportedExpression { .. }
                    | QueryError::UnsupportedFieldType { .. }
                    | QueryError::EmptyGroup { .. }
            )
        )
    }

    /// Returns true when the operation was aborted by its request context.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StorageError::Request(_))
    }
}

/// Errors raised while translating predicates, sorts and schemas into SQL.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The expression has no SQL translation.
    #[error("unsupported expression: {expression} is not implemented")]
    UnsupportedExpression { expression: String },

    /// The field type has no column mapping.
    #[error("unsupported field type '{field_type}' for field {field}")]
    UnsupportedFieldType { field: String, field_type: String },

    /// An `$and`/`$or` group without sub-expressions.
    #[error("empty {operator} group")]
    EmptyGroup { operator: &'static str },

    /// Table or column name that cannot be interpolated safely.
    #[error("invalid identifier: {identifier:?}")]
    InvalidIdentifier { identifier: String },

    /// Column name owned by the storage layer.
    #[error("column '{column}' is reserved")]
    ReservedColumn { column: String },

    /// The predicate document could not be parsed.
    #[error("invalid predicate: {message}")]
    InvalidPredicate { message: String },

    /// The sort expression could not be parsed.
    #[error("invalid sort: {message}")]
    InvalidSort { message: String },
}

/// Errors related to optimistic concurrency control.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConcurrencyError {
    /// The etag guard matched no row: the item changed or vanished since it
    /// was read.
    #[error("etag conflict: {table}/{id} no longer matches etag {expected_etag}")]
    Conflict {
        table: String,
        id: String,
        expected_etag: String,
    },
}

/// Errors originating from the database backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Connection to the backend failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// Connection pool exhausted.
    #[error("connection pool exhausted for {backend_name}")]
    PoolExhausted { backend_name: String },

    /// The backend rejected the statement.
    #[error("statement failed in {backend_name}: {message}")]
    Execution {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// BEGIN, COMMIT or ROLLBACK failed.
    #[error("transaction {action} failed in {backend_name}: {message}")]
    Transaction {
        backend_name: String,
        action: &'static str,
        message: String,
    },

    /// A column value could not be decoded.
    #[error("failed to decode column {column}: {message}")]
    Decode { column: String, message: String },
}

/// Errors raised when the request context stops an operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// The operation deadline passed.
    #[error("operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Errors related to configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The driver name does not map to a known dialect.
    #[error("unknown SQL driver '{driver}'")]
    UnknownDriver { driver: String },

    /// A configuration value could not be parsed.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors related to item state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ItemError {
    /// An unconditional delete matched no row.
    #[error("item not found: {table}/{id}")]
    NotFound { table: String, id: String },

    /// The field name is managed by the storage layer.
    #[error("field '{field}' is reserved")]
    ReservedField { field: String },

    /// The id of an item cannot change.
    #[error("item id is immutable: {original} cannot become {updated}")]
    ImmutableId { original: String, updated: String },

    /// The item document carries no id.
    #[error("item document has no id")]
    MissingId,

    /// The item document is not an object.
    #[error("invalid item document: {message}")]
    InvalidDocument { message: String },
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for query translation.
pub type QueryResult<T> = Result<T, QueryError>;

// Implement conversions from common error types

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Item(ItemError::InvalidDocument {
            message: err.to_string(),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Backend(BackendError::Execution {
            backend_name: "sqlite".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<r2d2::Error> for StorageError {
    fn from(_err: r2d2::Error) -> Self {
        StorageError::Backend(BackendError::PoolExhausted {
            backend_name: "sqlite".to_string(),
        })
    }
}

#[cfg(feature = "postgres")]
impl From<tokio_postgres::Error> for StorageError {
    fn from(err: tokio_postgres::Error) -> Self {
        // A closed connection is not a statement failure.
        if err.is_closed() {
            return StorageError::Backend(BackendError::ConnectionFailed {
                backend_name: "postgres".to_string(),
                message: err.to_string(),
            });
        }
        let message = match err.as_db_error() {
            Some(db) => db.message().to_string(),
            None => err.to_string(),
        };
        StorageError::Backend(BackendError::Execution {
            backend_name: "postgres".to_string(),
            message,
            source: Some(Box::new(err)),
        })
    }
}

#[cfg(feature = "postgres")]
impl From<deadpool_postgres::PoolError> for StorageError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        match err {
            deadpool_postgres::PoolError::Timeout(_) => {
                StorageError::Backend(BackendError::PoolExhausted {
                    backend_name: "postgres".to_string(),
                })
            }
            other => StorageError::Backend(BackendError::ConnectionFailed {
                backend_name: "postgres".to_string(),
                message: other.to_string(),
            }),
        }
    }
}
