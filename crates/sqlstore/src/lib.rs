//! SQL persistence for generic item collections.
//!
//! This crate stores schemaless items (an id, an etag and a map of field
//! values) in one SQL table per collection. It translates structured lookup
//! queries into parameterized SQL and guards every mutation with an etag so
//! concurrent writers cannot silently overwrite each other.
//!
//! # Features
//!
//! - **Query translation**: predicates, sorts and windows become a single
//!   parameterized `SELECT`
//! - **Optimistic concurrency**: updates and deletes match on the etag the
//!   caller last read
//! - **Dialects**: `?` placeholders for SQLite/MySQL, `$N` for PostgreSQL
//! - **Cancellation**: every operation honors a [`RequestContext`]
//!
//! # Backend Features
//!
//! ```toml
//! [dependencies]
//! sqlstore = { version = "0.2", features = ["postgres"] }
//! ```
//!
//! - `sqlite` (default) - SQLite with in-memory and file modes
//! - `postgres` - PostgreSQL via a deadpool connection pool
//! - `cli` - the `sqlstore-demo` binary
//!
//! # Architecture
//!
//! - [`types`] - Items, values, predicates, queries and schemas
//! - [`query`] - Translation of queries and items into SQL statements
//! - [`core`] - Storage and backend traits, request context
//! - [`executor`] - [`SqlStorage`], the transactional executor
//! - [`backends`] - Backend implementations
//! - [`config`] - Storage configuration
//! - [`error`] - Error types for all operations
//!
//! # Query Translation
//!
//! ```
//! use sqlstore::query::{Dialect, QueryBuilder};
//! use sqlstore::types::{Predicate, Query, Sort, Window};
//!
//! let predicate = Predicate::parse(r#"{"name": "x", "age": {"$gt": 3}}"#).unwrap();
//! let query = Query::new()
//!     .with_predicate(predicate)
//!     .with_sort(Sort::parse("-age").unwrap())
//!     .with_window(Window::limit(10));
//!
//! let stmt = QueryBuilder::new("units").unwrap().build_select(&query).unwrap();
//! assert_eq!(
//!     stmt.sql,
//!     "SELECT * FROM units WHERE age > ? AND name LIKE ? ORDER BY age DESC LIMIT 10"
//! );
//!
//! let stmt = Dialect::Numbered.transform(stmt);
//! assert_eq!(
//!     stmt.sql,
//!     "SELECT * FROM units WHERE age > $1 AND name LIKE $2 ORDER BY age DESC LIMIT 10"
//! );
//! ```
//!
//! # Storage
//!
//! ```no_run
//! # #[cfg(feature = "sqlite")]
//! # async fn example() -> sqlstore::StorageResult<()> {
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//!
//! use sqlstore::backends::sqlite::SqliteBackend;
//! use sqlstore::types::{Field, FieldType, Item, Query, Schema, Value};
//! use sqlstore::{ItemStorage, RequestContext, SqlStorage, StorageConfig};
//!
//! let backend = Arc::new(SqliteBackend::in_memory()?);
//! let storage = SqlStorage::new(backend, StorageConfig::new("units"))?;
//! let ctx = RequestContext::background();
//!
//! let schema = Schema::new()
//!     .with_field("id", Field::id())
//!     .with_field("name", Field::new(FieldType::String { max_len: 150 }));
//! storage.create(&ctx, &schema).await?;
//!
//! let mut payload = BTreeMap::new();
//! payload.insert("name".to_string(), Value::from("first"));
//! let mut items = vec![Item::new("1", payload)?];
//! storage.insert(&ctx, &mut items).await?;
//!
//! let found = storage.find(&ctx, &Query::default()).await?;
//! assert_eq!(found.len(), 1);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod config;
pub mod core;
pub mod error;
pub mod executor;
pub mod query;
pub mod types;

// Re-export commonly used types at crate root
pub use config::{StatementLogging, StorageConfig};
pub use error::{StorageError, StorageResult};
pub use executor::SqlStorage;
pub use types::{Item, ItemList, Predicate, Query, Schema, Value};

// Re-export core traits
pub use core::{BackendKind, CancelHandle, ItemStorage, RequestContext, SqlBackend, SqlTransaction};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
