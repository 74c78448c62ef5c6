//! Database backends.
//!
//! Each backend is behind a feature flag:
//!
//! - `sqlite` (default): [`sqlite::SqliteBackend`]
//! - `postgres`: [`postgres::PostgresBackend`]

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;
