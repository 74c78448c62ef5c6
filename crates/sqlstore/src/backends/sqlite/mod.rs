//! SQLite backend.
//!
//! Connections come from an r2d2 pool; every write runs inside a
//! `BEGIN IMMEDIATE` transaction. Timestamps are stored as RFC 3339 text and
//! booleans as `0`/`1`.

mod backend;
mod transaction;
mod values;

pub use backend::{SqliteBackend, SqliteBackendConfig};
pub use transaction::SqliteTransaction;
