//! PostgreSQL backend.
//!
//! Connections come from a deadpool pool with the session statement timeout
//! set at connect time. Statements use `$N` placeholders and bind `IN` lists
//! as a single array parameter.

mod backend;
mod transaction;
mod values;

pub use backend::{PostgresBackend, PostgresConfig, PostgresSslMode};
pub use transaction::PostgresTransaction;
