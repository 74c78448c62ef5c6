//! Core storage traits and abstractions.
//!
//! - [`ItemStorage`] - Operations on a collection of items
//! - [`SqlBackend`] / [`SqlTransaction`] - Database driver abstraction
//! - [`RequestContext`] - Cancellation and deadlines
//!
//! ```text
//! ItemStorage  (implemented by SqlStorage<B>)
//!     └── SqlBackend  (SqliteBackend, PostgresBackend)
//!             └── SqlTransaction
//! ```

mod backend;
mod context;
mod storage;

pub use backend::{BackendKind, Row, SqlBackend, SqlTransaction};
pub use context::{CancelHandle, RequestContext};
pub use storage::ItemStorage;
