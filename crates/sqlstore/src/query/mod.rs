//! SQL generation.
//!
//! Statements are built dialect-neutral, with `?` placeholders and an ordered
//! parameter list, then rewritten for the target engine by
//! [`Dialect::transform`](dialect::Dialect::transform).

pub mod builder;
pub mod compiler;
pub mod ddl;
pub mod dialect;
pub mod ident;

pub use builder::QueryBuilder;
pub use compiler::{PredicateCompiler, TextMatch, compile};
pub use ddl::column_type;
pub use dialect::{Dialect, PlaceholderStyle};

use crate::types::Value;

/// A fragment of SQL with bound parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlFragment {
    /// The SQL text.
    pub sql: String,
    /// Bound parameter values, in placeholder order.
    pub params: Vec<Value>,
}

impl SqlFragment {
    /// Creates a fragment without parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Creates a fragment with parameters.
    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Records a parameter and returns its placeholder.
    pub fn add_param(&mut self, param: impl Into<Value>) -> &'static str {
        self.params.push(param.into());
        "?"
    }

    /// Appends SQL text.
    pub fn push_sql(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    /// Appends another fragment, text and parameters.
    pub fn append(&mut self, other: SqlFragment) {
        self.sql.push_str(&other.sql);
        self.params.extend(other.params);
    }

    /// Returns true if this fragment is empty.
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
}
