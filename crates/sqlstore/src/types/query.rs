//! Sort, window and query types.

use serde::{Deserialize, Serialize};

use super::predicate::Predicate;
use crate::error::{QueryError, QueryResult};

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    /// The field to sort by.
    pub name: String,
    /// Descending order when true.
    pub reversed: bool,
}

impl SortField {
    /// Ascending sort on a field.
    pub fn asc(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reversed: false,
        }
    }

    /// Descending sort on a field.
    pub fn desc(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reversed: true,
        }
    }
}

/// Ordered list of sort keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort(pub Vec<SortField>);

impl Sort {
    /// Parses a comma separated sort expression (e.g., "-created,name").
    ///
    /// A leading `-` sorts that field in descending order.
    pub fn parse(s: &str) -> QueryResult<Self> {
        let mut fields = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let field = match part.strip_prefix('-') {
                Some(name) => SortField::desc(name.trim()),
                None => SortField::asc(part),
            };
            if field.name.is_empty() {
                return Err(QueryError::InvalidSort {
                    message: format!("missing field name in {:?}", s),
                });
            }
            fields.push(field);
        }
        Ok(Sort(fields))
    }

    /// Returns true when no sort key is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the sort keys.
    pub fn fields(&self) -> &[SortField] {
        &self.0
    }
}

/// A page of a result set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    /// Number of rows to skip.
    pub offset: usize,
    /// Maximum number of rows, unbounded when `None`.
    pub limit: Option<usize>,
}

impl Window {
    /// First `limit` rows.
    pub fn limit(limit: usize) -> Self {
        Self {
            offset: 0,
            limit: Some(limit),
        }
    }

    /// Skips `offset` rows.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// A complete find request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Filter.
    pub predicate: Predicate,
    /// Ordering.
    pub sort: Sort,
    /// Page, if any.
    pub window: Option<Window>,
}

impl Query {
    /// Matches every item.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the predicate.
    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = predicate;
        self
    }

    /// Sets the sort.
    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    /// Sets the window.
    pub fn with_window(mut self, window: Window) -> Self {
        self.window = Some(window);
        self
    }
}

impl From<Predicate> for Query {
    fn from(predicate: Predicate) -> Self {
        Query::new().with_predicate(predicate)
    }
}
