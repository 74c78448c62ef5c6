//! Identifier validation.
//!
//! Table and column names are interpolated into SQL text unquoted, so only
//! plain identifiers that are not reserved keywords are accepted.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{QueryError, QueryResult};

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap()
});

/// Keywords reserved by SQLite or PostgreSQL, lowercase and sorted.
const RESERVED: &[&str] = &[
    "add", "all", "alter", "analyse", "analyze", "and", "any", "array", "as", "asc",
    "asymmetric", "between", "both", "by", "case", "cast", "check", "collate", "column",
    "commit", "constraint", "create", "cross", "current_catalog", "current_date",
    "current_role", "current_time", "current_timestamp", "current_user", "default",
    "deferrable", "delete", "desc", "distinct", "do", "drop", "else", "end", "escape",
    "except", "exists", "false", "fetch", "for", "foreign", "from", "full", "grant", "group",
    "having", "in", "index", "initially", "inner", "insert", "intersect", "into", "is",
    "isnull", "join", "lateral", "leading", "left", "like", "limit", "localtime",
    "localtimestamp", "natural", "not", "notnull", "null", "offset", "on", "only", "or",
    "order", "outer", "placing", "primary", "references", "returning", "right", "rollback",
    "select", "session_user", "set", "some", "symmetric", "table", "then", "to", "trailing",
    "transaction", "true", "union", "unique", "update", "user", "using", "values",
    "variadic", "when", "where", "window", "with",
];

fn is_reserved(name: &str) -> bool {
    RESERVED
        .binary_search(&name.to_ascii_lowercase().as_str())
        .is_ok()
}

/// Returns true when `name` can be used as a table or column name.
pub fn is_valid(name: &str) -> bool {
    IDENTIFIER.is_match(name) && !is_reserved(name)
}

/// Returns `name` if it can be used as a table or column name.
pub fn validate(name: &str) -> QueryResult<&str> {
    if is_valid(name) {
        Ok(name)
    } else {
        Err(QueryError::InvalidIdentifier {
            identifier: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifiers() {
        for name in ["units", "_private", "field_2", "A"] {
            assert!(is_valid(name), "{name} should be valid");
        }
    }

    #[test]
    fn test_reserved_list_is_sorted() {
        assert!(RESERVED.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_keywords_are_rejected() {
        for name in ["order", "GROUP", "Select", "user", "limit"] {
            assert_eq!(
                validate(name),
                Err(QueryError::InvalidIdentifier {
                    identifier: name.to_string()
                })
            );
        }
        for name in ["orders", "count", "name", "created", "user_id"] {
            assert!(is_valid(name), "{name} should be valid");
        }
    }

    #[test]
    fn test_invalid_identifiers() {
        for name in ["", "2field", "a b", "a;DROP TABLE x", "a.b", "\"q\"", "é"] {
            assert!(validate(name).is_err(), "{name} should be rejected");
        }
    }
}
