//! SQL dialects.
//!
//! Statements are built with `?` placeholders and one [`Value::Array`]
//! parameter per membership test. [`Dialect::transform`] rewrites them for the
//! target engine:
//!
//! - [`Dialect::Default`] (SQLite, MySQL) keeps positional placeholders and,
//!   since its drivers cannot bind sequences, expands `IN (?)` into one
//!   placeholder per element. An empty list becomes the constant `1=0`
//!   (`1=1` for `NOT IN`), as MySQL rejects `IN ()`.
//! - [`Dialect::Numbered`] (PostgreSQL) renumbers placeholders to `$1..$N`,
//!   binds arrays natively (`= ANY($n)`, `<> ALL($n)`) and spells null-safe
//!   identity as `IS [NOT] DISTINCT FROM`.

use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::SqlFragment;
use crate::error::ConfigError;
use crate::types::Value;

/// How bound parameters are referenced in SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?`, bound in order of appearance.
    Positional,
    /// `$1`, `$2`, ...
    Numbered,
}

/// Target SQL dialect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Positional placeholders, no array binding.
    #[default]
    #[serde(alias = "sqlite", alias = "sqlite3", alias = "mysql")]
    Default,
    /// Numbered placeholders with native arrays.
    #[serde(alias = "postgres", alias = "postgresql", alias = "pgx")]
    Numbered,
}

impl Dialect {
    /// Placeholder style of the dialect.
    pub fn placeholder_style(self) -> PlaceholderStyle {
        match self {
            Dialect::Default => PlaceholderStyle::Positional,
            Dialect::Numbered => PlaceholderStyle::Numbered,
        }
    }

    /// Whether array parameters can be bound as a single value.
    pub fn native_arrays(self) -> bool {
        match self {
            Dialect::Default => false,
            Dialect::Numbered => true,
        }
    }

    /// Returns the dialect name.
    pub fn as_str(self) -> &'static str {
        match self {
            Dialect::Default => "default",
            Dialect::Numbered => "numbered",
        }
    }

    /// Rewrites a dialect-neutral statement for this dialect.
    ///
    /// Placeholders are paired with parameters left to right. Parameters left
    /// over after the last placeholder are kept at the end of the list.
    pub fn transform(self, stmt: SqlFragment) -> SqlFragment {
        let style = self.placeholder_style();
        let native_arrays = self.native_arrays();

        let mut sql = String::with_capacity(stmt.sql.len() + 8);
        let mut out: Vec<Value> = Vec::with_capacity(stmt.params.len());
        let mut params = stmt.params.into_iter();
        let mut n = 0;
        let mut skip_close = false;

        for ch in stmt.sql.chars() {
            if skip_close && ch == ')' {
                skip_close = false;
                continue;
            }
            if ch != '?' {
                sql.push(ch);
                continue;
            }
            match params.next() {
                Some(Value::Array(values))
                    if !native_arrays && values.is_empty() && sql.ends_with(" IN (") =>
                {
                    replace_empty_membership(&mut sql);
                    skip_close = true;
                }
                Some(Value::Array(values)) if !native_arrays && sql.ends_with("IN (") => {
                    for i in 0..values.len() {
                        if i > 0 {
                            sql.push_str(", ");
                        }
                        n += 1;
                        push_placeholder(&mut sql, style, n);
                    }
                    out.extend(values);
                }
                Some(param) => {
                    if native_arrays {
                        rewrite_operator(&mut sql, &param);
                    }
                    n += 1;
                    push_placeholder(&mut sql, style, n);
                    out.push(param);
                }
                // Unbound placeholder; the backend reports the missing value.
                None => {
                    n += 1;
                    push_placeholder(&mut sql, style, n);
                }
            }
        }
        out.extend(params);
        SqlFragment { sql, params: out }
    }
}

fn push_placeholder(sql: &mut String, style: PlaceholderStyle, n: usize) {
    match style {
        PlaceholderStyle::Positional => sql.push('?'),
        PlaceholderStyle::Numbered => {
            let _ = write!(sql, "${}", n);
        }
    }
}

/// Replaces a trailing `<field> [NOT ]IN (` with a constant condition.
fn replace_empty_membership(sql: &mut String) {
    let negated = sql.ends_with(" NOT IN (");
    let operator = if negated { " NOT IN (" } else { " IN (" };
    sql.truncate(sql.len() - operator.len());
    let field_start = sql
        .trim_end_matches(|c: char| c.is_ascii_alphanumeric() || c == '_')
        .len();
    sql.truncate(field_start);
    sql.push_str(if negated { "1=1" } else { "1=0" });
}

/// Replaces the operator right before a placeholder with its array or
/// null-safe form.
fn rewrite_operator(sql: &mut String, param: &Value) {
    const REWRITES_ARRAY: [(&str, &str); 2] = [(" NOT IN (", " <> ALL("), (" IN (", " = ANY(")];
    const REWRITES_SCALAR: [(&str, &str); 2] = [
        (" IS NOT ", " IS DISTINCT FROM "),
        (" IS ", " IS NOT DISTINCT FROM "),
    ];
    let rewrites = if matches!(param, Value::Array(_)) {
        &REWRITES_ARRAY
    } else {
        &REWRITES_SCALAR
    };
    for (from, to) in rewrites {
        if sql.ends_with(from) {
            sql.truncate(sql.len() - from.len());
            sql.push_str(to);
            return;
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = ConfigError;

    /// Maps a dialect or driver name to a dialect.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" | "sqlite" | "sqlite3" | "mysql" => Ok(Dialect::Default),
            "numbered" | "postgres" | "postgresql" | "pgx" => Ok(Dialect::Numbered),
            _ => Err(ConfigError::UnknownDriver {
                driver: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::compile;
    use crate::types::{Expression, Predicate};

    fn ints(values: &[i64]) -> Value {
        Value::Array(values.iter().map(|i| Value::Integer(*i)).collect())
    }

    #[test]
    fn test_default_passes_scalars_through() {
        let stmt = SqlFragment::with_params("a IS ? AND b LIKE ?", vec![1.into(), "x".into()]);
        let out = Dialect::Default.transform(stmt.clone());
        assert_eq!(out, stmt);
    }

    #[test]
    fn test_default_expands_in_lists() {
        let stmt = SqlFragment::with_params(
            "a IN (?) AND b IS ? AND c NOT IN (?)",
            vec![ints(&[1, 2, 3]), 4.into(), ints(&[5])],
        );
        let out = Dialect::Default.transform(stmt);
        assert_eq!(out.sql, "a IN (?, ?, ?) AND b IS ? AND c NOT IN (?)");
        assert_eq!(
            out.params,
            (1..=5).map(Value::Integer).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_default_empty_in_list() {
        let stmt = SqlFragment::with_params(
            "a IN (?) AND (b NOT IN (?) OR c IS ?)",
            vec![ints(&[]), ints(&[]), 1.into()],
        );
        let out = Dialect::Default.transform(stmt);
        assert_eq!(out.sql, "1=0 AND (1=1 OR c IS ?)");
        assert_eq!(out.params, vec![Value::Integer(1)]);
    }

    #[test]
    fn test_numbered_keeps_empty_arrays() {
        let stmt = SqlFragment::with_params("a IN (?)", vec![ints(&[])]);
        let out = Dialect::Numbered.transform(stmt);
        assert_eq!(out.sql, "a = ANY($1)");
        assert_eq!(out.params, vec![ints(&[])]);
    }

    #[test]
    fn test_numbered_has_no_gaps() {
        let stmt = SqlFragment::with_params(
            "INSERT INTO t (etag, a, b, c) VALUES (?, ?, ?, ?)",
            vec!["e".into(), 1.into(), 2.into(), 3.into()],
        );
        let out = Dialect::Numbered.transform(stmt);
        assert_eq!(out.sql, "INSERT INTO t (etag, a, b, c) VALUES ($1, $2, $3, $4)");
        assert_eq!(out.params.len(), 4);
    }

    #[test]
    fn test_numbered_arrays() {
        let predicate = Predicate::new()
            .with(Expression::in_list("a", [1, 2]))
            .with(Expression::not_in_list("b", [3]));
        let out = Dialect::Numbered.transform(compile(&predicate).unwrap());
        assert_eq!(out.sql, "a = ANY($1) AND b <> ALL($2)");
        assert_eq!(out.params, vec![ints(&[1, 2]), ints(&[3])]);
    }

    #[test]
    fn test_numbered_null_safe_identity() {
        let predicate = Predicate::new()
            .with(Expression::equal("a", 1))
            .with(Expression::not_equal("b", 2))
            .with(Expression::equal("c", "x"));
        let out = Dialect::Numbered.transform(compile(&predicate).unwrap());
        assert_eq!(
            out.sql,
            "a IS NOT DISTINCT FROM $1 AND b IS DISTINCT FROM $2 AND c LIKE $3"
        );
    }

    #[test]
    fn test_numbered_update() {
        let stmt = SqlFragment::with_params(
            "UPDATE t SET etag=?, a=?, b=NULL WHERE id=? AND etag=?",
            vec!["n".into(), 1.into(), "1".into(), "o".into()],
        );
        let out = Dialect::Numbered.transform(stmt);
        assert_eq!(
            out.sql,
            "UPDATE t SET etag=$1, a=$2, b=NULL WHERE id=$3 AND etag=$4"
        );
    }

    #[test]
    fn test_missing_params_keep_numbering() {
        let out = Dialect::Numbered.transform(SqlFragment::new("a = ? AND b = ?"));
        assert_eq!(out.sql, "a = $1 AND b = $2");
        assert!(out.params.is_empty());
    }

    #[test]
    fn test_leftover_params_are_kept() {
        let stmt = SqlFragment::with_params("a = ?", vec![1.into(), 2.into()]);
        let out = Dialect::Default.transform(stmt);
        assert_eq!(out.params, vec![Value::Integer(1), Value::Integer(2)]);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("sqlite3".parse::<Dialect>().unwrap(), Dialect::Default);
        assert_eq!("MySQL".parse::<Dialect>().unwrap(), Dialect::Default);
        assert_eq!("pgx".parse::<Dialect>().unwrap(), Dialect::Numbered);
        assert_eq!("postgres".parse::<Dialect>().unwrap(), Dialect::Numbered);
        assert_eq!(
            "oracle".parse::<Dialect>().unwrap_err(),
            ConfigError::UnknownDriver {
                driver: "oracle".to_string()
            }
        );
    }

    #[test]
    fn test_capabilities() {
        assert_eq!(Dialect::Default.placeholder_style(), PlaceholderStyle::Positional);
        assert!(!Dialect::Default.native_arrays());
        assert_eq!(Dialect::Numbered.placeholder_style(), PlaceholderStyle::Numbered);
        assert!(Dialect::Numbered.native_arrays());
    }

    #[test]
    fn test_deserialize_aliases() {
        let d: Dialect = serde_json::from_str("\"postgresql\"").unwrap();
        assert_eq!(d, Dialect::Numbered);
        let d: Dialect = serde_json::from_str("\"default\"").unwrap();
        assert_eq!(d, Dialect::Default);
    }
}
