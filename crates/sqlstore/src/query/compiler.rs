//! Predicate to SQL compilation.
//!
//! Translation is pure: a [`Predicate`] becomes a `WHERE` body with `?`
//! placeholders and the matching parameter list. Groups are parenthesized so
//! nested `$and`/`$or` keep their precedence, and parameters are emitted in
//! the same depth-first order as their placeholders.
//!
//! | Expression              | SQL                          |
//! |-------------------------|------------------------------|
//! | `{f: "text"}`           | `f LIKE ?`                   |
//! | `{f: 1}`                | `f IS ?`                     |
//! | `{f: {$ne: "text"}}`    | `f NOT LIKE ?`               |
//! | `{f: {$ne: 1}}`         | `f IS NOT ?`                 |
//! | `{f: {$gt: 1}}`         | `f > ?`                      |
//! | `{f: {$in: [1, 2]}}`    | `f IN (?)` with one array    |
//! | `{$or: [a, b]}`         | `(a OR b)`                   |
//!
//! `$exists` and `$regex` have no portable translation and are rejected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::SqlFragment;
use super::ident;
use crate::error::{ConfigError, QueryError, QueryResult};
use crate::types::{Expression, Predicate, Value};

/// How equality against a text value is expressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextMatch {
    /// `LIKE`/`NOT LIKE`, so `%` and `_` in the value act as wildcards.
    #[default]
    Like,
    /// `=`/`<>`.
    Exact,
}

impl fmt::Display for TextMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextMatch::Like => write!(f, "like"),
            TextMatch::Exact => write!(f, "exact"),
        }
    }
}

impl FromStr for TextMatch {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "like" => Ok(TextMatch::Like),
            "exact" => Ok(TextMatch::Exact),
            other => Err(ConfigError::InvalidValue {
                key: "text_match".to_string(),
                message: format!("expected 'like' or 'exact', got '{}'", other),
            }),
        }
    }
}

/// Compiles predicates into SQL fragments.
#[derive(Debug, Clone, Copy, Default)]
pub struct PredicateCompiler {
    text_match: TextMatch,
}

impl PredicateCompiler {
    /// Creates a compiler with the given text matching mode.
    pub fn new(text_match: TextMatch) -> Self {
        Self { text_match }
    }

    /// Compiles a predicate. The empty predicate compiles to an empty fragment.
    pub fn compile(&self, predicate: &Predicate) -> QueryResult<SqlFragment> {
        let mut out = SqlFragment::default();
        self.join(predicate.expressions(), " AND ", &mut out)?;
        Ok(out)
    }

    fn join(&self, expressions: &[Expression], sep: &str, out: &mut SqlFragment) -> QueryResult<()> {
        for (i, expression) in expressions.iter().enumerate() {
            if i > 0 {
                out.push_sql(sep);
            }
            self.expression(expression, out)?;
        }
        Ok(())
    }

    fn group(
        &self,
        operator: &'static str,
        expressions: &[Expression],
        sep: &str,
        out: &mut SqlFragment,
    ) -> QueryResult<()> {
        if expressions.is_empty() {
            return Err(QueryError::EmptyGroup { operator });
        }
        out.push_sql("(");
        self.join(expressions, sep, out)?;
        out.push_sql(")");
        Ok(())
    }

    fn expression(&self, expression: &Expression, out: &mut SqlFragment) -> QueryResult<()> {
        match expression {
            Expression::And(sub) => self.group("$and", sub, " AND ", out),
            Expression::Or(sub) => self.group("$or", sub, " OR ", out),
            Expression::In { field, values } => membership(field, "IN", values, out),
            Expression::NotIn { field, values } => membership(field, "NOT IN", values, out),
            Expression::Equal { field, value } => {
                let op = match (value.is_text(), self.text_match) {
                    (true, TextMatch::Like) => "LIKE",
                    (true, TextMatch::Exact) => "=",
                    (false, _) => "IS",
                };
                comparison(field, op, value, out)
            }
            Expression::NotEqual { field, value } => {
                let op = match (value.is_text(), self.text_match) {
                    (true, TextMatch::Like) => "NOT LIKE",
                    (true, TextMatch::Exact) => "<>",
                    (false, _) => "IS NOT",
                };
                comparison(field, op, value, out)
            }
            Expression::GreaterThan { field, value } => comparison(field, ">", value, out),
            Expression::GreaterOrEqual { field, value } => comparison(field, ">=", value, out),
            Expression::LowerThan { field, value } => comparison(field, "<", value, out),
            Expression::LowerOrEqual { field, value } => comparison(field, "<=", value, out),
            Expression::Exist { .. } | Expression::NotExist { .. } | Expression::Regex { .. } => {
                Err(QueryError::UnsupportedExpression {
                    expression: expression.operator().to_string(),
                })
            }
        }
    }
}

fn comparison(field: &str, op: &str, value: &Value, out: &mut SqlFragment) -> QueryResult<()> {
    let field = ident::validate(field)?;
    out.push_sql(&format!("{} {} ", field, op));
    let placeholder = out.add_param(value.clone());
    out.push_sql(placeholder);
    Ok(())
}

fn membership(field: &str, op: &str, values: &[Value], out: &mut SqlFragment) -> QueryResult<()> {
    let field = ident::validate(field)?;
    out.push_sql(&format!("{} {} (", field, op));
    let placeholder = out.add_param(Value::Array(values.to_vec()));
    out.push_sql(placeholder);
    out.push_sql(")");
    Ok(())
}

/// Compiles a predicate with the default text matching mode.
pub fn compile(predicate: &Predicate) -> QueryResult<SqlFragment> {
    PredicateCompiler::default().compile(predicate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile_json(doc: serde_json::Value) -> QueryResult<SqlFragment> {
        compile(&Predicate::from_json(&doc).unwrap())
    }

    #[test]
    fn test_empty_predicate() {
        let fragment = compile(&Predicate::new()).unwrap();
        assert!(fragment.is_empty());
        assert!(fragment.params.is_empty());
    }

    #[test]
    fn test_top_level_and() {
        let fragment = compile_json(json!({"a": 1, "b": 1})).unwrap();
        assert_eq!(fragment.sql, "a IS ? AND b IS ?");
        assert_eq!(fragment.params, vec![Value::Integer(1), Value::Integer(1)]);
    }

    #[test]
    fn test_text_equality_uses_like() {
        let fragment = compile_json(json!({"str": "foo"})).unwrap();
        assert_eq!(fragment.sql, "str LIKE ?");
        assert_eq!(fragment.params, vec![Value::from("foo")]);
    }

    #[test]
    fn test_exact_text_match() {
        let compiler = PredicateCompiler::new(TextMatch::Exact);
        let predicate = Predicate::new()
            .with(Expression::equal("str", "foo"))
            .with(Expression::not_equal("str", "bar"));
        let fragment = compiler.compile(&predicate).unwrap();
        assert_eq!(fragment.sql, "str = ? AND str <> ?");
    }

    #[test]
    fn test_or_group() {
        let fragment = compile_json(json!({"$or": [{"int": 1}, {"str": "foo"}]})).unwrap();
        assert_eq!(fragment.sql, "(int IS ? OR str LIKE ?)");
        assert_eq!(fragment.params, vec![Value::Integer(1), Value::from("foo")]);
    }

    #[test]
    fn test_in_binds_one_array() {
        let fragment = compile_json(json!({"int": {"$in": [1, 2]}})).unwrap();
        assert_eq!(fragment.sql, "int IN (?)");
        assert_eq!(
            fragment.params,
            vec![Value::Array(vec![Value::Integer(1), Value::Integer(2)])]
        );
    }

    #[test]
    fn test_not_in() {
        let fragment = compile_json(json!({"int": {"$nin": [3]}})).unwrap();
        assert_eq!(fragment.sql, "int NOT IN (?)");
    }

    #[test]
    fn test_nested_or_of_and() {
        let fragment = compile_json(json!({
            "$or": [
                {"$and": [{"int": 1}, {"str": "foo"}]},
                {"$and": [{"int": 2}, {"str": "bar"}]}
            ]
        }))
        .unwrap();
        assert_eq!(
            fragment.sql,
            "((int IS ? AND str LIKE ?) OR (int IS ? AND str LIKE ?))"
        );
        assert_eq!(
            fragment.params,
            vec![
                Value::Integer(1),
                Value::from("foo"),
                Value::Integer(2),
                Value::from("bar")
            ]
        );
    }

    #[test]
    fn test_comparisons() {
        let fragment = compile_json(json!({"int": {"$gt": 1, "$gte": 2, "$lt": 9, "$lte": 8}}))
            .unwrap();
        assert_eq!(fragment.sql, "int > ? AND int >= ? AND int < ? AND int <= ?");
        assert_eq!(fragment.params.len(), 4);
    }

    #[test]
    fn test_not_equal_non_text() {
        let fragment = compile_json(json!({"int": {"$ne": 1}, "str": {"$ne": "x"}})).unwrap();
        assert_eq!(fragment.sql, "int IS NOT ? AND str NOT LIKE ?");
    }

    #[test]
    fn test_unsupported_expressions() {
        for doc in [
            json!({"a": {"$exists": true}}),
            json!({"a": {"$exists": false}}),
            json!({"a": {"$regex": "^x"}}),
            json!({"$or": [{"b": 1}, {"a": {"$regex": "^x"}}]}),
        ] {
            let err = compile_json(doc).unwrap_err();
            assert!(matches!(err, QueryError::UnsupportedExpression { .. }));
            assert!(err.to_string().contains("not implemented"));
        }
    }

    #[test]
    fn test_empty_group() {
        let err = compile(&Predicate::new().with(Expression::or(vec![]))).unwrap_err();
        assert_eq!(err, QueryError::EmptyGroup { operator: "$or" });
    }

    #[test]
    fn test_invalid_field_name() {
        let err = compile(&Predicate::new().with(Expression::equal("a; --", 1))).unwrap_err();
        assert!(matches!(err, QueryError::InvalidIdentifier { .. }));
    }

    #[test]
    fn test_keyword_field_name() {
        let err = compile(&Predicate::new().with(Expression::equal("order", 1))).unwrap_err();
        assert_eq!(
            err,
            QueryError::InvalidIdentifier {
                identifier: "order".to_string()
            }
        );
    }

    #[test]
    fn test_text_match_from_str() {
        assert_eq!("LIKE".parse::<TextMatch>().unwrap(), TextMatch::Like);
        assert_eq!("exact".parse::<TextMatch>().unwrap(), TextMatch::Exact);
        assert!("fuzzy".parse::<TextMatch>().is_err());
    }
}
