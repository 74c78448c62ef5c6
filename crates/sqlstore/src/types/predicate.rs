//! Filter predicates.
//!
//! A [`Predicate`] is a list of [`Expression`]s that must all hold. It can be
//! built programmatically or parsed from the JSON filter syntax:
//!
//! ```text
//! {"str": "foo", "int": {"$gte": 2}, "$or": [{"a": 1}, {"b": {"$in": [1, 2]}}]}
//! ```

use serde_json::Map;

use super::value::Value;
use crate::error::{QueryError, QueryResult};

/// A single filter expression.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// All sub-expressions hold.
    And(Vec<Expression>),
    /// At least one sub-expression holds.
    Or(Vec<Expression>),
    /// Field value is one of the listed values.
    In { field: String, values: Vec<Value> },
    /// Field value is none of the listed values.
    NotIn { field: String, values: Vec<Value> },
    /// Field equals the value.
    Equal { field: String, value: Value },
    /// Field differs from the value.
    NotEqual { field: String, value: Value },
    /// Field is strictly greater than the value.
    GreaterThan { field: String, value: Value },
    /// Field is greater than or equal to the value.
    GreaterOrEqual { field: String, value: Value },
    /// Field is strictly lower than the value.
    LowerThan { field: String, value: Value },
    /// Field is lower than or equal to the value.
    LowerOrEqual { field: String, value: Value },
    /// Field is set.
    Exist { field: String },
    /// Field is not set.
    NotExist { field: String },
    /// Field matches a regular expression.
    Regex { field: String, pattern: String },
}

impl Expression {
    /// Field equals value.
    pub fn equal(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Expression::Equal {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Field differs from value.
    pub fn not_equal(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Expression::NotEqual {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Field greater than value.
    pub fn greater_than(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Expression::GreaterThan {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Field greater than or equal to value.
    pub fn greater_or_equal(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Expression::GreaterOrEqual {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Field lower than value.
    pub fn lower_than(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Expression::LowerThan {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Field lower than or equal to value.
    pub fn lower_or_equal(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Expression::LowerOrEqual {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Field is one of values.
    pub fn in_list<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Expression::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Field is none of values.
    pub fn not_in_list<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Expression::NotIn {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Conjunction.
    pub fn and(expressions: Vec<Expression>) -> Self {
        Expression::And(expressions)
    }

    /// Disjunction.
    pub fn or(expressions: Vec<Expression>) -> Self {
        Expression::Or(expressions)
    }

    /// Filter-syntax operator for this expression.
    pub fn operator(&self) -> &'static str {
        match self {
            Expression::And(_) => "$and",
            Expression::Or(_) => "$or",
            Expression::In { .. } => "$in",
            Expression::NotIn { .. } => "$nin",
            Expression::Equal { .. } => "$eq",
            Expression::NotEqual { .. } => "$ne",
            Expression::GreaterThan { .. } => "$gt",
            Expression::GreaterOrEqual { .. } => "$gte",
            Expression::LowerThan { .. } => "$lt",
            Expression::LowerOrEqual { .. } => "$lte",
            Expression::Exist { .. } | Expression::NotExist { .. } => "$exists",
            Expression::Regex { .. } => "$regex",
        }
    }

    /// Field the expression tests, `None` for groups.
    pub fn field(&self) -> Option<&str> {
        match self {
            Expression::And(_) | Expression::Or(_) => None,
            Expression::In { field, .. }
            | Expression::NotIn { field, .. }
            | Expression::Equal { field, .. }
            | Expression::NotEqual { field, .. }
            | Expression::GreaterThan { field, .. }
            | Expression::GreaterOrEqual { field, .. }
            | Expression::LowerThan { field, .. }
            | Expression::LowerOrEqual { field, .. }
            | Expression::Exist { field }
            | Expression::NotExist { field }
            | Expression::Regex { field, .. } => Some(field),
        }
    }
}

/// A conjunction of expressions. The empty predicate matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate(Vec<Expression>);

impl Predicate {
    /// The empty predicate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an expression.
    pub fn with(mut self, expression: Expression) -> Self {
        self.0.push(expression);
        self
    }

    /// Adds an expression in place.
    pub fn push(&mut self, expression: Expression) {
        self.0.push(expression);
    }

    /// Returns the expressions.
    pub fn expressions(&self) -> &[Expression] {
        &self.0
    }

    /// Returns true when the predicate has no expressions.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parses a predicate from its JSON text.
    pub fn parse(input: &str) -> QueryResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(Self::new());
        }
        let doc: serde_json::Value = serde_json::from_str(trimmed).map_err(|e| invalid(e.to_string()))?;
        Self::from_json(&doc)
    }

    /// Parses a predicate from a JSON document.
    pub fn from_json(doc: &serde_json::Value) -> QueryResult<Self> {
        let object = doc
            .as_object()
            .ok_or_else(|| invalid("predicate must be an object"))?;
        parse_object(object).map(Predicate)
    }
}

impl From<Vec<Expression>> for Predicate {
    fn from(expressions: Vec<Expression>) -> Self {
        Predicate(expressions)
    }
}

impl FromIterator<Expression> for Predicate {
    fn from_iter<I: IntoIterator<Item = Expression>>(iter: I) -> Self {
        Predicate(iter.into_iter().collect())
    }
}

fn invalid(message: impl Into<String>) -> QueryError {
    QueryError::InvalidPredicate {
        message: message.into(),
    }
}

fn parse_object(object: &Map<String, serde_json::Value>) -> QueryResult<Vec<Expression>> {
    let mut expressions = Vec::with_capacity(object.len());
    for (key, value) in object {
        match key.as_str() {
            "$and" => expressions.push(Expression::And(parse_group(key, value)?)),
            "$or" => expressions.push(Expression::Or(parse_group(key, value)?)),
            op if op.starts_with('$') => {
                return Err(invalid(format!("unknown top-level operator {}", op)));
            }
            field => parse_field(field, value, &mut expressions)?,
        }
    }
    Ok(expressions)
}

fn parse_group(operator: &str, value: &serde_json::Value) -> QueryResult<Vec<Expression>> {
    let members = value
        .as_array()
        .ok_or_else(|| invalid(format!("{} must be an array", operator)))?;
    let mut group = Vec::with_capacity(members.len());
    for member in members {
        let object = member
            .as_object()
            .ok_or_else(|| invalid(format!("{} members must be objects", operator)))?;
        let mut parsed = parse_object(object)?;
        // A member with several keys is itself a conjunction.
        if parsed.len() == 1 {
            group.append(&mut parsed);
        } else {
            group.push(Expression::And(parsed));
        }
    }
    Ok(group)
}

fn parse_field(
    field: &str,
    value: &serde_json::Value,
    out: &mut Vec<Expression>,
) -> QueryResult<()> {
    match value {
        serde_json::Value::Object(operators) => {
            if operators.is_empty() {
                return Err(invalid(format!("empty operator object for {}", field)));
            }
            for (op, arg) in operators {
                out.push(parse_operator(field, op, arg)?);
            }
            Ok(())
        }
        serde_json::Value::Array(_) => Err(invalid(format!(
            "{}: arrays are only allowed with $in and $nin",
            field
        ))),
        scalar => {
            out.push(Expression::equal(field, Value::from_json(scalar)));
            Ok(())
        }
    }
}

fn parse_operator(field: &str, op: &str, arg: &serde_json::Value) -> QueryResult<Expression> {
    let field = field.to_string();
    let expression = match op {
        "$ne" => Expression::NotEqual {
            field,
            value: scalar(op, arg)?,
        },
        "$gt" => Expression::GreaterThan {
            field,
            value: scalar(op, arg)?,
        },
        "$gte" => Expression::GreaterOrEqual {
            field,
            value: scalar(op, arg)?,
        },
        "$lt" => Expression::LowerThan {
            field,
            value: scalar(op, arg)?,
        },
        "$lte" => Expression::LowerOrEqual {
            field,
            value: scalar(op, arg)?,
        },
        "$in" => Expression::In {
            field,
            values: list(op, arg)?,
        },
        "$nin" => Expression::NotIn {
            field,
            values: list(op, arg)?,
        },
        "$exists" => match arg.as_bool() {
            Some(true) => Expression::Exist { field },
            Some(false) => Expression::NotExist { field },
            None => return Err(invalid("$exists takes a boolean")),
        },
        "$regex" => match arg.as_str() {
            Some(pattern) => Expression::Regex {
                field,
                pattern: pattern.to_string(),
            },
            None => return Err(invalid("$regex takes a string")),
        },
        other => return Err(invalid(format!("unknown operator {} on {}", other, field))),
    };
    Ok(expression)
}

fn scalar(op: &str, arg: &serde_json::Value) -> QueryResult<Value> {
    match arg {
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
            Err(invalid(format!("{} takes a scalar value", op)))
        }
        other => Ok(Value::from_json(other)),
    }
}

fn list(op: &str, arg: &serde_json::Value) -> QueryResult<Vec<Value>> {
    let values = arg
        .as_array()
        .ok_or_else(|| invalid(format!("{} takes an array", op)))?;
    values.iter().map(|v| scalar(op, v)).collect()
}
