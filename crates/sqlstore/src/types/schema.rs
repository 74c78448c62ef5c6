//! Field schemas.
//!
//! The schema describes the columns of a table. It drives `CREATE TABLE` and
//! lets decoded rows be coerced back to the declared field types, since most
//! engines store booleans and timestamps as integers or text.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::value::Value;

/// Declared type of a field.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldType {
    /// Text, optionally bounded. A `max_len` of zero means unbounded.
    String {
        #[serde(default)]
        max_len: usize,
    },
    Integer,
    Float,
    Bool,
    Time,
    Url,
    Array,
    Object,
    Reference,
}

impl FieldType {
    /// Lowercase name of the type.
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String { .. } => "string",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Bool => "bool",
            FieldType::Time => "time",
            FieldType::Url => "url",
            FieldType::Array => "array",
            FieldType::Object => "object",
            FieldType::Reference => "reference",
        }
    }
}

/// A field definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Column type.
    #[serde(flatten)]
    pub field_type: FieldType,
    /// Must be present on every item.
    #[serde(default)]
    pub required: bool,
    /// Can appear in a sort.
    #[serde(default)]
    pub sortable: bool,
    /// Can appear in a predicate.
    #[serde(default)]
    pub filterable: bool,
    /// Set by the storage layer, not by callers.
    #[serde(default)]
    pub read_only: bool,
}

impl Field {
    /// A field of the given type with every flag cleared.
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            sortable: false,
            filterable: false,
            read_only: false,
        }
    }

    /// Marks the field required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Marks the field sortable.
    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    /// Marks the field filterable.
    pub fn filterable(mut self) -> Self {
        self.filterable = true;
        self
    }

    /// Marks the field read-only.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Stock identity field: bounded string, required, read-only.
    pub fn id() -> Self {
        Field::new(FieldType::String { max_len: 128 })
            .required()
            .read_only()
            .sortable()
            .filterable()
    }

    /// Stock creation timestamp.
    pub fn created() -> Self {
        Field::new(FieldType::Time)
            .required()
            .read_only()
            .sortable()
            .filterable()
    }

    /// Stock modification timestamp.
    pub fn updated() -> Self {
        Field::new(FieldType::Time)
            .required()
            .read_only()
            .sortable()
            .filterable()
    }
}

/// Field definitions keyed by name, in lexicographic order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// The fields.
    pub fields: BTreeMap<String, Field>,
}

impl Schema {
    /// An empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field.
    pub fn with_field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    /// Looks up a field.
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// Converts a decoded column value to the field's declared type.
    ///
    /// Values that already match, values of unknown fields and values that
    /// cannot be converted are returned unchanged.
    pub fn coerce(&self, name: &str, value: Value) -> Value {
        let Some(field) = self.fields.get(name) else {
            return value;
        };
        match (&field.field_type, value) {
            (FieldType::Bool, Value::Integer(i)) if i == 0 || i == 1 => Value::Bool(i == 1),
            (FieldType::Bool, Value::String(s)) => match s.as_str() {
                "1" | "true" | "t" => Value::Bool(true),
                "0" | "false" | "f" => Value::Bool(false),
                _ => Value::String(s),
            },
            (FieldType::Float, Value::Integer(i)) => Value::Float(i as f64),
            (FieldType::Time, Value::String(s)) => match parse_timestamp(&s) {
                Some(t) => Value::Timestamp(t),
                None => Value::String(s),
            },
            (_, value) => value,
        }
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}
