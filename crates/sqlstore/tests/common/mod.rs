//! Shared fixtures for the storage integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

use sqlstore::types::{Field, FieldType, Item, Predicate, Schema, Value};

/// Schema of the sample `units` table.
pub fn units_schema() -> Schema {
    Schema::new()
        .with_field("id", Field::id())
        .with_field(
            "name",
            Field::new(FieldType::String { max_len: 150 }).sortable().filterable(),
        )
        .with_field("count", Field::new(FieldType::Integer).sortable().filterable())
        .with_field("weight", Field::new(FieldType::Float))
        .with_field("active", Field::new(FieldType::Bool).filterable())
        .with_field("created", Field::created())
}

/// A fixed creation time, offset by `minutes`.
pub fn created_at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + chrono::Duration::minutes(minutes)
}

/// A unit with every schema field set.
pub fn unit(id: &str, name: &str, count: i64) -> Item {
    let mut payload = BTreeMap::new();
    payload.insert("name".to_string(), Value::from(name));
    payload.insert("count".to_string(), Value::Integer(count));
    payload.insert("weight".to_string(), Value::Float(count as f64 / 2.0));
    payload.insert("active".to_string(), Value::Bool(count % 2 == 0));
    payload.insert("created".to_string(), Value::Timestamp(created_at(count)));
    Item::new(id, payload).unwrap()
}

/// Five units: `1`..`5` named `unit-1`..`unit-5` with counts 1..5.
pub fn five_units() -> Vec<Item> {
    (1..=5)
        .map(|i| unit(&i.to_string(), &format!("unit-{}", i), i))
        .collect()
}

/// Parses a predicate fixture.
pub fn predicate(doc: serde_json::Value) -> Predicate {
    Predicate::from_json(&doc).unwrap()
}

/// Predicate matching every unit with a count above `n`.
pub fn count_above(n: i64) -> Predicate {
    predicate(json!({"count": {"$gt": n}}))
}

/// Ids of a list of items, in order.
pub fn ids(items: &[Item]) -> Vec<String> {
    items.iter().map(|item| item.id().to_string()).collect()
}
