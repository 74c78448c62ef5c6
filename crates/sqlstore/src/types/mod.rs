//! Core types: values, items, predicates, queries and schemas.

mod item;
mod predicate;
mod query;
mod schema;
mod value;

pub use item::{ETAG_FIELD, ID_FIELD, Item, ItemList, JSON_ETAG_KEY, new_etag};
pub use predicate::{Expression, Predicate};
pub use query::{Query, Sort, SortField, Window};
pub use schema::{Field, FieldType, Schema};
pub use value::Value;

pub(crate) use value::format_timestamp;
