//! Stored items and result lists.

use std::collections::BTreeMap;

use uuid::Uuid;

use super::value::Value;
use crate::error::ItemError;

/// Column that carries the item version. Never part of a payload.
pub const ETAG_FIELD: &str = "etag";

/// Payload key and column that carries the item identity.
pub const ID_FIELD: &str = "id";

/// Key used for the etag when an item is rendered as a JSON document.
pub const JSON_ETAG_KEY: &str = "_etag";

/// Generates a fresh etag.
pub fn new_etag() -> String {
    Uuid::new_v4().simple().to_string()
}

/// A stored record.
///
/// The payload is a sorted map so column lists built from it come out in a
/// stable order. It never contains the etag, and when the id is known it is
/// mirrored under the `id` key so it round-trips as an ordinary column.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    id: Value,
    etag: String,
    payload: BTreeMap<String, Value>,
}

impl Item {
    /// Creates an item with a freshly generated etag.
    ///
    /// A [`Value::Null`] id leaves identity generation to the database; the
    /// generated id is picked up when the backend returns inserted rows.
    pub fn new(
        id: impl Into<Value>,
        mut payload: BTreeMap<String, Value>,
    ) -> Result<Self, ItemError> {
        let id = id.into();
        if payload.contains_key(ETAG_FIELD) {
            return Err(ItemError::ReservedField {
                field: ETAG_FIELD.to_string(),
            });
        }
        if let Some(existing) = payload.get(ID_FIELD) {
            if !existing.is_null() && *existing != id {
                return Err(ItemError::ImmutableId {
                    original: id.to_string(),
                    updated: existing.to_string(),
                });
            }
        }
        if id.is_null() {
            payload.remove(ID_FIELD);
        } else {
            payload.insert(ID_FIELD.to_string(), id.clone());
        }
        Ok(Self {
            id,
            etag: new_etag(),
            payload,
        })
    }

    /// Reassembles an item from decoded columns.
    pub(crate) fn from_parts(id: Value, etag: String, mut payload: BTreeMap<String, Value>) -> Self {
        payload.remove(ETAG_FIELD);
        Self { id, etag, payload }
    }

    /// Builds an item from a JSON object.
    ///
    /// The object must carry an `id` key. An `_etag` key, as written by
    /// [`Item::to_json`], sets the etag; otherwise a new one is generated.
    pub fn from_json(doc: &serde_json::Value) -> Result<Self, ItemError> {
        let object = doc.as_object().ok_or_else(|| ItemError::InvalidDocument {
            message: format!("expected an object, got {}", json_kind(doc)),
        })?;
        let id = object
            .get(ID_FIELD)
            .map(Value::from_json)
            .ok_or(ItemError::MissingId)?;

        let mut etag = None;
        let mut payload = BTreeMap::new();
        for (key, value) in object {
            if key == JSON_ETAG_KEY {
                etag = Some(value.as_str().map(str::to_string).ok_or_else(|| {
                    ItemError::InvalidDocument {
                        message: format!("{} must be a string", JSON_ETAG_KEY),
                    }
                })?);
                continue;
            }
            payload.insert(key.clone(), Value::from_json(value));
        }

        let item = Self::new(id, payload)?;
        Ok(match etag {
            Some(etag) => item.with_etag(etag),
            None => item,
        })
    }

    /// Renders the payload as a JSON object with the etag under `_etag`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut object: serde_json::Map<String, serde_json::Value> = self
            .payload
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        object.insert(
            JSON_ETAG_KEY.to_string(),
            serde_json::Value::String(self.etag.clone()),
        );
        serde_json::Value::Object(object)
    }

    /// Replaces the etag.
    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = etag.into();
        self
    }

    /// Returns the id.
    pub fn id(&self) -> &Value {
        &self.id
    }

    /// Returns the etag.
    pub fn etag(&self) -> &str {
        &self.etag
    }

    /// Returns the payload.
    pub fn payload(&self) -> &BTreeMap<String, Value> {
        &self.payload
    }

    /// Returns one payload field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.payload.get(field)
    }

    /// Sets a payload field. The etag and id cannot be set this way.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Result<(), ItemError> {
        let field = field.into();
        if field == ETAG_FIELD || field == ID_FIELD {
            return Err(ItemError::ReservedField { field });
        }
        self.payload.insert(field, value.into());
        Ok(())
    }

    /// Removes a payload field, returning its value. The id cannot be removed.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        if field == ID_FIELD {
            return None;
        }
        self.payload.remove(field)
    }

    /// Creates the next version of this item: same id, new payload, new etag.
    ///
    /// The returned item is what gets passed as `new` to an update, with
    /// `self` as the original.
    pub fn updated(&self, payload: BTreeMap<String, Value>) -> Result<Self, ItemError> {
        Self::new(self.id.clone(), payload)
    }

    /// Overwrites this item with the row a backend returned for it.
    pub(crate) fn replace_with(&mut self, other: Item) {
        *self = other;
    }
}

fn json_kind(doc: &serde_json::Value) -> &'static str {
    match doc {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// A page of items returned by a find.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemList {
    /// Total number of matching items, when known.
    pub total: Option<usize>,
    /// Page size the result was cut to, if any.
    pub limit: Option<usize>,
    /// Items in result order.
    pub items: Vec<Item>,
}

impl ItemList {
    /// Number of items in this page.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true when the page holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Renders the page as JSON.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "total": self.total,
            "limit": self.limit,
            "items": self.items.iter().map(Item::to_json).collect::<Vec<_>>(),
        })
    }
}

impl IntoIterator for ItemList {
    type Item = Item;
    type IntoIter = std::vec::IntoIter<Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
