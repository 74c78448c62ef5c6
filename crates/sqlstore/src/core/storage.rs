//! Core item storage trait.
//!
//! This module defines the [`ItemStorage`] trait, the operations a REST layer
//! performs on a collection of items. Every operation takes a
//! [`RequestContext`] so callers can cancel it or bound its duration.

use async_trait::async_trait;

use super::context::RequestContext;
use crate::error::StorageResult;
use crate::types::{Item, ItemList, Predicate, Query, Schema};

/// Storage for one collection of items.
///
/// # Optimistic Concurrency
///
/// Every item carries an etag. Updates and deletes only apply when the stored
/// etag still matches the one the caller read; otherwise they fail with a
/// conflict (see [`StorageError::is_conflict`](crate::StorageError::is_conflict))
/// and the caller is expected to refetch and retry.
///
/// # Example
///
/// ```ignore
/// use sqlstore::{ItemStorage, RequestContext, Predicate, Query};
///
/// async fn rename<S: ItemStorage>(storage: &S) -> StorageResult<()> {
///     let ctx = RequestContext::background();
///     let query = Query::from(Predicate::parse(r#"{"id": "1"}"#)?);
///     let found = storage.find(&ctx, &query).await?;
///     let original = &found.items[0];
///
///     let mut payload = original.payload().clone();
///     payload.insert("str".into(), "renamed".into());
///     let updated = original.updated(payload)?;
///     storage.update(&ctx, &updated, original).await
/// }
/// ```
#[async_trait]
pub trait ItemStorage: Send + Sync {
    /// Returns a human-readable name for this storage backend.
    fn backend_name(&self) -> &'static str;

    /// Creates the collection's table if it does not exist.
    ///
    /// # Errors
    ///
    /// * `QueryError::UnsupportedFieldType` - If a field has no column mapping
    async fn create(&self, ctx: &RequestContext, schema: &Schema) -> StorageResult<()>;

    /// Finds the items matching a query.
    ///
    /// # Errors
    ///
    /// * `QueryError::UnsupportedExpression` - If the predicate cannot be translated
    async fn find(&self, ctx: &RequestContext, query: &Query) -> StorageResult<ItemList>;

    /// Inserts items atomically, in order.
    ///
    /// When the backend returns inserted rows, each item is replaced with its
    /// stored form, which picks up generated ids and column defaults. Items are
    /// left untouched if the batch fails.
    async fn insert(&self, ctx: &RequestContext, items: &mut [Item]) -> StorageResult<()>;

    /// Replaces `original` with `new`.
    ///
    /// # Errors
    ///
    /// * `ConcurrencyError::Conflict` - If the stored etag no longer matches `original`
    /// * `ItemError::ImmutableId` - If the ids differ
    async fn update(&self, ctx: &RequestContext, new: &Item, original: &Item)
    -> StorageResult<()>;

    /// Deletes an item.
    ///
    /// # Errors
    ///
    /// * `ConcurrencyError::Conflict` - If the item has an etag that no longer matches
    /// * `ItemError::NotFound` - If the item has no etag and no row has its id
    async fn delete(&self, ctx: &RequestContext, item: &Item) -> StorageResult<()>;

    /// Deletes every item matching a predicate, returning how many were removed.
    async fn clear(&self, ctx: &RequestContext, predicate: &Predicate) -> StorageResult<u64>;
}
