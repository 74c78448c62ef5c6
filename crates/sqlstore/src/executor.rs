//! Storage executor.
//!
//! [`SqlStorage`] implements [`ItemStorage`] on top of any [`SqlBackend`]. It
//! builds dialect-neutral statements, transforms them for the backend's
//! dialect, and runs every mutation inside a transaction that is committed
//! only after its last statement succeeded.
//!
//! Concurrency control is optimistic: updates and guarded deletes carry the
//! etag the caller read in their WHERE clause, and a statement that matches no
//! row is reported as a conflict.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, instrument, warn};

use crate::config::{StatementLogging, StorageConfig};
use crate::core::{BackendKind, ItemStorage, RequestContext, Row, SqlBackend, SqlTransaction};
use crate::error::{ConcurrencyError, ItemError, QueryResult, StorageError, StorageResult};
use crate::query::{Dialect, QueryBuilder, SqlFragment};
use crate::types::{ETAG_FIELD, ID_FIELD, Item, ItemList, Predicate, Query, Schema, Value, Window};

/// Item storage backed by a SQL table.
pub struct SqlStorage<B: SqlBackend> {
    backend: Arc<B>,
    config: StorageConfig,
    builder: QueryBuilder,
    dialect: Dialect,
    /// Schema used to coerce written payloads and decoded rows, set by
    /// `create` or `with_schema`.
    schema: RwLock<Option<Arc<Schema>>>,
}

impl<B: SqlBackend> std::fmt::Debug for SqlStorage<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlStorage")
            .field("backend", &self.backend)
            .field("config", &self.config)
            .field("dialect", &self.dialect)
            .finish_non_exhaustive()
    }
}

impl<B: SqlBackend> SqlStorage<B> {
    /// Creates a storage for `config.table` on `backend`.
    ///
    /// Fails if the table name is not a plain identifier.
    pub fn new(backend: Arc<B>, config: StorageConfig) -> StorageResult<Self> {
        let builder = QueryBuilder::new(config.table.clone())?.with_text_match(config.text_match);
        let dialect = config.dialect.unwrap_or_else(|| backend.dialect());
        if dialect != backend.dialect() {
            warn!(
                "Dialect override {} differs from {} backend dialect {}",
                dialect,
                backend.kind(),
                backend.dialect()
            );
        }
        Ok(Self {
            backend,
            config,
            builder,
            dialect,
            schema: RwLock::new(None),
        })
    }

    /// Sets the schema used to coerce decoded rows without creating the table.
    pub fn with_schema(self, schema: Schema) -> Self {
        *self.schema.write() = Some(Arc::new(schema));
        self
    }

    /// Returns the backend.
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Returns the configuration.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Returns the table name.
    pub fn table(&self) -> &str {
        self.builder.table()
    }

    /// Returns the dialect statements are transformed to.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Transforms a built statement for the dialect and logs it.
    fn prepare(&self, stmt: SqlFragment) -> SqlFragment {
        let stmt = self.dialect.transform(stmt);
        match self.config.log_statements {
            StatementLogging::Off => {}
            StatementLogging::Statements => debug!(sql = %stmt.sql, "executing statement"),
            StatementLogging::Parameters => {
                debug!(sql = %stmt.sql, params = ?stmt.params, "executing statement")
            }
        }
        stmt
    }

    fn build(&self, stmt: QueryResult<SqlFragment>) -> StorageResult<SqlFragment> {
        Ok(self.prepare(stmt?))
    }

    /// Maps a result row to an item.
    ///
    /// The etag column becomes the item etag, NULL columns are dropped and
    /// the remaining values are coerced to the schema's field types.
    fn decode(&self, row: Row) -> Item {
        let schema = self.schema.read().clone();
        let mut etag = String::new();
        let mut payload = BTreeMap::new();
        for (column, value) in row {
            if column == ETAG_FIELD {
                etag = match value {
                    Value::String(s) => s,
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                continue;
            }
            if value.is_null() {
                continue;
            }
            let value = match &schema {
                Some(schema) => schema.coerce(&column, value),
                None => value,
            };
            payload.insert(column, value);
        }
        let id = payload.get(ID_FIELD).cloned().unwrap_or(Value::Null);
        Item::from_parts(id, etag, payload)
    }

    /// Converts payload values to the schema's field types before they are
    /// bound, so a time given as text is stored in canonical form.
    fn normalize<'a>(&self, item: &'a Item) -> Cow<'a, Item> {
        let Some(schema) = self.schema.read().clone() else {
            return Cow::Borrowed(item);
        };
        let payload = item
            .payload()
            .iter()
            .map(|(field, value)| (field.clone(), schema.coerce(field, value.clone())))
            .collect();
        Cow::Owned(Item::from_parts(
            item.id().clone(),
            item.etag().to_string(),
            payload,
        ))
    }

    fn conflict(&self, item: &Item) -> StorageError {
        warn!(
            "Etag conflict on {}/{}: expected etag {}",
            self.table(),
            item.id(),
            item.etag()
        );
        StorageError::Concurrency(ConcurrencyError::Conflict {
            table: self.table().to_string(),
            id: item.id().to_string(),
            expected_etag: item.etag().to_string(),
        })
    }

    /// Commits on success, rolls back on failure.
    async fn finish<T: Send>(
        &self,
        tx: B::Transaction,
        result: StorageResult<T>,
    ) -> StorageResult<T> {
        match result {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                debug!("Rolling back transaction on {}: {}", self.table(), err);
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("Rollback failed on {}: {}", self.table(), rollback_err);
                }
                Err(err)
            }
        }
    }
}

fn backend_name(kind: BackendKind) -> &'static str {
    match kind {
        BackendKind::Sqlite => "sqlite",
        BackendKind::Postgres => "postgres",
        BackendKind::Custom(name) => name,
    }
}

#[async_trait]
impl<B: SqlBackend> ItemStorage for SqlStorage<B> {
    fn backend_name(&self) -> &'static str {
        backend_name(self.backend.kind())
    }

    #[instrument(skip(self, ctx, schema), fields(table = %self.table()))]
    async fn create(&self, ctx: &RequestContext, schema: &Schema) -> StorageResult<()> {
        ctx.run(async {
            let stmt = self.build(self.builder.build_create_table(schema))?;
            self.backend.execute(&stmt).await?;
            *self.schema.write() = Some(Arc::new(schema.clone()));
            debug!("Created table {} with {} fields", self.table(), schema.fields.len());
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, ctx, query), fields(table = %self.table()))]
    async fn find(&self, ctx: &RequestContext, query: &Query) -> StorageResult<ItemList> {
        ctx.run(async {
            let defaulted;
            let query = match (query.window, self.config.default_limit) {
                (None, Some(limit)) => {
                    defaulted = Query {
                        window: Some(Window::limit(limit)),
                        ..query.clone()
                    };
                    &defaulted
                }
                _ => query,
            };
            let stmt = self.build(self.builder.build_select(query))?;
            let rows = self.backend.query(&stmt).await?;
            let items: Vec<Item> = rows.into_iter().map(|row| self.decode(row)).collect();
            debug!("Found {} items in {}", items.len(), self.table());
            Ok(ItemList {
                total: query.window.is_none().then_some(items.len()),
                limit: query.window.and_then(|w| w.limit),
                items,
            })
        })
        .await
    }

    #[instrument(skip(self, ctx, items), fields(table = %self.table(), count = items.len()))]
    async fn insert(&self, ctx: &RequestContext, items: &mut [Item]) -> StorageResult<()> {
        if items.is_empty() {
            return Ok(());
        }
        ctx.run(async {
            let returning = self.backend.supports_returning();
            let stmts = items
                .iter()
                .map(|item| {
                    self.build(self.builder.build_insert(&self.normalize(item), returning))
                })
                .collect::<StorageResult<Vec<_>>>()?;

            let mut tx = self.backend.begin().await?;
            let result = async {
                let mut stored = Vec::with_capacity(stmts.len());
                for stmt in &stmts {
                    ctx.check()?;
                    if returning {
                        let row = tx.query(stmt).await?.into_iter().next();
                        stored.push(row.map(|row| self.decode(row)));
                    } else {
                        tx.execute(stmt).await?;
                        stored.push(None);
                    }
                }
                Ok::<_, StorageError>(stored)
            }
            .await;
            let stored = self.finish(tx, result).await?;

            for (item, row) in items.iter_mut().zip(stored) {
                if let Some(row) = row {
                    item.replace_with(row);
                }
            }
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, ctx, new, original), fields(table = %self.table(), id = %original.id()))]
    async fn update(
        &self,
        ctx: &RequestContext,
        new: &Item,
        original: &Item,
    ) -> StorageResult<()> {
        if new.id() != original.id() {
            return Err(ItemError::ImmutableId {
                original: original.id().to_string(),
                updated: new.id().to_string(),
            }
            .into());
        }
        ctx.run(async {
            let stmt = self.build(self.builder.build_update(&self.normalize(new), original))?;
            let mut tx = self.backend.begin().await?;
            let result = match tx.execute(&stmt).await {
                Ok(0) => Err(self.conflict(original)),
                Ok(_) => Ok(()),
                Err(err) => Err(err),
            };
            self.finish(tx, result).await
        })
        .await
    }

    #[instrument(skip(self, ctx, item), fields(table = %self.table(), id = %item.id()))]
    async fn delete(&self, ctx: &RequestContext, item: &Item) -> StorageResult<()> {
        ctx.run(async {
            let stmt = self.build(self.builder.build_delete(item))?;
            match self.backend.execute(&stmt).await? {
                0 if item.etag().is_empty() => Err(ItemError::NotFound {
                    table: self.table().to_string(),
                    id: item.id().to_string(),
                }
                .into()),
                0 => Err(self.conflict(item)),
                _ => Ok(()),
            }
        })
        .await
    }

    #[instrument(skip(self, ctx, predicate), fields(table = %self.table()))]
    async fn clear(&self, ctx: &RequestContext, predicate: &Predicate) -> StorageResult<u64> {
        ctx.run(async {
            let stmt = self.build(self.builder.build_clear(predicate))?;
            let mut tx = self.backend.begin().await?;
            let result = tx.execute(&stmt).await;
            let removed = self.finish(tx, result).await?;
            debug!("Cleared {} items from {}", removed, self.table());
            Ok(removed)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BackendError, RequestError};
    use crate::types::Expression;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Records every statement and replays scripted results.
    #[derive(Debug, Default)]
    struct Script {
        log: Vec<String>,
        affected: VecDeque<u64>,
        rows: VecDeque<Vec<Row>>,
        fail_at: Option<usize>,
        statements: usize,
    }

    impl Script {
        fn run(&mut self, sql: &str) -> StorageResult<()> {
            self.log.push(sql.to_string());
            self.statements += 1;
            if self.fail_at == Some(self.statements) {
                return Err(BackendError::Execution {
                    backend_name: "memory".to_string(),
                    message: "no such column: bogus".to_string(),
                    source: None,
                }
                .into());
            }
            Ok(())
        }
    }

    #[derive(Debug)]
    struct FakeBackend {
        script: Arc<Mutex<Script>>,
        dialect: Dialect,
        returning: bool,
    }

    impl FakeBackend {
        fn new() -> Self {
            Self {
                script: Arc::new(Mutex::new(Script::default())),
                dialect: Dialect::Default,
                returning: false,
            }
        }

        fn log(&self) -> Vec<String> {
            self.script.lock().log.clone()
        }
    }

    struct FakeTransaction {
        script: Arc<Mutex<Script>>,
        active: bool,
    }

    #[async_trait]
    impl SqlBackend for FakeBackend {
        type Transaction = FakeTransaction;

        fn kind(&self) -> BackendKind {
            BackendKind::Custom("memory")
        }

        fn dialect(&self) -> Dialect {
            self.dialect
        }

        fn supports_returning(&self) -> bool {
            self.returning
        }

        async fn execute(&self, stmt: &SqlFragment) -> StorageResult<u64> {
            let mut script = self.script.lock();
            script.run(&stmt.sql)?;
            Ok(script.affected.pop_front().unwrap_or(1))
        }

        async fn query(&self, stmt: &SqlFragment) -> StorageResult<Vec<Row>> {
            let mut script = self.script.lock();
            script.run(&stmt.sql)?;
            Ok(script.rows.pop_front().unwrap_or_default())
        }

        async fn begin(&self) -> StorageResult<FakeTransaction> {
            self.script.lock().log.push("BEGIN".to_string());
            Ok(FakeTransaction {
                script: self.script.clone(),
                active: true,
            })
        }

        async fn health_check(&self) -> StorageResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl SqlTransaction for FakeTransaction {
        async fn execute(&mut self, stmt: &SqlFragment) -> StorageResult<u64> {
            let mut script = self.script.lock();
            script.run(&stmt.sql)?;
            Ok(script.affected.pop_front().unwrap_or(1))
        }

        async fn query(&mut self, stmt: &SqlFragment) -> StorageResult<Vec<Row>> {
            let mut script = self.script.lock();
            script.run(&stmt.sql)?;
            Ok(script.rows.pop_front().unwrap_or_default())
        }

        async fn commit(mut self) -> StorageResult<()> {
            self.active = false;
            self.script.lock().log.push("COMMIT".to_string());
            Ok(())
        }

        async fn rollback(mut self) -> StorageResult<()> {
            self.active = false;
            self.script.lock().log.push("ROLLBACK".to_string());
            Ok(())
        }

        fn is_active(&self) -> bool {
            self.active
        }
    }

    fn storage(backend: FakeBackend) -> (SqlStorage<FakeBackend>, Arc<FakeBackend>) {
        let backend = Arc::new(backend);
        let storage = SqlStorage::new(backend.clone(), StorageConfig::new("units")).unwrap();
        (storage, backend)
    }

    fn item(id: &str, int: i64) -> Item {
        let mut payload = BTreeMap::new();
        payload.insert("int".to_string(), Value::Integer(int));
        Item::new(id, payload).unwrap()
    }

    #[tokio::test]
    async fn test_update_commits() {
        let (storage, backend) = storage(FakeBackend::new());
        let original = item("1", 1);
        let new = original.updated(item("1", 2).payload().clone()).unwrap();
        storage
            .update(&RequestContext::background(), &new, &original)
            .await
            .unwrap();
        assert_eq!(
            backend.log(),
            vec![
                "BEGIN",
                "UPDATE units SET etag=?, int=? WHERE id=? AND etag=?",
                "COMMIT"
            ]
        );
    }

    #[tokio::test]
    async fn test_update_conflict_rolls_back() {
        let fake = FakeBackend::new();
        fake.script.lock().affected.push_back(0);
        let (storage, backend) = storage(fake);
        let original = item("1", 1);
        let new = original.updated(BTreeMap::new()).unwrap();
        let err = storage
            .update(&RequestContext::background(), &new, &original)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(backend.log().last().map(String::as_str), Some("ROLLBACK"));
        assert!(!backend.log().contains(&"COMMIT".to_string()));
    }

    #[tokio::test]
    async fn test_update_rejects_id_change() {
        let (storage, backend) = storage(FakeBackend::new());
        let err = storage
            .update(&RequestContext::background(), &item("2", 1), &item("1", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Item(ItemError::ImmutableId { .. })));
        assert!(backend.log().is_empty());
    }

    #[tokio::test]
    async fn test_insert_batch_failure_rolls_back() {
        let fake = FakeBackend::new();
        fake.script.lock().fail_at = Some(2);
        let (storage, backend) = storage(fake);
        let mut items = vec![item("1", 1), item("2", 2), item("3", 3)];
        let before = items.clone();
        let err = storage
            .insert(&RequestContext::background(), &mut items)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Backend(BackendError::Execution { .. })));
        let log = backend.log();
        assert_eq!(log.first().map(String::as_str), Some("BEGIN"));
        assert_eq!(log.last().map(String::as_str), Some("ROLLBACK"));
        assert_eq!(log.iter().filter(|s| s.starts_with("INSERT")).count(), 2);
        assert_eq!(items, before);
    }

    #[tokio::test]
    async fn test_insert_empty_batch_is_noop() {
        let (storage, backend) = storage(FakeBackend::new());
        storage
            .insert(&RequestContext::background(), &mut [])
            .await
            .unwrap();
        assert!(backend.log().is_empty());
    }

    #[tokio::test]
    async fn test_insert_returning_replaces_items() {
        let mut fake = FakeBackend::new();
        fake.returning = true;
        fake.script.lock().rows.push_back(vec![Row {
            columns: vec!["id".into(), "etag".into(), "str".into()],
            values: vec![Value::Integer(7), Value::from("server"), Value::from("a")],
        }]);
        let (storage, backend) = storage(fake);
        let mut payload = BTreeMap::new();
        payload.insert("str".to_string(), Value::from("a"));
        let mut items = vec![Item::new(Value::Null, payload).unwrap()];
        storage
            .insert(&RequestContext::background(), &mut items)
            .await
            .unwrap();
        assert_eq!(items[0].id(), &Value::Integer(7));
        assert_eq!(items[0].etag(), "server");
        assert_eq!(items[0].get("str"), Some(&Value::from("a")));
        assert_eq!(
            backend.log()[1],
            "INSERT INTO units (etag, str) VALUES (?, ?) RETURNING *"
        );
    }

    #[tokio::test]
    async fn test_cancelled_context_runs_nothing() {
        let (storage, backend) = storage(FakeBackend::new());
        let (ctx, handle) = RequestContext::cancellable();
        handle.cancel();
        let mut items = vec![item("1", 1)];
        let err = storage.insert(&ctx, &mut items).await.unwrap_err();
        assert!(matches!(err, StorageError::Request(RequestError::Cancelled)));
        assert!(backend.log().is_empty());
    }

    #[tokio::test]
    async fn test_delete_outcomes() {
        let fake = FakeBackend::new();
        fake.script.lock().affected.extend([0, 0, 1]);
        let (storage, backend) = storage(fake);
        let ctx = RequestContext::background();

        let err = storage.delete(&ctx, &item("1", 1)).await.unwrap_err();
        assert!(err.is_conflict());

        let err = storage
            .delete(&ctx, &item("1", 1).with_etag(""))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Item(ItemError::NotFound { .. })));

        storage.delete(&ctx, &item("1", 1)).await.unwrap();
        assert!(!backend.log().contains(&"BEGIN".to_string()));
    }

    #[tokio::test]
    async fn test_clear_returns_count() {
        let fake = FakeBackend::new();
        fake.script.lock().affected.push_back(3);
        let (storage, backend) = storage(fake);
        let removed = storage
            .clear(&RequestContext::background(), &Predicate::new())
            .await
            .unwrap();
        assert_eq!(removed, 3);
        assert_eq!(backend.log(), vec!["BEGIN", "DELETE FROM units", "COMMIT"]);
    }

    #[tokio::test]
    async fn test_find_applies_default_limit() {
        let backend = Arc::new(FakeBackend::new());
        let storage = SqlStorage::new(
            backend.clone(),
            StorageConfig::new("units").with_default_limit(10),
        )
        .unwrap();
        let list = storage
            .find(&RequestContext::background(), &Query::new())
            .await
            .unwrap();
        assert_eq!(list.total, None);
        assert_eq!(list.limit, Some(10));
        assert_eq!(backend.log(), vec!["SELECT * FROM units LIMIT 10"]);
    }

    #[tokio::test]
    async fn test_find_decodes_rows() {
        let fake = FakeBackend::new();
        fake.script.lock().rows.push_back(vec![Row {
            columns: vec!["etag".into(), "id".into(), "flag".into(), "str".into()],
            values: vec![
                Value::from("abc"),
                Value::from("1"),
                Value::Integer(1),
                Value::Null,
            ],
        }]);
        let (storage, _backend) = storage(fake);
        let storage = storage.with_schema(
            Schema::new().with_field("flag", crate::types::Field::new(crate::types::FieldType::Bool)),
        );
        let list = storage
            .find(&RequestContext::background(), &Query::new())
            .await
            .unwrap();
        assert_eq!(list.total, Some(1));
        let found = &list.items[0];
        assert_eq!(found.id(), &Value::from("1"));
        assert_eq!(found.etag(), "abc");
        assert_eq!(found.get("flag"), Some(&Value::Bool(true)));
        assert!(found.get("str").is_none());
        assert!(found.get("etag").is_none());
    }

    #[test]
    fn test_normalize_coerces_payload_to_schema() {
        use chrono::{TimeZone, Utc};

        let (storage, _backend) = storage(FakeBackend::new());
        let mut payload = BTreeMap::new();
        payload.insert("at".to_string(), Value::from("2024-03-01T13:00:00+01:00"));
        payload.insert("flag".to_string(), Value::Integer(1));
        let raw = Item::new("1", payload).unwrap();

        assert!(matches!(storage.normalize(&raw), Cow::Borrowed(_)));

        let storage = storage.with_schema(
            Schema::new()
                .with_field("at", crate::types::Field::new(crate::types::FieldType::Time))
                .with_field("flag", crate::types::Field::new(crate::types::FieldType::Bool)),
        );
        let normalized = storage.normalize(&raw);
        assert_eq!(
            normalized.get("at"),
            Some(&Value::Timestamp(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()))
        );
        assert_eq!(normalized.get("flag"), Some(&Value::Bool(true)));
        assert_eq!(normalized.etag(), raw.etag());
        assert_eq!(normalized.id(), raw.id());
    }

    #[tokio::test]
    async fn test_numbered_dialect_override() {
        let backend = Arc::new(FakeBackend::new());
        let storage = SqlStorage::new(
            backend.clone(),
            StorageConfig::new("units").with_dialect(Dialect::Numbered),
        )
        .unwrap();
        let query = Query::from(Predicate::new().with(Expression::in_list("int", [1, 2])));
        storage
            .find(&RequestContext::background(), &query)
            .await
            .unwrap();
        assert_eq!(backend.log(), vec!["SELECT * FROM units WHERE int = ANY($1)"]);
    }

    #[tokio::test]
    async fn test_unsupported_expression_runs_nothing() {
        let (storage, backend) = storage(FakeBackend::new());
        let query = Query::from(Predicate::new().with(Expression::Regex {
            field: "str".into(),
            pattern: "^a".into(),
        }));
        let err = storage
            .find(&RequestContext::background(), &query)
            .await
            .unwrap_err();
        assert!(err.is_unsupported());
        assert!(backend.log().is_empty());
    }

    #[test]
    fn test_invalid_table_name() {
        let err = SqlStorage::new(Arc::new(FakeBackend::new()), StorageConfig::new("bad name"))
            .unwrap_err();
        assert!(matches!(err, StorageError::Query(_)));
    }
}
