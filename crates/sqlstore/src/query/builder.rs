//! Statement builder.
//!
//! Builds the dialect-neutral statements for one table. Column lists follow
//! the sorted order of payloads and schemas, so the same input always yields
//! the same SQL text.

use super::compiler::{PredicateCompiler, TextMatch};
use super::ddl::column_type;
use super::{SqlFragment, ident};
use crate::error::{QueryError, QueryResult};
use crate::types::{ETAG_FIELD, ID_FIELD, Item, Predicate, Query, Schema, Sort, Value, Window};

/// Declaration of the etag column, always the first column of a table.
const ETAG_COLUMN: &str = "etag VARCHAR(512)";

/// Builds SQL statements for a table.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    table: String,
    compiler: PredicateCompiler,
}

impl QueryBuilder {
    /// Creates a builder for `table`. The name must be a plain identifier.
    pub fn new(table: impl Into<String>) -> QueryResult<Self> {
        let table = table.into();
        ident::validate(&table)?;
        Ok(Self {
            table,
            compiler: PredicateCompiler::default(),
        })
    }

    /// Sets how equality on text values is expressed.
    pub fn with_text_match(mut self, text_match: TextMatch) -> Self {
        self.compiler = PredicateCompiler::new(text_match);
        self
    }

    /// Returns the table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// `SELECT * FROM <table>[ WHERE ...][ ORDER BY ...][ LIMIT n[ OFFSET m]]`
    pub fn build_select(&self, query: &Query) -> QueryResult<SqlFragment> {
        let mut stmt = SqlFragment::new(format!("SELECT * FROM {}", self.table));
        self.push_where(&query.predicate, &mut stmt)?;
        push_order_by(&query.sort, &mut stmt)?;
        if let Some(window) = &query.window {
            push_window(window, &mut stmt);
        }
        Ok(stmt)
    }

    /// `INSERT INTO <table> (etag, f1, ...) VALUES (?, ?, ...)[ RETURNING *]`
    ///
    /// A null id is left out so the database can generate one.
    pub fn build_insert(&self, item: &Item, returning: bool) -> QueryResult<SqlFragment> {
        let mut columns = vec![ETAG_FIELD];
        let mut params = vec![Value::from(item.etag())];
        for (field, value) in item.payload() {
            if field == ID_FIELD && value.is_null() {
                continue;
            }
            columns.push(ident::validate(field)?);
            params.push(value.clone());
        }
        let placeholders = vec!["?"; columns.len()].join(", ");
        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            columns.join(", "),
            placeholders
        );
        if returning {
            sql.push_str(" RETURNING *");
        }
        Ok(SqlFragment::with_params(sql, params))
    }

    /// `UPDATE <table> SET etag=?, f=?, ... WHERE id=? AND etag=?`
    ///
    /// Fields of `original` missing from `new` are set to `NULL`. The WHERE
    /// clause matches the original id and etag, so the statement only
    /// touches the row if nobody changed it since `original` was read.
    pub fn build_update(&self, new: &Item, original: &Item) -> QueryResult<SqlFragment> {
        let mut assignments = vec![format!("{}=?", ETAG_FIELD)];
        let mut params = vec![Value::from(new.etag())];
        for (field, value) in new.payload() {
            if field == ID_FIELD {
                continue;
            }
            assignments.push(format!("{}=?", ident::validate(field)?));
            params.push(value.clone());
        }
        for field in original.payload().keys() {
            if field == ID_FIELD || new.payload().contains_key(field) {
                continue;
            }
            assignments.push(format!("{}=NULL", ident::validate(field)?));
        }
        params.push(original.id().clone());
        params.push(Value::from(original.etag()));
        let sql = format!(
            "UPDATE {} SET {} WHERE {}=? AND {}=?",
            self.table,
            assignments.join(", "),
            ID_FIELD,
            ETAG_FIELD
        );
        Ok(SqlFragment::with_params(sql, params))
    }

    /// `DELETE FROM <table> WHERE id=?[ AND etag=?]`
    ///
    /// The etag guard is only added when the item carries an etag.
    pub fn build_delete(&self, item: &Item) -> QueryResult<SqlFragment> {
        let mut stmt = SqlFragment::with_params(
            format!("DELETE FROM {} WHERE {}=?", self.table, ID_FIELD),
            vec![item.id().clone()],
        );
        if !item.etag().is_empty() {
            stmt.push_sql(&format!(" AND {}=?", ETAG_FIELD));
            stmt.params.push(Value::from(item.etag()));
        }
        Ok(stmt)
    }

    /// `DELETE FROM <table>[ WHERE ...]`
    pub fn build_clear(&self, predicate: &Predicate) -> QueryResult<SqlFragment> {
        let mut stmt = SqlFragment::new(format!("DELETE FROM {}", self.table));
        self.push_where(predicate, &mut stmt)?;
        Ok(stmt)
    }

    /// `CREATE TABLE IF NOT EXISTS <table> (etag VARCHAR(512), f TYPE, ...)`
    pub fn build_create_table(&self, schema: &Schema) -> QueryResult<SqlFragment> {
        let mut columns = vec![ETAG_COLUMN.to_string()];
        for (name, field) in &schema.fields {
            if name == ETAG_FIELD {
                return Err(QueryError::ReservedColumn {
                    column: name.clone(),
                });
            }
            let name = ident::validate(name)?;
            columns.push(format!("{} {}", name, column_type(name, &field.field_type)?));
        }
        Ok(SqlFragment::new(format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.table,
            columns.join(", ")
        )))
    }

    fn push_where(&self, predicate: &Predicate, stmt: &mut SqlFragment) -> QueryResult<()> {
        let filter = self.compiler.compile(predicate)?;
        if !filter.is_empty() {
            stmt.push_sql(" WHERE ");
            stmt.append(filter);
        }
        Ok(())
    }
}

fn push_order_by(sort: &Sort, stmt: &mut SqlFragment) -> QueryResult<()> {
    if sort.is_empty() {
        return Ok(());
    }
    let keys = sort
        .fields()
        .iter()
        .map(|f| {
            let name = ident::validate(&f.name)?;
            Ok(if f.reversed {
                format!("{} DESC", name)
            } else {
                name.to_string()
            })
        })
        .collect::<QueryResult<Vec<_>>>()?;
    stmt.push_sql(&format!(" ORDER BY {}", keys.join(", ")));
    Ok(())
}

fn push_window(window: &Window, stmt: &mut SqlFragment) {
    match (window.limit, window.offset) {
        (Some(limit), 0) => stmt.push_sql(&format!(" LIMIT {}", limit)),
        (Some(limit), offset) => stmt.push_sql(&format!(" LIMIT {} OFFSET {}", limit, offset)),
        (None, 0) => {}
        // OFFSET needs a LIMIT on some engines.
        (None, offset) => stmt.push_sql(&format!(" LIMIT {} OFFSET {}", i64::MAX, offset)),
    }
}
