//! sqlstore demo
//!
//! Creates a sample `units` table in SQLite, inserts the items given on the
//! command line and prints the items matching a filter as JSON.
//!
//! ```text
//! sqlstore-demo --insert '{"id": "1", "name": "first", "count": 3}' \
//!     --filter '{"count": {"$gt": 1}}' --sort -count
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use sqlstore::backends::sqlite::SqliteBackend;
use sqlstore::query::TextMatch;
use sqlstore::types::{Field, FieldType, Item, Predicate, Query, Schema, Sort, Window};
use sqlstore::{ItemStorage, RequestContext, SqlStorage, StatementLogging, StorageConfig};

/// Command line options.
#[derive(Debug, Parser)]
#[command(name = "sqlstore-demo")]
#[command(about = "Store and query items in a SQL table")]
struct Options {
    /// SQLite database path, or `:memory:`.
    #[arg(long, env = "SQLSTORE_DATABASE", default_value = ":memory:")]
    database: String,

    /// Table holding the items.
    #[arg(long, env = "SQLSTORE_TABLE", default_value = "units")]
    table: String,

    /// Log level for the subscriber.
    #[arg(long, env = "SQLSTORE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Statement logging: off, statements or parameters.
    #[arg(long, env = "SQLSTORE_LOG_STATEMENTS", default_value = "off")]
    log_statements: StatementLogging,

    /// Text equality: like or exact.
    #[arg(long, env = "SQLSTORE_TEXT_MATCH", default_value = "like")]
    text_match: TextMatch,

    /// JSON document to insert. Repeatable.
    #[arg(long)]
    insert: Vec<String>,

    /// JSON filter, e.g. `{"name": "first"}`.
    #[arg(long)]
    filter: Option<String>,

    /// Comma separated sort fields, `-` for descending.
    #[arg(long)]
    sort: Option<String>,

    /// Maximum number of items to print.
    #[arg(long)]
    limit: Option<usize>,

    /// Number of items to skip.
    #[arg(long, default_value = "0")]
    offset: usize,

    /// Per-operation timeout in seconds.
    #[arg(long, env = "SQLSTORE_TIMEOUT", default_value = "30")]
    timeout: u64,
}

fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sqlstore={},sqlstore_demo={}", level, level)));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn units_schema() -> Schema {
    Schema::new()
        .with_field("id", Field::id())
        .with_field(
            "name",
            Field::new(FieldType::String { max_len: 150 })
                .required()
                .sortable()
                .filterable(),
        )
        .with_field("count", Field::new(FieldType::Integer).sortable().filterable())
        .with_field("weight", Field::new(FieldType::Float).filterable())
        .with_field("active", Field::new(FieldType::Bool).filterable())
        .with_field("created", Field::created())
        .with_field("updated", Field::updated())
}

fn build_query(options: &Options) -> anyhow::Result<Query> {
    let mut query = Query::new();
    if let Some(filter) = &options.filter {
        query = query.with_predicate(Predicate::parse(filter)?);
    }
    if let Some(sort) = &options.sort {
        query = query.with_sort(Sort::parse(sort)?);
    }
    if let Some(limit) = options.limit {
        query = query.with_window(Window::limit(limit).with_offset(options.offset));
    } else if options.offset > 0 {
        query = query.with_window(Window::default().with_offset(options.offset));
    }
    Ok(query)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let options = Options::parse();
    init_logging(&options.log_level);

    let backend = if options.database == ":memory:" {
        SqliteBackend::in_memory()?
    } else {
        SqliteBackend::open(&options.database)?
    };
    info!(database = %options.database, table = %options.table, "Opened store");

    let config = StorageConfig::new(options.table.clone())
        .with_log_statements(options.log_statements)
        .with_text_match(options.text_match);
    let storage = SqlStorage::new(Arc::new(backend), config)?;
    let ctx = RequestContext::background().with_timeout(Duration::from_secs(options.timeout));

    storage.create(&ctx, &units_schema()).await?;

    if !options.insert.is_empty() {
        let mut items = options
            .insert
            .iter()
            .map(|doc| Ok(Item::from_json(&serde_json::from_str(doc)?)?))
            .collect::<anyhow::Result<Vec<_>>>()?;
        storage.insert(&ctx, &mut items).await?;
        info!("Inserted {} items", items.len());
    }

    let list = storage.find(&ctx, &build_query(&options)?).await?;
    println!("{}", serde_json::to_string_pretty(&list.to_json())?);

    Ok(())
}
