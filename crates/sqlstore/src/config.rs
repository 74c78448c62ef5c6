//! Storage configuration.
//!
//! [`StorageConfig`] can be deserialized (every field has a default) or read
//! from the environment:
//!
//! | Variable                  | Field            | Default     |
//! |---------------------------|------------------|-------------|
//! | `SQLSTORE_TABLE`          | `table`          | `items`     |
//! | `SQLSTORE_DIALECT`        | `dialect`        | backend's   |
//! | `SQLSTORE_LOG_STATEMENTS` | `log_statements` | `off`       |
//! | `SQLSTORE_TEXT_MATCH`     | `text_match`     | `like`      |
//! | `SQLSTORE_DEFAULT_LIMIT`  | `default_limit`  | unlimited   |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::query::{Dialect, TextMatch};

/// How much of each statement is logged at debug level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementLogging {
    /// Nothing.
    #[default]
    Off,
    /// SQL text only.
    Statements,
    /// SQL text and bound parameters.
    Parameters,
}

impl fmt::Display for StatementLogging {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementLogging::Off => write!(f, "off"),
            StatementLogging::Statements => write!(f, "statements"),
            StatementLogging::Parameters => write!(f, "parameters"),
        }
    }
}

impl FromStr for StatementLogging {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" | "false" | "0" => Ok(StatementLogging::Off),
            "statements" | "on" | "true" | "1" => Ok(StatementLogging::Statements),
            "parameters" | "params" | "all" => Ok(StatementLogging::Parameters),
            other => Err(ConfigError::InvalidValue {
                key: "log_statements".to_string(),
                message: format!("unknown logging level '{}'", other),
            }),
        }
    }
}

/// Configuration for a [`SqlStorage`](crate::SqlStorage).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Table holding the collection.
    #[serde(default = "default_table")]
    pub table: String,

    /// Dialect override. `None` uses the backend's dialect.
    #[serde(default)]
    pub dialect: Option<Dialect>,

    /// Statement logging verbosity.
    #[serde(default)]
    pub log_statements: StatementLogging,

    /// How equality on text values is expressed.
    #[serde(default)]
    pub text_match: TextMatch,

    /// Page size applied to finds that do not request a window.
    #[serde(default)]
    pub default_limit: Option<usize>,
}

fn default_table() -> String {
    "items".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            table: default_table(),
            dialect: None,
            log_statements: StatementLogging::default(),
            text_match: TextMatch::default(),
            default_limit: None,
        }
    }
}

impl StorageConfig {
    /// Creates a configuration for `table` with defaults for everything else.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    /// Overrides the dialect.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    /// Sets statement logging.
    pub fn with_log_statements(mut self, level: StatementLogging) -> Self {
        self.log_statements = level;
        self
    }

    /// Sets the text matching mode.
    pub fn with_text_match(mut self, text_match: TextMatch) -> Self {
        self.text_match = text_match;
        self
    }

    /// Sets the default page size.
    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = Some(limit);
        self
    }

    /// Reads the configuration from `SQLSTORE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(table) = lookup("SQLSTORE_TABLE") {
            config.table = table;
        }
        if let Some(dialect) = lookup("SQLSTORE_DIALECT") {
            config.dialect = Some(dialect.parse()?);
        }
        if let Some(level) = lookup("SQLSTORE_LOG_STATEMENTS") {
            config.log_statements = level.parse()?;
        }
        if let Some(mode) = lookup("SQLSTORE_TEXT_MATCH") {
            config.text_match = mode.parse()?;
        }
        if let Some(limit) = lookup("SQLSTORE_DEFAULT_LIMIT") {
            let limit = limit.parse::<usize>().map_err(|e| ConfigError::InvalidValue {
                key: "SQLSTORE_DEFAULT_LIMIT".to_string(),
                message: format!("{}", e),
            })?;
            config.default_limit = Some(limit);
        }
        Ok(config)
    }
}
