//! Database and migration settings.
//!
//! Every field has a default, so an empty file (or no file at all) is a
//! valid configuration.
//!
//! # Example YAML
//!
//! ```yaml
//! database: app.db
//! migrations_dir: migrations
//! migrations_table: schema_migrations
//! foreign_keys: true
//! busy_timeout_ms: 5000
//! journal_mode: wal
//! ```

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LoadError, Result};

/// SQLite journal modes accepted by `journal_mode`.
pub const JOURNAL_MODES: &[&str] = &["delete", "truncate", "persist", "memory", "wal", "off"];

/// Connection and migration settings.
///
/// # Examples
///
/// ```
/// use recordkit_db::DatabaseConfig;
///
/// let config: DatabaseConfig = serde_yaml::from_str("database: ':memory:'").unwrap();
/// assert_eq!(config.migrations_table, "schema_migrations");
/// assert!(config.foreign_keys);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file path, or `:memory:`.
    pub database: PathBuf,
    /// Directory scanned for `<version>_<name>.sql` files.
    pub migrations_dir: PathBuf,
    /// Table recording applied versions.
    pub migrations_table: String,
    /// Enables `PRAGMA foreign_keys`.
    pub foreign_keys: bool,
    pub busy_timeout_ms: u64,
    /// `PRAGMA journal_mode` to apply on open; left untouched when unset.
    pub journal_mode: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("app.db"),
            migrations_dir: PathBuf::from("migrations"),
            migrations_table: "schema_migrations".to_string(),
            foreign_keys: true,
            busy_timeout_ms: 5000,
            journal_mode: None,
        }
    }
}

impl DatabaseConfig {
    /// Loads configuration from a YAML file and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`Io`](LoadError::Io) if the file cannot be read,
    /// [`Yaml`](LoadError::Yaml) if parsing fails, or
    /// [`InvalidConfig`](LoadError::InvalidConfig) if a value is rejected by
    /// [`validate`](Self::validate).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config: Self = serde_yaml::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// Checks values that are interpolated into SQL.
    pub fn validate(&self) -> Result<()> {
        if !is_identifier(&self.migrations_table) {
            return Err(LoadError::InvalidConfig(format!(
                "migrations_table '{}' must contain only letters, digits and '_'",
                self.migrations_table
            )));
        }
        if let Some(mode) = &self.journal_mode {
            if !JOURNAL_MODES.contains(&mode.to_lowercase().as_str()) {
                return Err(LoadError::InvalidConfig(format!(
                    "unknown journal_mode '{mode}'"
                )));
            }
        }
        Ok(())
    }

    /// `true` when `database` names an in-memory database.
    pub fn is_in_memory(&self) -> bool {
        self.database.as_os_str() == ":memory:"
    }
}

/// `true` for non-empty names made of ASCII letters, digits and `_` that
/// do not start with a digit.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
