//! Error types for configuration and migration-file loading.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading configuration or migration files.
#[derive(Debug, Error)]
pub enum LoadError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A migration file has a bad name or malformed sections.
    #[error("invalid migration file {}: {reason}", path.display())]
    InvalidMigrationFile { path: PathBuf, reason: String },

    /// Two migration files share one version token.
    #[error("duplicate migration version: {0}")]
    DuplicateVersion(String),

    /// A configuration value failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience alias for results with [`LoadError`].
pub type Result<T> = std::result::Result<T, LoadError>;
