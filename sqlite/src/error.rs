//! Error types for the SQLite backend, schema operations and migrations.

use thiserror::Error;

/// Errors that can occur in the SQLite backend.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// SQLite operation failure outside the record layer.
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    /// Failure reported by the record layer or the `Database` collaborator.
    #[error(transparent)]
    Core(#[from] recordkit_core::Error),

    /// Configuration or migration-file loading failure.
    #[error("loader error: {0}")]
    LoaderError(#[from] recordkit_db::LoadError),

    /// A migration step or schema statement failed.
    #[error("migration error: {0}")]
    MigrationError(String),

    /// A stored table definition could not be rewritten safely.
    #[error("cannot rewrite table '{table}': {reason}")]
    SchemaParse { table: String, reason: String },

    /// A table, column or index name contains invalid characters.
    #[error("invalid identifier '{0}': must contain only alphanumeric characters and underscores")]
    InvalidIdentifier(String),

    /// An applied version has no registered migration unit.
    #[error("no migration found for applied version {0}")]
    MissingMigration(String),
}

/// Convenience alias for results with [`SqliteError`].
pub type Result<T> = std::result::Result<T, SqliteError>;
