//! Error types for record, query and association operations.
//!
//! Validation and statement-level persistence failures are not errors:
//! they surface as `Ok(false)` from `save`/`destroy`/`valid`. This type
//! covers connection-level failures reported by the [`Database`]
//! collaborator and programmer errors such as unknown associations.
//!
//! [`Database`]: crate::Database

use thiserror::Error;

/// Boxed error produced by a [`Database`](crate::Database) implementation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while querying or persisting records.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection-level failure raised by the database collaborator.
    #[error("database error: {0}")]
    Database(#[source] BoxError),

    /// No record type with this name is registered.
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// A record type with this name was already defined.
    #[error("model already defined: {0}")]
    DuplicateModel(String),

    /// The association name is not registered on the owning type.
    #[error("unknown association '{name}' on model {model}")]
    UnknownAssociation { model: String, name: String },

    /// The association's target type is not present in the registry.
    #[error("association '{name}' on model {model} targets unknown model {target}")]
    UnresolvedTarget {
        model: String,
        name: String,
        target: String,
    },

    /// An operation needed a primary-key value the record does not have.
    #[error("record of model {0} has no primary key value")]
    MissingPrimaryKey(String),

    /// A bulk statement (`update_all`, `destroy_all`, `insert_all`) failed.
    #[error("statement failed: {0}")]
    Statement(String),

    /// Transaction control failed (begin/commit/rollback).
    #[error("transaction error: {0}")]
    Transaction(String),
}

impl Error {
    /// Wraps any driver error as a connection-level database failure.
    pub fn database(err: impl Into<BoxError>) -> Self {
        Error::Database(err.into())
    }
}

/// Convenience alias for results with [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
