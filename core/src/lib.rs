//! Record types, dirty tracking, query building and association loading.
//!
//! This crate is storage-agnostic. It renders SQL with `?` placeholders
//! and hands it to a [`Database`] implementation (see `recordkit-sqlite`):
//!
//! - [`RecordType`]: a declared model with its table, primary key, fields,
//!   validation rules, associations and lifecycle hooks.
//! - [`ModelRegistry`]: the set of record types, used to resolve
//!   association targets by name.
//! - [`Record`]: one instance with attribute storage, a change set diffed
//!   against the last stored snapshot, per-field errors and an
//!   association cache.
//! - [`Repo`] and [`Model`]: persistence (`save`, `destroy`, `valid`,
//!   `insert_all`) and finders.
//! - [`QueryBuilder`]: immutable chainable SELECT/UPDATE/DELETE builder.
//! - [`HasMany`] and [`Repo::eager_load`]: lazy and batched association
//!   loading.
//!
//! # Example
//!
//! ```
//! use recordkit_core::*;
//!
//! let mut registry = ModelRegistry::new();
//! let users = registry
//!     .define(
//!         RecordType::new("User")
//!             .validates("email", ValidationRules::new().required().email())
//!             .has_many("posts", AssociationOptions::new()),
//!     )
//!     .unwrap();
//!
//! let mut user = Record::new(&users, row! { "name" => "Alice" });
//! user.set("email", "alice@example.com");
//! assert_eq!(user.get("name"), &Value::from("Alice"));
//! assert_eq!(users.association("posts").unwrap().target, "Post");
//! ```

mod association;
mod database;
mod error;
pub mod inflect;
mod query;
mod record;
mod registry;
mod repo;
mod types;
mod validate;
mod value;

#[cfg(test)]
mod testing;

pub use association::HasMany;
pub use database::{ColumnInfo, Database, DatabaseExt, ExecOutcome, QueryOutcome};
pub use error::{BoxError, Error, Result};
pub use query::{Op, QueryBuilder};
pub use record::{Change, Loaded, Record, RecordState};
pub use registry::ModelRegistry;
pub use repo::{BASE_ERROR_KEY, BulkInsert, Model, Repo, TIMESTAMP_FORMAT};
pub use types::*;
pub use validate::{Format, UNIQUE_MESSAGE, ValidationRules, ValueKind, check_field};
pub use value::{Row, Value, ValueKey};
