//! SQLite backend for recordkit.
//!
//! This crate connects the record layer in
//! [`recordkit_core`] to SQLite through `rusqlite` and adds the schema
//! tooling used to evolve a database over time.
//!
//! # Architecture
//!
//! - **`connection`**: [`SqliteDatabase`], the [`Database`](recordkit_core::Database)
//!   implementation with nested transactions via savepoints
//! - **`schema`**: [`SchemaOps`] and [`TableBuilder`] for table, column and
//!   index changes, including `drop_column` by table rebuild
//! - **`migration`**: [`MigrationEngine`] applying versioned [`Migration`]s
//!   recorded in a tracking table
//! - **`convert`**: value conversion between record values and SQLite
//!
//! # Quick start
//!
//! ```
//! use recordkit_core::{FieldDef, ModelRegistry, RecordType, Repo, Row};
//! use recordkit_sqlite::{MigrationEngine, FnMigration, SqliteDatabase, TableBuilder};
//!
//! let db = SqliteDatabase::open_in_memory().unwrap();
//! let mut engine = MigrationEngine::new(&db, "schema_migrations").unwrap();
//! engine
//!     .register(FnMigration::new(
//!         "001",
//!         "create_users",
//!         |ops| ops.create_table("users", TableBuilder::new().id().text("name")),
//!         |ops| ops.drop_table("users"),
//!     ))
//!     .unwrap();
//! engine.migrate().unwrap();
//!
//! let mut registry = ModelRegistry::new();
//! registry.define(RecordType::new("User").field(FieldDef::text("name"))).unwrap();
//! let repo = Repo::new(&db, &registry);
//!
//! let users = repo.model("User").unwrap();
//! let mut user = users.new_record(Row::new());
//! user.set("name", "Ada");
//! assert!(repo.save(&mut user).unwrap());
//! assert_eq!(users.count().unwrap(), 1);
//! ```

mod connection;
mod convert;
mod error;
mod migration;
mod schema;

pub use connection::SqliteDatabase;
pub use error::{Result, SqliteError};
pub use migration::{FnMigration, Migration, MigrationEngine, MigrationStatus, SqlMigration};
pub use schema::{SchemaOps, TableBuilder, column_sql, normalize_type};
