//! Configuration and migration-file loading for recordkit.
//!
//! This crate has no database dependency. It turns files on disk into
//! values the SQLite backend consumes:
//!
//! - [`DatabaseConfig`]: YAML connection and migration settings.
//! - [`discover_migrations`]: `<version>_<name>.sql` files with
//!   `-- migrate:up` / `-- migrate:down` sections, sorted by version.
//! - [`split_statements`]: quote- and comment-aware statement splitting.
//! - [`new_migration_file`]: timestamped migration templates.
//!
//! # Quick start
//!
//! ```no_run
//! use recordkit_db::{DatabaseConfig, discover_migrations};
//!
//! let config = DatabaseConfig::load("recordkit.yml").unwrap();
//! for file in discover_migrations(&config.migrations_dir).unwrap() {
//!     println!("{} {} ({} statements)", file.version, file.name, file.up.len());
//! }
//! ```

mod config;
mod error;
mod loader;

pub use config::{DatabaseConfig, JOURNAL_MODES, is_identifier};
pub use error::{LoadError, Result};
pub use loader::{
    MigrationFile, VERSION_FORMAT, discover_migrations, load_migration_file, new_migration_file,
    parse_file_name, parse_sections, split_statements,
};
