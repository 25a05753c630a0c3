//! Versioned, reversible schema migrations.
//!
//! Provides [`MigrationEngine`] for applying and reverting [`Migration`]
//! units. Applied versions are recorded in a tracking table
//! (`schema_migrations` by default):
//!
//! ```sql
//! CREATE TABLE schema_migrations (
//!     version TEXT PRIMARY KEY,
//!     migrated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
//! );
//! ```
//!
//! Every apply or revert runs in its own transaction together with the
//! tracking-table write, so a failing step leaves its version exactly where
//! it was.
//!
//! # Example
//!
//! ```no_run
//! use recordkit_db::DatabaseConfig;
//! use recordkit_sqlite::{MigrationEngine, SqliteDatabase};
//!
//! let config = DatabaseConfig::load("recordkit.yml").unwrap();
//! let db = SqliteDatabase::open(&config).unwrap();
//! let mut engine = MigrationEngine::from_config(&db, &config).unwrap();
//!
//! for version in engine.migrate().unwrap() {
//!     println!("applied {version}");
//! }
//! for entry in engine.status().unwrap() {
//!     println!("{} {} {}", if entry.applied { "up" } else { "down" }, entry.version, entry.name);
//! }
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use recordkit_core::{Database, DatabaseExt, Value};
use recordkit_db::{DatabaseConfig, LoadError, MigrationFile, discover_migrations};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Result, SqliteError};
use crate::schema::{SchemaOps, validate_identifier};

/// One reversible schema change.
pub trait Migration {
    /// Lexically sortable version token.
    fn version(&self) -> &str;

    fn name(&self) -> &str;

    fn up(&self, ops: &SchemaOps<'_>) -> Result<()>;

    fn down(&self, ops: &SchemaOps<'_>) -> Result<()>;
}

/// Migration loaded from a `<version>_<name>.sql` file.
#[derive(Debug, Clone)]
pub struct SqlMigration {
    file: MigrationFile,
}

impl SqlMigration {
    pub fn file(&self) -> &MigrationFile {
        &self.file
    }
}

impl From<MigrationFile> for SqlMigration {
    fn from(file: MigrationFile) -> Self {
        Self { file }
    }
}

impl Migration for SqlMigration {
    fn version(&self) -> &str {
        &self.file.version
    }

    fn name(&self) -> &str {
        &self.file.name
    }

    fn up(&self, ops: &SchemaOps<'_>) -> Result<()> {
        self.file.up.iter().try_for_each(|sql| ops.execute(sql))
    }

    fn down(&self, ops: &SchemaOps<'_>) -> Result<()> {
        self.file.down.iter().try_for_each(|sql| ops.execute(sql))
    }
}

type Step = Box<dyn Fn(&SchemaOps<'_>) -> Result<()>>;

/// Migration defined in code.
///
/// # Examples
///
/// ```
/// use recordkit_sqlite::{FnMigration, MigrationEngine, SqliteDatabase, TableBuilder};
///
/// let db = SqliteDatabase::open_in_memory().unwrap();
/// let mut engine = MigrationEngine::new(&db, "schema_migrations").unwrap();
/// engine
///     .register(FnMigration::new(
///         "001",
///         "create_users",
///         |ops| ops.create_table("users", TableBuilder::new().id().text("name")),
///         |ops| ops.drop_table("users"),
///     ))
///     .unwrap();
///
/// assert_eq!(engine.migrate().unwrap(), vec!["001".to_string()]);
/// assert!(engine.migrate().unwrap().is_empty());
/// ```
pub struct FnMigration {
    version: String,
    name: String,
    up: Step,
    down: Step,
}

impl FnMigration {
    pub fn new(
        version: &str,
        name: &str,
        up: impl Fn(&SchemaOps<'_>) -> Result<()> + 'static,
        down: impl Fn(&SchemaOps<'_>) -> Result<()> + 'static,
    ) -> Self {
        Self {
            version: version.to_string(),
            name: name.to_string(),
            up: Box::new(up),
            down: Box::new(down),
        }
    }
}

impl Migration for FnMigration {
    fn version(&self) -> &str {
        &self.version
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn up(&self, ops: &SchemaOps<'_>) -> Result<()> {
        (self.up)(ops)
    }

    fn down(&self, ops: &SchemaOps<'_>) -> Result<()> {
        (self.down)(ops)
    }
}

/// Applied state of one registered migration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationStatus {
    pub version: String,
    pub name: String,
    pub applied: bool,
    /// Time the version was recorded, as stored by SQLite.
    pub migrated_at: Option<String>,
}

/// Applies and reverts migrations against one database.
pub struct MigrationEngine<'a> {
    db: &'a dyn Database,
    table: String,
    migrations: Vec<Box<dyn Migration + 'a>>,
}

impl<'a> MigrationEngine<'a> {
    /// Creates an engine with no migrations registered and ensures the
    /// tracking table exists.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::InvalidIdentifier`] if `table` contains
    /// invalid characters.
    pub fn new(db: &'a dyn Database, table: &str) -> Result<Self> {
        validate_identifier(table)?;
        let engine = Self {
            db,
            table: table.to_string(),
            migrations: Vec::new(),
        };
        SchemaOps::new(db).execute(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
             version TEXT PRIMARY KEY, \
             migrated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP)"
        ))?;
        Ok(engine)
    }

    /// Creates an engine for the configured tracking table and registers
    /// every file in the configured migrations directory.
    pub fn from_config(db: &'a dyn Database, config: &DatabaseConfig) -> Result<Self> {
        let mut engine = Self::new(db, &config.migrations_table)?;
        engine.load_dir(&config.migrations_dir)?;
        Ok(engine)
    }

    /// Registers every migration file in `dir`; returns how many were added.
    pub fn load_dir(&mut self, dir: impl AsRef<Path>) -> Result<usize> {
        let files = discover_migrations(dir)?;
        let count = files.len();
        for file in files {
            self.register(SqlMigration::from(file))?;
        }
        Ok(count)
    }

    /// Adds a migration, keeping the list sorted by version.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::DuplicateVersion`] (wrapped) when the version is
    /// already registered.
    pub fn register(&mut self, migration: impl Migration + 'a) -> Result<()> {
        let version = migration.version();
        match self
            .migrations
            .binary_search_by(|m| m.version().cmp(version))
        {
            Ok(_) => Err(LoadError::DuplicateVersion(version.to_string()).into()),
            Err(at) => {
                self.migrations.insert(at, Box::new(migration));
                Ok(())
            }
        }
    }

    /// Registered migrations in ascending version order.
    pub fn migrations(&self) -> impl Iterator<Item = &dyn Migration> {
        self.migrations.iter().map(|m| m.as_ref() as &dyn Migration)
    }

    /// Applied versions in ascending order.
    pub fn applied_versions(&self) -> Result<Vec<String>> {
        Ok(self
            .applied_rows()?
            .into_iter()
            .map(|(version, _)| version)
            .collect())
    }

    fn applied_rows(&self) -> Result<Vec<(String, Option<String>)>> {
        let outcome = self.db.query(
            &format!(
                "SELECT version, migrated_at FROM {} ORDER BY version",
                self.table
            ),
            &[],
        )?;
        Ok(outcome
            .rows
            .into_iter()
            .filter_map(|row| {
                let version = row.get("version")?.as_str()?.to_string();
                let migrated_at = row
                    .get("migrated_at")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                Some((version, migrated_at))
            })
            .collect())
    }

    /// Greatest applied version.
    pub fn current_version(&self) -> Result<Option<String>> {
        Ok(self.applied_versions()?.pop())
    }

    /// Registered migrations not yet applied, in ascending order.
    pub fn pending(&self) -> Result<Vec<&dyn Migration>> {
        let applied: BTreeSet<String> = self.applied_versions()?.into_iter().collect();
        Ok(self
            .migrations()
            .filter(|m| !applied.contains(m.version()))
            .collect())
    }

    /// Applies every pending migration in ascending order and returns the
    /// versions applied. Stops at the first failure; versions applied
    /// before it stay applied.
    pub fn migrate(&mut self) -> Result<Vec<String>> {
        let pending: Vec<usize> = {
            let applied: BTreeSet<String> = self.applied_versions()?.into_iter().collect();
            self.migrations
                .iter()
                .enumerate()
                .filter(|(_, m)| !applied.contains(m.version()))
                .map(|(i, _)| i)
                .collect()
        };

        let mut done = Vec::with_capacity(pending.len());
        for index in pending {
            let migration = self.migrations[index].as_ref();
            self.apply(migration)?;
            done.push(migration.version().to_string());
        }
        Ok(done)
    }

    /// Reverts the greatest applied version and returns it, or `None` when
    /// nothing is applied.
    ///
    /// # Errors
    ///
    /// [`SqliteError::MissingMigration`] if the version has no registered
    /// migration; the database is not touched.
    pub fn rollback(&mut self) -> Result<Option<String>> {
        let Some(version) = self.current_version()? else {
            return Ok(None);
        };
        let migration = self
            .migrations
            .iter()
            .find(|m| m.version() == version)
            .ok_or_else(|| SqliteError::MissingMigration(version.clone()))?;
        self.revert(migration.as_ref())?;
        Ok(Some(version))
    }

    /// Reverts every applied version, newest first, one transaction each.
    /// Returns the reverted versions. A failure stops the sequence; the
    /// versions not yet reverted stay applied.
    pub fn reset(&mut self) -> Result<Vec<String>> {
        let mut reverted = Vec::new();
        while let Some(version) = self.rollback()? {
            reverted.push(version);
        }
        Ok(reverted)
    }

    /// Applied state of every registered migration.
    pub fn status(&self) -> Result<Vec<MigrationStatus>> {
        let applied = self.applied_rows()?;
        Ok(self
            .migrations()
            .map(|m| {
                let row = applied.iter().find(|(v, _)| v == m.version());
                MigrationStatus {
                    version: m.version().to_string(),
                    name: m.name().to_string(),
                    applied: row.is_some(),
                    migrated_at: row.and_then(|(_, at)| at.clone()),
                }
            })
            .collect())
    }

    fn apply(&self, migration: &dyn Migration) -> Result<()> {
        let ops = SchemaOps::new(self.db);
        let version = migration.version();
        self.db
            .transaction(|| -> Result<()> {
                migration.up(&ops)?;
                self.record(version, true)
            })
            .map_err(|e| step_failed("apply", migration, e))?;
        info!(version, name = migration.name(), "applied migration");
        Ok(())
    }

    fn revert(&self, migration: &dyn Migration) -> Result<()> {
        let ops = SchemaOps::new(self.db);
        let version = migration.version();
        self.db
            .transaction(|| -> Result<()> {
                migration.down(&ops)?;
                self.record(version, false)
            })
            .map_err(|e| step_failed("revert", migration, e))?;
        info!(version, name = migration.name(), "reverted migration");
        Ok(())
    }

    fn record(&self, version: &str, applied: bool) -> Result<()> {
        let sql = if applied {
            format!("INSERT INTO {} (version) VALUES (?)", self.table)
        } else {
            format!("DELETE FROM {} WHERE version = ?", self.table)
        };
        let outcome = self.db.execute(&sql, &[Value::from(version)])?;
        if !outcome.success {
            return Err(SqliteError::MigrationError(
                outcome.error.unwrap_or_default(),
            ));
        }
        Ok(())
    }
}

fn step_failed(action: &str, migration: &dyn Migration, err: SqliteError) -> SqliteError {
    warn!(
        version = migration.version(),
        name = migration.name(),
        error = %err,
        "failed to {action} migration"
    );
    SqliteError::MigrationError(format!(
        "failed to {action} {}_{}: {err}",
        migration.version(),
        migration.name()
    ))
}
