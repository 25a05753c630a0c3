//! The narrow database collaborator consumed by the record layer.
//!
//! Implementations own connection handling and statement execution. The
//! record layer only renders SQL with `?` placeholders and hands it over
//! together with an ordered parameter list.
//!
//! Statement-level failures (constraint violations and the like) are data:
//! they come back as an [`ExecOutcome`] with `success == false`.
//! Connection-level failures (cannot prepare, I/O) are `Err`.

use tracing::warn;

use crate::error::{Error, Result};
use crate::value::{Row, Value};

/// Result of a write statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecOutcome {
    pub success: bool,
    pub affected_rows: usize,
    pub last_insert_id: i64,
    /// Engine message when `success` is false.
    pub error: Option<String>,
}

impl ExecOutcome {
    pub fn ok(affected_rows: usize, last_insert_id: i64) -> Self {
        Self {
            success: true,
            affected_rows,
            last_insert_id,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            affected_rows: 0,
            last_insert_id: 0,
            error: Some(message.into()),
        }
    }
}

/// Result of a read statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutcome {
    pub rows: Vec<Row>,
    pub count: usize,
}

impl QueryOutcome {
    pub fn new(rows: Vec<Row>) -> Self {
        let count = rows.len();
        Self { rows, count }
    }
}

/// One column as reported by schema introspection.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    pub sql_type: String,
    pub not_null: bool,
    pub default: Option<String>,
    pub primary_key: bool,
}

/// Raw SQL execution and transaction primitives.
pub trait Database {
    /// Runs a write statement.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecOutcome>;

    /// Runs a read statement.
    fn query(&self, sql: &str, params: &[Value]) -> Result<QueryOutcome>;

    /// Opens a transaction, or a nested savepoint when one is already open.
    fn begin(&self) -> Result<()>;

    /// Commits the innermost open transaction or savepoint.
    fn commit(&self) -> Result<()>;

    /// Rolls back the innermost open transaction or savepoint.
    fn rollback(&self) -> Result<()>;

    fn table_exists(&self, name: &str) -> Result<bool>;

    /// Columns of `name` in declaration order; empty if the table is missing.
    fn table_schema(&self, name: &str) -> Result<Vec<ColumnInfo>>;
}

/// Transaction helper available on every [`Database`].
pub trait DatabaseExt: Database {
    /// Runs `f` inside a transaction.
    ///
    /// Commits when `f` returns `Ok`; rolls back and returns the original
    /// error when it returns `Err`. A failed rollback is logged, the
    /// original error still wins.
    fn transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
        E: From<Error>,
    {
        self.begin()?;
        match f() {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback() {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

impl<D: Database + ?Sized> DatabaseExt for D {}
