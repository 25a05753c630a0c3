//! rusqlite implementation of the [`Database`] collaborator.
//!
//! Statement-level constraint violations come back as a failed
//! [`ExecOutcome`]; every other SQLite error is a connection-level `Err`.
//! Nested [`begin`](Database::begin) calls open savepoints, so a
//! transaction helper can run inside a migration's transaction.

use std::cell::Cell;
use std::time::Duration;

use recordkit_core::{ColumnInfo, Database, Error, ExecOutcome, QueryOutcome, Row, Value};
use recordkit_db::DatabaseConfig;
use rusqlite::{Connection, ErrorCode, params_from_iter};
use tracing::{debug, trace};

use crate::convert::{from_sql, to_sql_params};
use crate::error::Result;

/// A SQLite connection usable by the record layer.
///
/// Counts every `execute` and `query` call; tests use the counter to
/// assert how many statements an operation issued.
///
/// # Examples
///
/// ```
/// use recordkit_core::{Database, Value};
/// use recordkit_sqlite::SqliteDatabase;
///
/// let db = SqliteDatabase::open_in_memory().unwrap();
/// db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", &[]).unwrap();
/// let outcome = db.execute("INSERT INTO t (name) VALUES (?)", &[Value::from("a")]).unwrap();
/// assert_eq!(outcome.last_insert_id, 1);
///
/// let rows = db.query("SELECT name FROM t", &[]).unwrap();
/// assert_eq!(rows.rows[0]["name"], Value::from("a"));
/// assert_eq!(db.statement_count(), 3);
/// ```
pub struct SqliteDatabase {
    conn: Connection,
    depth: Cell<usize>,
    statements: Cell<usize>,
}

impl SqliteDatabase {
    /// Wraps an open connection and enables foreign-key enforcement.
    pub fn new(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn,
            depth: Cell::new(0),
            statements: Cell::new(0),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    /// Opens the configured database and applies its pragmas.
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        config.validate()?;
        let conn = if config.is_in_memory() {
            Connection::open_in_memory()?
        } else {
            Connection::open(&config.database)?
        };
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        if let Some(mode) = &config.journal_mode {
            // journal_mode reports the resulting mode as a row.
            let _: String = conn.query_row(&format!("PRAGMA journal_mode = {mode}"), [], |row| {
                row.get(0)
            })?;
        }

        let db = Self::new(conn)?;
        if !config.foreign_keys {
            db.conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
        }
        debug!(database = %config.database.display(), "opened database");
        Ok(db)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn into_connection(self) -> Connection {
        self.conn
    }

    /// Number of statements run through `execute` and `query`.
    pub fn statement_count(&self) -> usize {
        self.statements.get()
    }

    pub fn reset_statement_count(&self) {
        self.statements.set(0);
    }

    /// Open transaction depth; `0` outside any transaction.
    pub fn transaction_depth(&self) -> usize {
        self.depth.get()
    }

    fn count_statement(&self) {
        self.statements.set(self.statements.get() + 1);
    }

    fn control(&self, sql: &str) -> recordkit_core::Result<()> {
        trace!(sql, "transaction control");
        self.conn
            .execute_batch(sql)
            .map_err(|e| Error::Transaction(format!("{sql}: {e}")))
    }
}

impl Database for SqliteDatabase {
    fn execute(&self, sql: &str, params: &[Value]) -> recordkit_core::Result<ExecOutcome> {
        self.count_statement();
        debug!(sql, params = params.len(), "execute");

        let mut stmt = self.conn.prepare(sql).map_err(Error::database)?;
        let values = to_sql_params(params);
        // Row-returning statements (SELECT, INSERT ... RETURNING) run once
        // through `query` and are drained.
        let result = if stmt.column_count() > 0 {
            let readonly = stmt.readonly();
            stmt.query(params_from_iter(values.iter())).and_then(|mut rows| {
                while rows.next()?.is_some() {}
                Ok(if readonly { 0 } else { self.conn.changes() as usize })
            })
        } else {
            stmt.execute(params_from_iter(values.iter()))
        };
        let affected = match result {
            Ok(n) => n,
            Err(rusqlite::Error::SqliteFailure(err, message))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                let message = message.unwrap_or_else(|| err.to_string());
                debug!(sql, error = %message, "statement rejected");
                return Ok(ExecOutcome::failed(message));
            }
            Err(e) => return Err(Error::database(e)),
        };

        Ok(ExecOutcome::ok(affected, self.conn.last_insert_rowid()))
    }

    fn query(&self, sql: &str, params: &[Value]) -> recordkit_core::Result<QueryOutcome> {
        self.count_statement();
        debug!(sql, params = params.len(), "query");

        let mut stmt = self.conn.prepare(sql).map_err(Error::database)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let values = to_sql_params(params);
        let mut rows = stmt
            .query(params_from_iter(values.iter()))
            .map_err(Error::database)?;

        let mut result = Vec::new();
        while let Some(row) = rows.next().map_err(Error::database)? {
            let mut record = Row::new();
            for (i, name) in columns.iter().enumerate() {
                let value = row.get_ref(i).map_err(Error::database)?;
                record.insert(name.clone(), from_sql(value));
            }
            result.push(record);
        }
        Ok(QueryOutcome::new(result))
    }

    fn begin(&self) -> recordkit_core::Result<()> {
        let depth = self.depth.get();
        if depth == 0 {
            self.control("BEGIN")?;
        } else {
            self.control(&format!("SAVEPOINT sp_{depth}"))?;
        }
        self.depth.set(depth + 1);
        Ok(())
    }

    fn commit(&self) -> recordkit_core::Result<()> {
        let depth = self
            .depth
            .get()
            .checked_sub(1)
            .ok_or_else(|| Error::Transaction("commit without an open transaction".into()))?;
        self.depth.set(depth);
        if depth == 0 {
            self.control("COMMIT")
        } else {
            self.control(&format!("RELEASE SAVEPOINT sp_{depth}"))
        }
    }

    fn rollback(&self) -> recordkit_core::Result<()> {
        let depth = self
            .depth
            .get()
            .checked_sub(1)
            .ok_or_else(|| Error::Transaction("rollback without an open transaction".into()))?;
        self.depth.set(depth);
        if depth == 0 {
            self.control("ROLLBACK")
        } else {
            self.control(&format!(
                "ROLLBACK TO SAVEPOINT sp_{depth}; RELEASE SAVEPOINT sp_{depth}"
            ))
        }
    }

    fn table_exists(&self, name: &str) -> recordkit_core::Result<bool> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [name],
                |row| row.get(0),
            )
            .map_err(Error::database)?;
        Ok(count > 0)
    }

    fn table_schema(&self, name: &str) -> recordkit_core::Result<Vec<ColumnInfo>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid",
            )
            .map_err(Error::database)?;
        let columns = stmt
            .query_map([name], |row| {
                Ok(ColumnInfo {
                    name: row.get(0)?,
                    sql_type: row.get(1)?,
                    not_null: row.get::<_, i64>(2)? != 0,
                    default: row.get(3)?,
                    primary_key: row.get::<_, i64>(4)? != 0,
                })
            })
            .map_err(Error::database)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::database)?;
        Ok(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordkit_core::DatabaseExt;

    fn db_with_table() -> SqliteDatabase {
        let db = SqliteDatabase::open_in_memory().unwrap();
        db.execute(
            "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, email TEXT UNIQUE)",
            &[],
        )
        .unwrap();
        db
    }

    fn count(db: &SqliteDatabase) -> i64 {
        db.query("SELECT COUNT(*) AS n FROM users", &[]).unwrap().rows[0]["n"]
            .as_i64()
            .unwrap()
    }

    #[test]
    fn test_constraint_violation_is_a_failed_outcome() {
        let db = db_with_table();
        let insert = "INSERT INTO users (email) VALUES (?)";
        assert!(db.execute(insert, &[Value::from("a@b.io")]).unwrap().success);

        let outcome = db.execute(insert, &[Value::from("a@b.io")]).unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("UNIQUE"));
    }

    #[test]
    fn test_syntax_error_is_an_err() {
        let db = db_with_table();
        assert!(matches!(
            db.execute("INSERT INTO nope VALUES (1)", &[]),
            Err(Error::Database(_))
        ));
    }

    #[test]
    fn test_execute_tolerates_row_returning_statements() {
        let db = db_with_table();
        let outcome = db.execute("SELECT 1", &[]).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.affected_rows, 0);
    }

    #[test]
    fn test_insert_returning_runs_once() {
        let db = db_with_table();
        let outcome = db
            .execute(
                "INSERT INTO users (email) VALUES (?) RETURNING id",
                &[Value::from("a@b.io")],
            )
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.affected_rows, 1);
        assert_eq!(outcome.last_insert_id, 1);
        assert_eq!(count(&db), 1);

        let duplicate = db
            .execute(
                "INSERT INTO users (email) VALUES (?) RETURNING id",
                &[Value::from("a@b.io")],
            )
            .unwrap();
        assert!(!duplicate.success);
        assert_eq!(count(&db), 1);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = db_with_table();
        let result: recordkit_core::Result<()> = db.transaction(|| {
            db.execute("INSERT INTO users (email) VALUES ('x@y.z')", &[])?;
            Err(Error::Statement("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(count(&db), 0);
        assert_eq!(db.transaction_depth(), 0);
    }

    #[test]
    fn test_nested_transaction_uses_savepoint() {
        let db = db_with_table();
        let result: recordkit_core::Result<()> = db.transaction(|| {
            db.execute("INSERT INTO users (email) VALUES ('outer@x.io')", &[])?;
            let inner: recordkit_core::Result<()> = db.transaction(|| {
                db.execute("INSERT INTO users (email) VALUES ('inner@x.io')", &[])?;
                Err(Error::Statement("inner failure".into()))
            });
            assert!(inner.is_err());
            Ok(())
        });
        assert!(result.is_ok());
        assert_eq!(count(&db), 1);
    }

    #[test]
    fn test_commit_without_begin() {
        let db = db_with_table();
        assert!(matches!(db.commit(), Err(Error::Transaction(_))));
    }

    #[test]
    fn test_table_schema() {
        let db = db_with_table();
        let columns = db.table_schema("users").unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].name, "id");
        assert!(columns[0].primary_key);
        assert_eq!(columns[1].sql_type, "TEXT");
        assert!(db.table_schema("missing").unwrap().is_empty());
        assert!(db.table_exists("users").unwrap());
        assert!(!db.table_exists("missing").unwrap());
    }
}
