//! Persistence operations: save, validate, destroy and bulk insert.
//!
//! A [`Repo`] pairs a [`Database`] with a [`ModelRegistry`]. It is `Copy`
//! and cheap to pass around; [`Model`] is the per-type entry point that
//! produces queries and new records.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::database::Database;
use crate::error::{Error, Result};
use crate::query::{Op, QueryBuilder};
use crate::record::Record;
use crate::registry::ModelRegistry;
use crate::types::{Lifecycle, RecordType};
use crate::validate::{UNIQUE_MESSAGE, check_field};
use crate::value::{Row, Value};

/// Timestamp format written to `created_at` / `updated_at`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Error key for statement failures reported by `save` and `destroy`.
pub const BASE_ERROR_KEY: &str = "base";

/// Database handle plus registry.
#[derive(Clone, Copy)]
pub struct Repo<'r> {
    db: &'r dyn Database,
    registry: &'r ModelRegistry,
}

impl fmt::Debug for Repo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repo")
            .field("registry", &self.registry.names().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Outcome of [`Model::insert_all`].
#[derive(Debug, Clone, PartialEq)]
pub struct BulkInsert {
    pub success: bool,
    pub inserted_count: usize,
    /// Assumes the engine assigned a contiguous id range to the batch.
    pub first_id: Option<i64>,
    pub last_id: Option<i64>,
    pub error: Option<String>,
}

impl<'r> Repo<'r> {
    pub fn new(db: &'r dyn Database, registry: &'r ModelRegistry) -> Self {
        Self { db, registry }
    }

    pub fn db(&self) -> &'r dyn Database {
        self.db
    }

    pub fn registry(&self) -> &'r ModelRegistry {
        self.registry
    }

    /// Entry point for one registered record type.
    pub fn model(&self, name: &str) -> Result<Model<'r>> {
        let record_type = Arc::clone(self.registry.get(name)?);
        Ok(Model {
            repo: *self,
            record_type,
        })
    }

    /// Runs every validation rule and custom validator, replacing the
    /// record's error map. Returns `true` when no errors were recorded.
    pub fn valid(&self, record: &mut Record) -> Result<bool> {
        record.clear_errors();
        let record_type = Arc::clone(record.record_type());

        for (field, rules) in &record_type.validations {
            let value = record.get(field).clone();
            for message in check_field(&value, rules) {
                record.add_error(field, message);
            }
            if rules.unique && !value.is_null() && self.is_taken(record, field, &value)? {
                record.add_error(field, UNIQUE_MESSAGE);
            }
        }
        for validator in record_type.validators() {
            validator(record);
        }
        Ok(record.errors().is_empty())
    }

    /// Whether another stored row already holds `value` in `field`.
    fn is_taken(&self, record: &Record, field: &str, value: &Value) -> Result<bool> {
        let mut others = QueryBuilder::new(*self, Arc::clone(record.record_type()))
            .where_eq(field, value.clone());
        let stored_id = record.stored_id();
        if !record.is_new() && !stored_id.is_null() {
            others = others.where_op(&record.record_type().primary_key, Op::NotEq, stored_id.clone());
        }
        others.exists()
    }

    /// Inserts or updates the record.
    ///
    /// Hook order: `before_save`, `before_create`/`before_update`,
    /// validation, the statement, then `after_save` and
    /// `after_create`/`after_update` on the freshly persisted record.
    /// Returns `Ok(false)` when validation fails or the statement is
    /// rejected; the reason is in [`Record::errors`].
    pub fn save(&self, record: &mut Record) -> Result<bool> {
        let record_type = Arc::clone(record.record_type());
        let creating = !record.is_persisted();
        let (before, after) = if creating {
            (Lifecycle::BeforeCreate, Lifecycle::AfterCreate)
        } else {
            (Lifecycle::BeforeUpdate, Lifecycle::AfterUpdate)
        };

        run_hooks(&record_type, Lifecycle::BeforeSave, record);
        run_hooks(&record_type, before, record);

        if !self.valid(record)? {
            debug!(model = %record_type.name, errors = ?record.errors(), "validation failed");
            return Ok(false);
        }

        let written = if creating {
            self.insert(record, &record_type)?
        } else {
            self.update_row(record, &record_type)?
        };
        if !written {
            return Ok(false);
        }

        record.mark_persisted();
        run_hooks(&record_type, Lifecycle::AfterSave, record);
        run_hooks(&record_type, after, record);
        Ok(true)
    }

    fn insert(&self, record: &mut Record, record_type: &RecordType) -> Result<bool> {
        let mut stamps = Vec::new();
        if record_type.timestamps {
            let now = current_timestamp();
            for column in ["created_at", "updated_at"] {
                if record.get(column).is_null() {
                    stamps.push((column, now.clone()));
                }
            }
        }

        let mut row = record.attributes().clone();
        row.extend(stamps.iter().map(|(column, value)| (column.to_string(), value.clone())));
        let (columns, params): (Vec<&String>, Vec<Value>) = row
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(name, value)| (name, value.clone()))
            .unzip();
        let sql = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", record_type.table_name)
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                record_type.table_name,
                columns.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", "),
                vec!["?"; columns.len()].join(", ")
            )
        };

        let outcome = self.db.execute(&sql, &params)?;
        if !outcome.success {
            let message = outcome.error.unwrap_or_else(|| "insert failed".to_string());
            warn!(model = %record_type.name, error = %message, "insert rejected");
            record.add_error(BASE_ERROR_KEY, message);
            return Ok(false);
        }

        for (column, value) in stamps {
            record.write_raw(column, value);
        }
        if record.id().is_null() {
            record.write_raw(&record_type.primary_key, Value::Integer(outcome.last_insert_id));
        }
        debug!(model = %record_type.name, id = %record.id(), "inserted");
        Ok(true)
    }

    fn update_row(&self, record: &mut Record, record_type: &RecordType) -> Result<bool> {
        if record.changes().is_empty() {
            return Ok(true);
        }
        if record_type.timestamps && !record.is_changed("updated_at") {
            record.set("updated_at", current_timestamp());
        }

        let id = record.stored_id().clone();
        if id.is_null() {
            return Err(Error::MissingPrimaryKey(record_type.name.clone()));
        }

        let assignments: Vec<String> = record
            .changes()
            .keys()
            .map(|column| format!("{column} = ?"))
            .collect();
        let mut params: Vec<Value> = record
            .changes()
            .values()
            .map(|change| change.new.clone())
            .collect();
        params.push(id);

        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            record_type.table_name,
            assignments.join(", "),
            record_type.primary_key
        );
        let outcome = self.db.execute(&sql, &params)?;
        if !outcome.success {
            let message = outcome.error.unwrap_or_else(|| "update failed".to_string());
            warn!(model = %record_type.name, error = %message, "update rejected");
            record.add_error(BASE_ERROR_KEY, message);
            return Ok(false);
        }
        debug!(model = %record_type.name, id = %record.id(), "updated");
        Ok(true)
    }

    /// Deletes the stored row. Records that are not persisted are left
    /// untouched and yield `Ok(false)`.
    pub fn destroy(&self, record: &mut Record) -> Result<bool> {
        if !record.is_persisted() {
            return Ok(false);
        }
        let record_type = Arc::clone(record.record_type());
        run_hooks(&record_type, Lifecycle::BeforeDestroy, record);

        let id = record.stored_id().clone();
        if id.is_null() {
            return Err(Error::MissingPrimaryKey(record_type.name.clone()));
        }
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            record_type.table_name, record_type.primary_key
        );
        let outcome = self.db.execute(&sql, &[id])?;
        if !outcome.success {
            let message = outcome.error.unwrap_or_else(|| "delete failed".to_string());
            warn!(model = %record_type.name, error = %message, "delete rejected");
            record.add_error(BASE_ERROR_KEY, message);
            return Ok(false);
        }

        record.mark_detached();
        run_hooks(&record_type, Lifecycle::AfterDestroy, record);
        Ok(true)
    }

    /// Re-reads the stored row, discarding unsaved changes and cached
    /// associations. Returns `Ok(false)` if the row no longer exists.
    pub fn reload(&self, record: &mut Record) -> Result<bool> {
        let record_type = Arc::clone(record.record_type());
        let id = record.stored_id().clone();
        if id.is_null() {
            return Err(Error::MissingPrimaryKey(record_type.name.clone()));
        }
        let sql = format!(
            "SELECT * FROM {} WHERE {} = ? LIMIT 1",
            record_type.table_name, record_type.primary_key
        );
        let outcome = self.db.query(&sql, &[id])?;
        let Some(row) = outcome.rows.into_iter().next() else {
            return Ok(false);
        };
        record.replace_attributes(row);
        record.mark_persisted();
        record.clear_association_cache();
        record.clear_errors();
        Ok(true)
    }

    /// Assigns `attributes` and saves.
    pub fn update(&self, record: &mut Record, attributes: Row) -> Result<bool> {
        record.assign(attributes);
        self.save(record)
    }
}

fn run_hooks(record_type: &RecordType, point: Lifecycle, record: &mut Record) {
    for hook in record_type.hooks(point) {
        hook(record);
    }
}

fn current_timestamp() -> Value {
    Value::Text(Utc::now().format(TIMESTAMP_FORMAT).to_string())
}

/// Per-type entry point: queries, finders and creation.
#[derive(Debug, Clone)]
pub struct Model<'r> {
    repo: Repo<'r>,
    record_type: Arc<RecordType>,
}

impl<'r> Model<'r> {
    pub fn repo(&self) -> Repo<'r> {
        self.repo
    }

    pub fn record_type(&self) -> &Arc<RecordType> {
        &self.record_type
    }

    pub fn name(&self) -> &str {
        &self.record_type.name
    }

    /// Unsaved record of this type.
    pub fn new_record(&self, attributes: Row) -> Record {
        Record::new(&self.record_type, attributes)
    }

    pub fn query(&self) -> QueryBuilder<'r> {
        QueryBuilder::new(self.repo, Arc::clone(&self.record_type))
    }

    pub fn all(&self) -> Result<Vec<Record>> {
        self.query().all()
    }

    pub fn first(&self) -> Result<Option<Record>> {
        self.query().first()
    }

    pub fn last(&self) -> Result<Option<Record>> {
        self.query().last()
    }

    pub fn count(&self) -> Result<i64> {
        self.query().count()
    }

    pub fn where_eq(&self, column: &str, value: impl Into<Value>) -> QueryBuilder<'r> {
        self.query().where_eq(column, value)
    }

    pub fn where_all(&self, conditions: Row) -> QueryBuilder<'r> {
        self.query().where_all(conditions)
    }

    pub fn includes<S: AsRef<str>>(&self, associations: impl IntoIterator<Item = S>) -> QueryBuilder<'r> {
        self.query().includes(associations)
    }

    /// Record with the given primary key.
    pub fn find(&self, id: impl Into<Value>) -> Result<Option<Record>> {
        self.query()
            .where_eq(&self.record_type.primary_key, id)
            .first()
    }

    /// First record matching every condition.
    pub fn find_by(&self, conditions: Row) -> Result<Option<Record>> {
        self.query().where_all(conditions).first()
    }

    /// Builds and saves a record. Check [`Record::is_persisted`] or
    /// [`Record::errors`] to see whether the save went through.
    pub fn create(&self, attributes: Row) -> Result<Record> {
        let mut record = self.new_record(attributes);
        self.repo.save(&mut record)?;
        Ok(record)
    }

    /// One multi-row INSERT. Skips validations and lifecycle hooks.
    ///
    /// Columns are the union of the rows' keys; a row without a column
    /// binds `NULL` for it.
    pub fn insert_all(&self, rows: &[Row]) -> Result<BulkInsert> {
        let rows = self.stamp_rows(rows);
        self.insert_rows(&rows)
    }

    /// [`insert_all`](Self::insert_all), then hydrates persisted records.
    ///
    /// Rows without a primary key receive `first_id + index`, which
    /// relies on the engine assigning the batch a contiguous range.
    pub fn create_all(&self, rows: &[Row]) -> Result<Vec<Record>> {
        let rows = self.stamp_rows(rows);
        let outcome = self.insert_rows(&rows)?;
        if !outcome.success {
            return Err(Error::Statement(
                outcome.error.unwrap_or_else(|| "bulk insert failed".to_string()),
            ));
        }

        let pk = &self.record_type.primary_key;
        let first_id = outcome.first_id.unwrap_or_default();
        Ok(rows
            .into_iter()
            .enumerate()
            .map(|(index, mut row)| {
                if row.get(pk).is_none_or(Value::is_null) {
                    row.insert(pk.clone(), Value::Integer(first_id + index as i64));
                }
                Record::hydrate(&self.record_type, row)
            })
            .collect())
    }

    fn stamp_rows(&self, rows: &[Row]) -> Vec<Row> {
        if !self.record_type.timestamps {
            return rows.to_vec();
        }
        let now = current_timestamp();
        rows.iter()
            .cloned()
            .map(|mut row| {
                for column in ["created_at", "updated_at"] {
                    if row.get(column).is_none_or(Value::is_null) {
                        row.insert(column.to_string(), now.clone());
                    }
                }
                row
            })
            .collect()
    }

    fn insert_rows(&self, rows: &[Row]) -> Result<BulkInsert> {
        if rows.is_empty() {
            return Ok(BulkInsert {
                success: true,
                inserted_count: 0,
                first_id: None,
                last_id: None,
                error: None,
            });
        }

        let columns: BTreeSet<&String> = rows.iter().flat_map(|row| row.keys()).collect();
        if columns.is_empty() {
            return Err(Error::Statement(format!(
                "bulk insert into {} needs at least one column",
                self.record_type.table_name
            )));
        }

        let tuple = format!("({})", vec!["?"; columns.len()].join(", "));
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.record_type.table_name,
            columns.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", "),
            vec![tuple.as_str(); rows.len()].join(", ")
        );
        let params: Vec<Value> = rows
            .iter()
            .flat_map(|row| {
                columns
                    .iter()
                    .map(move |column| row.get(*column).cloned().unwrap_or_default())
            })
            .collect();

        let outcome = self.repo.db().execute(&sql, &params)?;
        if !outcome.success {
            warn!(model = %self.record_type.name, error = ?outcome.error, "bulk insert rejected");
            return Ok(BulkInsert {
                success: false,
                inserted_count: 0,
                first_id: None,
                last_id: None,
                error: outcome.error,
            });
        }

        let inserted = outcome.affected_rows;
        let last_id = outcome.last_insert_id;
        debug!(model = %self.record_type.name, inserted, last_id, "bulk insert");
        Ok(BulkInsert {
            success: true,
            inserted_count: inserted,
            first_id: Some(last_id - inserted as i64 + 1),
            last_id: Some(last_id),
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::ExecOutcome;
    use crate::row;
    use crate::testing::RecordingDatabase;
    use crate::validate::ValidationRules;

    fn registry() -> ModelRegistry {
        let mut registry = ModelRegistry::new();
        registry
            .define(
                RecordType::new("User")
                    .table("users")
                    .validates("email", ValidationRules::new().required().email()),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_create_inserts_non_null_attributes_and_assigns_id() {
        let db = RecordingDatabase::new();
        db.push_exec(ExecOutcome::ok(1, 42));
        let registry = registry();
        let users = Repo::new(&db, &registry).model("User").unwrap();

        let user = users
            .create(row! { "email" => "a@b.io", "name" => "Alice", "bio" => Value::Null })
            .unwrap();

        assert!(user.is_persisted());
        assert_eq!(user.id(), &Value::Integer(42));
        let (sql, params) = db.last_statement().unwrap();
        assert_eq!(sql, "INSERT INTO users (email, name) VALUES (?, ?)");
        assert_eq!(params, vec![Value::from("a@b.io"), Value::from("Alice")]);
    }

    #[test]
    fn test_invalid_record_issues_no_statement() {
        let db = RecordingDatabase::new();
        let registry = registry();
        let users = Repo::new(&db, &registry).model("User").unwrap();

        let user = users.create(row! { "email" => "not-an-email" }).unwrap();
        assert!(user.is_new());
        assert_eq!(user.errors_on("email"), ["is not a valid email"]);
        assert!(db.statements().is_empty());
    }

    #[test]
    fn test_update_writes_only_changed_columns() {
        let db = RecordingDatabase::new();
        let registry = registry();
        let repo = Repo::new(&db, &registry);
        let users = repo.model("User").unwrap();

        let mut user = Record::hydrate(
            users.record_type(),
            row! { "id" => 1, "email" => "a@b.io", "age" => 28 },
        );
        user.set("age", 29);
        assert!(repo.save(&mut user).unwrap());

        let (sql, params) = db.last_statement().unwrap();
        assert_eq!(sql, "UPDATE users SET age = ? WHERE id = ?");
        assert_eq!(params, vec![Value::from(29), Value::from(1)]);
        assert!(user.changes().is_empty());
    }

    #[test]
    fn test_save_without_changes_is_a_no_op() {
        let db = RecordingDatabase::new();
        let registry = registry();
        let repo = Repo::new(&db, &registry);
        let users = repo.model("User").unwrap();

        let mut user = Record::hydrate(users.record_type(), row! { "id" => 1, "email" => "a@b.io" });
        assert!(repo.save(&mut user).unwrap());
        assert!(db.statements().is_empty());
    }

    #[test]
    fn test_primary_key_change_updates_stored_row() {
        let db = RecordingDatabase::new();
        let registry = registry();
        let repo = Repo::new(&db, &registry);
        let users = repo.model("User").unwrap();

        let mut user = Record::hydrate(users.record_type(), row! { "id" => 1, "email" => "a@b.io" });
        user.set("id", 5);
        repo.save(&mut user).unwrap();
        let (_, params) = db.last_statement().unwrap();
        assert_eq!(params, vec![Value::from(5), Value::from(1)]);
    }

    #[test]
    fn test_rejected_statement_records_base_error() {
        let db = RecordingDatabase::new();
        db.push_exec(ExecOutcome::failed("UNIQUE constraint failed: users.email"));
        let registry = registry();
        let users = Repo::new(&db, &registry).model("User").unwrap();

        let user = users.create(row! { "email" => "a@b.io" }).unwrap();
        assert!(!user.is_persisted());
        assert_eq!(user.errors_on(BASE_ERROR_KEY).len(), 1);
    }

    #[test]
    fn test_hook_order() {
        use std::sync::Mutex;

        let calls = Arc::new(Mutex::new(Vec::new()));
        let track = |label: &'static str| {
            let calls = Arc::clone(&calls);
            move |_: &mut Record| calls.lock().unwrap().push(label)
        };
        let mut registry = ModelRegistry::new();
        registry
            .define(
                RecordType::new("User")
                    .on(Lifecycle::AfterCreate, track("after_create"))
                    .on(Lifecycle::BeforeSave, track("before_save"))
                    .on(Lifecycle::AfterSave, track("after_save"))
                    .on(Lifecycle::BeforeCreate, track("before_create"))
                    .validate_with(track("validate")),
            )
            .unwrap();
        let db = RecordingDatabase::new();
        let users = Repo::new(&db, &registry).model("User").unwrap();

        users.create(row! { "name" => "Alice" }).unwrap();
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["before_save", "before_create", "validate", "after_save", "after_create"]
        );
    }

    #[test]
    fn test_unique_ignores_the_record_itself() {
        let mut registry = ModelRegistry::new();
        registry
            .define(RecordType::new("User").validates("email", ValidationRules::new().unique()))
            .unwrap();
        let db = RecordingDatabase::new();
        let repo = Repo::new(&db, &registry);
        let users = repo.model("User").unwrap();

        let mut same = Record::hydrate(users.record_type(), row! { "id" => 1, "email" => "a@b.io" });
        assert!(repo.valid(&mut same).unwrap());
        assert_eq!(
            db.last_statement().unwrap(),
            (
                "SELECT 1 FROM users WHERE email = ? AND id != ? LIMIT 1".to_string(),
                vec![Value::from("a@b.io"), Value::from(1)]
            )
        );

        db.push_rows(vec![row! { "1" => 1 }]);
        let mut other = users.new_record(row! { "email" => "a@b.io" });
        assert!(!repo.valid(&mut other).unwrap());
        assert_eq!(other.errors_on("email"), [UNIQUE_MESSAGE]);
        assert_eq!(
            db.last_statement().unwrap().0,
            "SELECT 1 FROM users WHERE email = ? LIMIT 1"
        );
    }

    #[test]
    fn test_unique_sees_any_other_holder() {
        let mut registry = ModelRegistry::new();
        registry
            .define(RecordType::new("User").validates("email", ValidationRules::new().unique()))
            .unwrap();
        let db = RecordingDatabase::new();
        let repo = Repo::new(&db, &registry);
        let users = repo.model("User").unwrap();

        // The first row holding the value is the record itself; a later
        // duplicate still makes the value taken.
        db.push_rows(vec![row! { "1" => 1 }]);
        let mut user = Record::hydrate(users.record_type(), row! { "id" => 1, "email" => "a@b.io" });
        assert!(!repo.valid(&mut user).unwrap());
        assert_eq!(user.errors_on("email"), [UNIQUE_MESSAGE]);
    }

    #[test]
    fn test_destroy_detaches() {
        let db = RecordingDatabase::new();
        let registry = registry();
        let repo = Repo::new(&db, &registry);
        let users = repo.model("User").unwrap();

        let mut user = Record::hydrate(users.record_type(), row! { "id" => 3, "email" => "a@b.io" });
        assert!(repo.destroy(&mut user).unwrap());
        assert_eq!(user.state(), crate::RecordState::Detached);
        assert_eq!(
            db.last_statement().unwrap(),
            ("DELETE FROM users WHERE id = ?".to_string(), vec![Value::from(3)])
        );
        assert!(!repo.destroy(&mut user).unwrap());
    }

    #[test]
    fn test_insert_all_unions_columns_and_derives_ids() {
        let db = RecordingDatabase::new();
        db.push_exec(ExecOutcome::ok(3, 12));
        let registry = registry();
        let users = Repo::new(&db, &registry).model("User").unwrap();

        let outcome = users
            .insert_all(&[
                row! { "name" => "a" },
                row! { "name" => "b", "age" => 2 },
                row! { "name" => "c" },
            ])
            .unwrap();

        assert_eq!(outcome.inserted_count, 3);
        assert_eq!(outcome.first_id, Some(10));
        assert_eq!(outcome.last_id, Some(12));
        let (sql, params) = db.last_statement().unwrap();
        assert_eq!(sql, "INSERT INTO users (age, name) VALUES (?, ?), (?, ?), (?, ?)");
        assert_eq!(params[0], Value::Null);
        assert_eq!(params[2], Value::from(2));
    }

    #[test]
    fn test_insert_all_empty_batch() {
        let db = RecordingDatabase::new();
        let registry = registry();
        let users = Repo::new(&db, &registry).model("User").unwrap();

        let outcome = users.insert_all(&[]).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.inserted_count, 0);
        assert_eq!(outcome.first_id, None);
        assert!(db.statements().is_empty());
    }

    #[test]
    fn test_timestamps_filled_on_create() {
        let mut registry = ModelRegistry::new();
        registry.define(RecordType::new("Note").timestamps()).unwrap();
        let db = RecordingDatabase::new();
        let notes = Repo::new(&db, &registry).model("Note").unwrap();

        let note = notes.create(row! { "body" => "hi" }).unwrap();
        let created = note.get("created_at").as_str().unwrap();
        assert_eq!(created.len(), "2024-01-01 00:00:00".len());
        assert_eq!(note.get("created_at"), note.get("updated_at"));
    }

    #[test]
    fn test_rejected_insert_leaves_timestamps_unset() {
        let mut registry = ModelRegistry::new();
        registry.define(RecordType::new("Note").timestamps()).unwrap();
        let db = RecordingDatabase::new();
        db.push_exec(ExecOutcome::failed("NOT NULL constraint failed: notes.body"));
        let notes = Repo::new(&db, &registry).model("Note").unwrap();

        let mut note = notes.create(Row::new()).unwrap();
        assert!(note.is_new());
        assert!(note.get("created_at").is_null());
        assert!(note.get("updated_at").is_null());
        let (sql, params) = db.last_statement().unwrap();
        assert_eq!(sql, "INSERT INTO notes (created_at, updated_at) VALUES (?, ?)");
        assert_eq!(params.len(), 2);

        note.set("body", "retry");
        assert!(Repo::new(&db, &registry).save(&mut note).unwrap());
        assert!(!note.get("created_at").is_null());
    }
}
