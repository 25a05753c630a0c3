//! Immutable, chainable SELECT/UPDATE/DELETE builder.
//!
//! Every clause method borrows the builder and returns a new one, so a
//! partial query can be reused across branches. SQL is rendered only by
//! the terminal methods (`all`, `first`, `count`, `update_all`, ...).
//!
//! Parameters are positional: their order always matches the `?`
//! placeholders left to right, WHERE fragments first, then HAVING.
//!
//! # Examples
//!
//! ```ignore
//! let adults = users.query().where_op("age", Op::Gte, 18);
//! let newest = adults.order_by("created_at", "desc").limit(10);
//! let count = adults.count()?; // `newest` does not affect `adults`
//! ```

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::record::Record;
use crate::repo::Repo;
use crate::types::RecordType;
use crate::value::{Row, Value};

/// Comparison operators for [`QueryBuilder::where_op`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    NotLike,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Eq => write!(f, "="),
            Op::NotEq => write!(f, "!="),
            Op::Gt => write!(f, ">"),
            Op::Gte => write!(f, ">="),
            Op::Lt => write!(f, "<"),
            Op::Lte => write!(f, "<="),
            Op::Like => write!(f, "LIKE"),
            Op::NotLike => write!(f, "NOT LIKE"),
        }
    }
}

/// Query under construction for one record type.
#[derive(Clone, Debug)]
pub struct QueryBuilder<'r> {
    repo: Repo<'r>,
    record_type: Arc<RecordType>,
    select: String,
    distinct: bool,
    wheres: Vec<String>,
    where_params: Vec<Value>,
    joins: Vec<String>,
    group_by: Vec<String>,
    having: Vec<String>,
    having_params: Vec<Value>,
    order_by: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    includes: Vec<String>,
}

impl<'r> QueryBuilder<'r> {
    pub fn new(repo: Repo<'r>, record_type: Arc<RecordType>) -> Self {
        Self {
            repo,
            record_type,
            select: "*".to_string(),
            distinct: false,
            wheres: Vec::new(),
            where_params: Vec::new(),
            joins: Vec::new(),
            group_by: Vec::new(),
            having: Vec::new(),
            having_params: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            includes: Vec::new(),
        }
    }

    pub fn record_type(&self) -> &Arc<RecordType> {
        &self.record_type
    }

    fn with(&self, f: impl FnOnce(&mut Self)) -> Self {
        let mut next = self.clone();
        f(&mut next);
        next
    }

    // ---- WHERE ----------------------------------------------------------

    /// `column = ?`
    pub fn where_eq(&self, column: &str, value: impl Into<Value>) -> Self {
        self.where_op(column, Op::Eq, value)
    }

    /// `column <op> ?`
    pub fn where_op(&self, column: &str, op: Op, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.with(|q| {
            q.wheres.push(format!("{column} {op} ?"));
            q.where_params.push(value);
        })
    }

    /// Mapping form: one `column = ?` per pair, ANDed. `Null` values
    /// render as `column IS NULL`.
    pub fn where_all<K, V>(&self, conditions: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        let conditions: Vec<(String, Value)> = conditions
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.into()))
            .collect();
        self.with(|q| {
            for (column, value) in conditions {
                if value.is_null() {
                    q.wheres.push(format!("{column} IS NULL"));
                } else {
                    q.wheres.push(format!("{column} = ?"));
                    q.where_params.push(value);
                }
            }
        })
    }

    /// Raw fragment with its own ordered parameters, appended verbatim.
    pub fn where_raw(&self, fragment: &str, params: impl IntoIterator<Item = Value>) -> Self {
        self.with(|q| {
            q.wheres.push(fragment.to_string());
            q.where_params.extend(params);
        })
    }

    /// `column IN (?, ...)`; an empty list renders the always-false `1=0`.
    pub fn where_in<V: Into<Value>>(&self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.with(|q| {
            if values.is_empty() {
                q.wheres.push("1=0".to_string());
            } else {
                q.wheres
                    .push(format!("{column} IN ({})", placeholders(values.len())));
                q.where_params.extend(values);
            }
        })
    }

    /// `column NOT IN (?, ...)`; an empty list adds nothing.
    pub fn where_not_in<V: Into<Value>>(
        &self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.with(|q| {
            if !values.is_empty() {
                q.wheres
                    .push(format!("{column} NOT IN ({})", placeholders(values.len())));
                q.where_params.extend(values);
            }
        })
    }

    pub fn where_between(
        &self,
        column: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        let (low, high) = (low.into(), high.into());
        self.with(|q| {
            q.wheres.push(format!("{column} BETWEEN ? AND ?"));
            q.where_params.push(low);
            q.where_params.push(high);
        })
    }

    pub fn where_like(&self, column: &str, pattern: &str) -> Self {
        self.where_op(column, Op::Like, pattern)
    }

    pub fn where_null(&self, column: &str) -> Self {
        self.with(|q| q.wheres.push(format!("{column} IS NULL")))
    }

    pub fn where_not_null(&self, column: &str) -> Self {
        self.with(|q| q.wheres.push(format!("{column} IS NOT NULL")))
    }

    // ---- projection, joins, grouping -----------------------------------

    pub fn select(&self, projection: &str) -> Self {
        self.with(|q| q.select = projection.to_string())
    }

    pub fn distinct(&self) -> Self {
        self.with(|q| q.distinct = true)
    }

    /// Raw join clause, e.g. `"INNER JOIN posts ON posts.user_id = users.id"`.
    pub fn joins(&self, clause: &str) -> Self {
        self.with(|q| q.joins.push(clause.to_string()))
    }

    pub fn inner_join(&self, table: &str, on: &str) -> Self {
        self.joins(&format!("INNER JOIN {table} ON {on}"))
    }

    pub fn left_join(&self, table: &str, on: &str) -> Self {
        self.joins(&format!("LEFT JOIN {table} ON {on}"))
    }

    pub fn group(&self, column: &str) -> Self {
        self.with(|q| q.group_by.push(column.to_string()))
    }

    pub fn having(&self, fragment: &str, params: impl IntoIterator<Item = Value>) -> Self {
        self.with(|q| {
            q.having.push(fragment.to_string());
            q.having_params.extend(params);
        })
    }

    // ---- ordering and paging -------------------------------------------

    /// Orders ascending, or verbatim when `column` already carries a
    /// direction (`"age DESC"`).
    pub fn order(&self, column: &str) -> Self {
        self.with(|q| q.order_by.push(order_entry(column, None)))
    }

    /// Orders by `column` in `direction` (case-insensitive).
    pub fn order_by(&self, column: &str, direction: &str) -> Self {
        self.with(|q| q.order_by.push(order_entry(column, Some(direction))))
    }

    pub fn limit(&self, n: u64) -> Self {
        self.with(|q| q.limit = Some(n))
    }

    pub fn offset(&self, n: u64) -> Self {
        self.with(|q| q.offset = Some(n))
    }

    /// 1-based page of `per_page` rows.
    pub fn paginate(&self, page: u64, per_page: u64) -> Self {
        let page = page.max(1);
        self.limit(per_page).offset((page - 1) * per_page)
    }

    /// Associations to batch-load after `all()`.
    pub fn includes<S: AsRef<str>>(&self, associations: impl IntoIterator<Item = S>) -> Self {
        let names: Vec<String> = associations
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect();
        self.with(|q| q.includes.extend(names))
    }

    // ---- rendering -----------------------------------------------------

    /// Renders the SELECT statement and its parameters.
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(&self.select);
        sql.push_str(" FROM ");
        sql.push_str(&self.record_type.table_name);

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        self.push_where(&mut sql);
        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }
        if !self.having.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(&self.having.join(" AND "));
        }
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        let mut params = self.where_params.clone();
        params.extend(self.having_params.iter().cloned());
        (sql, params)
    }

    fn push_where(&self, sql: &mut String) {
        if !self.wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.wheres.join(" AND "));
        }
    }

    fn without_paging(&self) -> Self {
        self.with(|q| {
            q.order_by.clear();
            q.limit = None;
            q.offset = None;
        })
    }

    // ---- execution -----------------------------------------------------

    /// Runs the query and hydrates persisted records, then batch-loads
    /// any `includes`.
    pub fn all(&self) -> Result<Vec<Record>> {
        let (sql, params) = self.to_sql();
        let outcome = self.repo.db().query(&sql, &params)?;
        let mut records: Vec<Record> = outcome
            .rows
            .into_iter()
            .map(|row| Record::hydrate(&self.record_type, row))
            .collect();

        if !self.includes.is_empty() {
            self.repo.eager_load(&mut records, self.includes.as_slice())?;
        }
        Ok(records)
    }

    pub fn first(&self) -> Result<Option<Record>> {
        Ok(self.limit(1).all()?.into_iter().next())
    }

    /// Last record by primary key, or by the reverse of an existing order.
    pub fn last(&self) -> Result<Option<Record>> {
        let reversed = if self.order_by.is_empty() {
            self.order_by(&self.record_type.primary_key, "DESC")
        } else {
            self.with(|q| {
                q.order_by = q.order_by.iter().map(|entry| reverse_order(entry)).collect();
            })
        };
        reversed.first()
    }

    /// Number of matching rows. Ordering and paging are ignored; grouped
    /// and DISTINCT queries count result rows.
    pub fn count(&self) -> Result<i64> {
        let base = self.without_paging();
        let (sql, params) = if base.group_by.is_empty() && !base.distinct {
            base.select("COUNT(*) as count").to_sql()
        } else {
            let (inner, params) = base.to_sql();
            (format!("SELECT COUNT(*) as count FROM ({inner}) AS counted"), params)
        };

        let outcome = self.repo.db().query(&sql, &params)?;
        Ok(outcome
            .rows
            .first()
            .and_then(|row| row.get("count"))
            .and_then(Value::as_i64)
            .unwrap_or(0))
    }

    pub fn exists(&self) -> Result<bool> {
        let (sql, params) = self.select("1").limit(1).to_sql();
        Ok(self.repo.db().query(&sql, &params)?.count > 0)
    }

    /// Values of a single column.
    pub fn pluck(&self, column: &str) -> Result<Vec<Value>> {
        let (sql, params) = self.select(column).to_sql();
        let outcome = self.repo.db().query(&sql, &params)?;
        Ok(outcome
            .rows
            .into_iter()
            .map(|row| row.into_values().next().unwrap_or_default())
            .collect())
    }

    /// Sets `attributes` on every matching row and returns the affected
    /// row count. Joins, ordering and paging are ignored.
    pub fn update_all(&self, attributes: Row) -> Result<usize> {
        if attributes.is_empty() {
            return Ok(0);
        }
        let assignments: Vec<String> = attributes.keys().map(|c| format!("{c} = ?")).collect();
        let mut sql = format!(
            "UPDATE {} SET {}",
            self.record_type.table_name,
            assignments.join(", ")
        );
        self.push_where(&mut sql);

        let mut params: Vec<Value> = attributes.into_values().collect();
        params.extend(self.where_params.iter().cloned());
        self.execute_bulk(&sql, &params)
    }

    /// Deletes every matching row and returns the affected row count.
    /// Joins, ordering and paging are ignored.
    pub fn destroy_all(&self) -> Result<usize> {
        let mut sql = format!("DELETE FROM {}", self.record_type.table_name);
        self.push_where(&mut sql);
        self.execute_bulk(&sql, &self.where_params)
    }

    fn execute_bulk(&self, sql: &str, params: &[Value]) -> Result<usize> {
        let outcome = self.repo.db().execute(sql, params)?;
        if !outcome.success {
            return Err(Error::Statement(
                outcome.error.unwrap_or_else(|| sql.to_string()),
            ));
        }
        debug!(table = %self.record_type.table_name, rows = outcome.affected_rows, "bulk statement");
        Ok(outcome.affected_rows)
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn order_entry(column: &str, direction: Option<&str>) -> String {
    if column.contains(char::is_whitespace) {
        return column.to_string();
    }
    let direction = direction.unwrap_or("ASC").to_uppercase();
    format!("{column} {direction}")
}

fn reverse_order(entry: &str) -> String {
    match entry.rsplit_once(char::is_whitespace) {
        Some((column, dir)) if dir.eq_ignore_ascii_case("ASC") => format!("{column} DESC"),
        Some((column, dir)) if dir.eq_ignore_ascii_case("DESC") => format!("{column} ASC"),
        _ => format!("{entry} DESC"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ModelRegistry;
    use crate::row;
    use crate::testing::RecordingDatabase;

    fn users() -> Arc<RecordType> {
        Arc::new(RecordType::new("User").table("users"))
    }

    #[test]
    fn test_builder_methods_do_not_mutate_receiver() {
        let db = RecordingDatabase::new();
        let registry = ModelRegistry::new();
        let base = QueryBuilder::new(Repo::new(&db, &registry), users()).where_eq("active", 1);

        let young = base.where_op("age", Op::Lt, 30);
        let old = base.where_op("age", Op::Gte, 30).order("age");

        assert_eq!(base.to_sql().0, "SELECT * FROM users WHERE active = ?");
        assert_eq!(young.to_sql().0, "SELECT * FROM users WHERE active = ? AND age < ?");
        assert_eq!(
            old.to_sql().0,
            "SELECT * FROM users WHERE active = ? AND age >= ? ORDER BY age ASC"
        );
    }

    #[test]
    fn test_full_render_order_and_params() {
        let db = RecordingDatabase::new();
        let registry = ModelRegistry::new();
        let q = QueryBuilder::new(Repo::new(&db, &registry), users())
            .select("users.country, COUNT(*) AS n")
            .inner_join("posts", "posts.user_id = users.id")
            .where_raw("users.age > ? AND users.age < ?", [Value::from(18), Value::from(65)])
            .where_in("users.role", ["admin", "editor"])
            .group("users.country")
            .having("COUNT(*) > ?", [Value::from(2)])
            .order_by("n", "desc")
            .limit(5)
            .offset(10);

        let (sql, params) = q.to_sql();
        assert_eq!(
            sql,
            "SELECT users.country, COUNT(*) AS n FROM users \
             INNER JOIN posts ON posts.user_id = users.id \
             WHERE users.age > ? AND users.age < ? AND users.role IN (?, ?) \
             GROUP BY users.country HAVING COUNT(*) > ? ORDER BY n DESC LIMIT 5 OFFSET 10"
        );
        assert_eq!(
            params,
            vec![
                Value::from(18),
                Value::from(65),
                Value::from("admin"),
                Value::from("editor"),
                Value::from(2)
            ]
        );
    }

    #[test]
    fn test_empty_in_lists() {
        let db = RecordingDatabase::new();
        let registry = ModelRegistry::new();
        let q = QueryBuilder::new(Repo::new(&db, &registry), users());

        let (sql, params) = q.where_in("id", Vec::<i64>::new()).to_sql();
        assert_eq!(sql, "SELECT * FROM users WHERE 1=0");
        assert!(params.is_empty());

        let (sql, _) = q.where_not_in("id", Vec::<i64>::new()).to_sql();
        assert_eq!(sql, "SELECT * FROM users");
    }

    #[test]
    fn test_mapping_where_with_null() {
        let db = RecordingDatabase::new();
        let registry = ModelRegistry::new();
        let q = QueryBuilder::new(Repo::new(&db, &registry), users())
            .where_all(row! { "deleted_at" => Value::Null, "name" => "Alice" });
        let (sql, params) = q.to_sql();
        assert_eq!(sql, "SELECT * FROM users WHERE deleted_at IS NULL AND name = ?");
        assert_eq!(params, vec![Value::from("Alice")]);
    }

    #[test]
    fn test_order_verbatim_when_direction_embedded() {
        assert_eq!(order_entry("age desc", None), "age desc");
        assert_eq!(order_entry("age", Some("desc")), "age DESC");
        assert_eq!(order_entry("age", None), "age ASC");
    }

    #[test]
    fn test_reverse_order() {
        assert_eq!(reverse_order("age ASC"), "age DESC");
        assert_eq!(reverse_order("age desc"), "age ASC");
        assert_eq!(reverse_order("LENGTH(name)"), "LENGTH(name) DESC");
    }

    #[test]
    fn test_count_strips_order_and_paging() {
        let db = RecordingDatabase::new();
        db.push_rows(vec![row! { "count" => 3 }]);
        let registry = ModelRegistry::new();
        let q = QueryBuilder::new(Repo::new(&db, &registry), users())
            .where_eq("active", 1)
            .order("name")
            .limit(2)
            .offset(4);

        assert_eq!(q.count().unwrap(), 3);
        let (sql, params) = db.last_statement().unwrap();
        assert_eq!(sql, "SELECT COUNT(*) as count FROM users WHERE active = ?");
        assert_eq!(params, vec![Value::from(1)]);
    }

    #[test]
    fn test_grouped_count_wraps_subquery() {
        let db = RecordingDatabase::new();
        db.push_rows(vec![row! { "count" => 2 }]);
        let registry = ModelRegistry::new();
        let q = QueryBuilder::new(Repo::new(&db, &registry), users())
            .select("country")
            .group("country");

        assert_eq!(q.count().unwrap(), 2);
        let (sql, _) = db.last_statement().unwrap();
        assert_eq!(
            sql,
            "SELECT COUNT(*) as count FROM (SELECT country FROM users GROUP BY country) AS counted"
        );
    }

    #[test]
    fn test_last_orders_by_primary_key_desc() {
        let db = RecordingDatabase::new();
        let registry = ModelRegistry::new();
        let q = QueryBuilder::new(Repo::new(&db, &registry), users());

        q.last().unwrap();
        assert_eq!(
            db.last_statement().unwrap().0,
            "SELECT * FROM users ORDER BY id DESC LIMIT 1"
        );

        q.order("name").last().unwrap();
        assert_eq!(
            db.last_statement().unwrap().0,
            "SELECT * FROM users ORDER BY name DESC LIMIT 1"
        );
    }

    #[test]
    fn test_update_all_binds_set_params_before_where_params() {
        let db = RecordingDatabase::new();
        let registry = ModelRegistry::new();
        let q = QueryBuilder::new(Repo::new(&db, &registry), users())
            .where_eq("role", "guest")
            .order("id")
            .limit(3);

        q.update_all(row! { "active" => 0, "role" => "member" }).unwrap();
        let (sql, params) = db.last_statement().unwrap();
        assert_eq!(sql, "UPDATE users SET active = ?, role = ? WHERE role = ?");
        assert_eq!(
            params,
            vec![Value::from(0), Value::from("member"), Value::from("guest")]
        );
    }

    #[test]
    fn test_destroy_all_uses_only_where_state() {
        let db = RecordingDatabase::new();
        let registry = ModelRegistry::new();
        QueryBuilder::new(Repo::new(&db, &registry), users())
            .left_join("posts", "posts.user_id = users.id")
            .where_between("age", 1, 5)
            .destroy_all()
            .unwrap();
        let (sql, params) = db.last_statement().unwrap();
        assert_eq!(sql, "DELETE FROM users WHERE age BETWEEN ? AND ?");
        assert_eq!(params, vec![Value::from(1), Value::from(5)]);
    }

    #[test]
    fn test_failed_bulk_statement_is_an_error() {
        let db = RecordingDatabase::new();
        db.push_exec(ExecOutcomeFixture::failed("constraint failed"));
        let registry = ModelRegistry::new();
        let err = QueryBuilder::new(Repo::new(&db, &registry), users())
            .destroy_all()
            .unwrap_err();
        assert!(matches!(err, Error::Statement(ref msg) if msg == "constraint failed"));
    }

    #[test]
    fn test_paginate() {
        let db = RecordingDatabase::new();
        let registry = ModelRegistry::new();
        let (sql, _) = QueryBuilder::new(Repo::new(&db, &registry), users())
            .paginate(3, 20)
            .to_sql();
        assert_eq!(sql, "SELECT * FROM users LIMIT 20 OFFSET 40");
    }

    use crate::database::ExecOutcome as ExecOutcomeFixture;
}
