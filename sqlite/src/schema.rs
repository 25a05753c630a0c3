//! Schema-mutation operations used by migration bodies.
//!
//! [`SchemaOps`] renders DDL and runs it through the [`Database`]
//! collaborator, so every operation joins whatever transaction the caller
//! has open. Table, column and index names are validated before they are
//! interpolated into SQL.
//!
//! # Dropping columns
//!
//! SQLite cannot drop a column that is indexed or referenced by a table
//! constraint, and older versions cannot drop columns at all, so
//! [`SchemaOps::drop_column`] rebuilds the table:
//!
//! 1. read the stored `CREATE TABLE` text from `sqlite_master`
//! 2. split the column list on top-level commas, keeping every other
//!    column definition verbatim
//! 3. create a temporary table with the remaining columns
//! 4. copy the rows across
//! 5. drop the original and rename the temporary table into place
//! 6. re-create the indexes that did not use the dropped column
//!
//! The sequence runs in one transaction (a savepoint when nested), so a
//! failure at any step leaves the original table untouched.

use std::sync::LazyLock;

use recordkit_core::{Database, DatabaseExt, FieldDef, RecordType};
use regex::Regex;
use tracing::{debug, info};

use crate::error::{Result, SqliteError};

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[A-Za-z0-9_]+"#).expect("static regex must compile"));

/// Validates that a table, column or index name contains only alphanumeric
/// characters and underscores.
pub(crate) fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(SqliteError::InvalidIdentifier(name.to_string()));
    }
    Ok(())
}

/// Maps a declared field type onto a SQLite column type.
///
/// `boolean` becomes `INTEGER`; unknown types are upper-cased verbatim.
pub fn normalize_type(sql_type: &str) -> String {
    match sql_type.trim().to_lowercase().as_str() {
        "integer" | "int" => "INTEGER".to_string(),
        "text" | "string" => "TEXT".to_string(),
        "real" | "float" | "double" => "REAL".to_string(),
        "boolean" | "bool" => "INTEGER".to_string(),
        "blob" => "BLOB".to_string(),
        other => other.to_uppercase(),
    }
}

/// Renders one column definition.
pub fn column_sql(field: &FieldDef) -> String {
    let mut sql = format!("{} {}", field.name, normalize_type(&field.sql_type));
    if field.primary_key {
        sql.push_str(" PRIMARY KEY");
        if field.auto_increment {
            sql.push_str(" AUTOINCREMENT");
        }
    }
    if field.not_null {
        sql.push_str(" NOT NULL");
    }
    if field.unique {
        sql.push_str(" UNIQUE");
    }
    if let Some(default) = &field.default {
        sql.push_str(" DEFAULT ");
        sql.push_str(&default.to_sql());
    }
    sql
}

/// Column and constraint list for [`SchemaOps::create_table`].
///
/// # Examples
///
/// ```
/// use recordkit_core::FieldDef;
/// use recordkit_sqlite::TableBuilder;
///
/// let posts = TableBuilder::new()
///     .id()
///     .integer("user_id")
///     .field(FieldDef::text("title").not_null())
///     .foreign_key("user_id", "users", "id");
///
/// assert_eq!(
///     posts.to_sql("posts"),
///     "CREATE TABLE posts (id INTEGER PRIMARY KEY AUTOINCREMENT, user_id INTEGER, \
///      title TEXT NOT NULL, FOREIGN KEY (user_id) REFERENCES users(id))"
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct TableBuilder {
    columns: Vec<FieldDef>,
    constraints: Vec<String>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `id INTEGER PRIMARY KEY AUTOINCREMENT`
    pub fn id(self) -> Self {
        self.field(FieldDef::integer("id").primary_key().auto_increment())
    }

    pub fn integer(self, name: &str) -> Self {
        self.field(FieldDef::integer(name))
    }

    pub fn text(self, name: &str) -> Self {
        self.field(FieldDef::text(name))
    }

    pub fn real(self, name: &str) -> Self {
        self.field(FieldDef::real(name))
    }

    pub fn boolean(self, name: &str) -> Self {
        self.field(FieldDef::boolean(name))
    }

    pub fn blob(self, name: &str) -> Self {
        self.field(FieldDef::blob(name))
    }

    /// Column with a raw SQL type.
    pub fn column(self, name: &str, sql_type: &str) -> Self {
        self.field(FieldDef::new(name, sql_type))
    }

    /// Column with modifiers, e.g. `FieldDef::text("email").not_null().unique()`.
    pub fn field(mut self, field: FieldDef) -> Self {
        self.columns.push(field);
        self
    }

    /// `created_at` and `updated_at`, defaulting to the current time.
    pub fn timestamps(self) -> Self {
        self.field(timestamp_field("created_at"))
            .field(timestamp_field("updated_at"))
    }

    pub fn foreign_key(mut self, column: &str, table: &str, references: &str) -> Self {
        self.constraints.push(format!(
            "FOREIGN KEY ({column}) REFERENCES {table}({references})"
        ));
        self
    }

    pub fn unique_together(mut self, columns: &[&str]) -> Self {
        self.constraints
            .push(format!("UNIQUE ({})", columns.join(", ")));
        self
    }

    pub fn columns(&self) -> &[FieldDef] {
        &self.columns
    }

    fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn to_sql(&self, table: &str) -> String {
        let mut parts: Vec<String> = self.columns.iter().map(column_sql).collect();
        parts.extend(self.constraints.iter().cloned());
        format!("CREATE TABLE {table} ({})", parts.join(", "))
    }

    fn validate(&self) -> Result<()> {
        for column in &self.columns {
            validate_identifier(&column.name)?;
        }
        Ok(())
    }
}

fn timestamp_field(name: &str) -> FieldDef {
    FieldDef::timestamp(name).default_expr("CURRENT_TIMESTAMP")
}

/// Schema DSL bound to one database handle.
pub struct SchemaOps<'a> {
    db: &'a dyn Database,
}

impl<'a> SchemaOps<'a> {
    pub fn new(db: &'a dyn Database) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &'a dyn Database {
        self.db
    }

    /// Runs one raw statement.
    pub fn execute(&self, sql: &str) -> Result<()> {
        let outcome = self.db.execute(sql, &[])?;
        if !outcome.success {
            return Err(SqliteError::MigrationError(format!(
                "{}: {sql}",
                outcome.error.unwrap_or_default()
            )));
        }
        Ok(())
    }

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.db.table_exists(table)?)
    }

    /// Names of the table's columns in declaration order.
    pub fn column_names(&self, table: &str) -> Result<Vec<String>> {
        Ok(self
            .db
            .table_schema(table)?
            .into_iter()
            .map(|c| c.name)
            .collect())
    }

    pub fn create_table(&self, table: &str, builder: TableBuilder) -> Result<()> {
        validate_identifier(table)?;
        builder.validate()?;
        self.execute(&builder.to_sql(table))?;
        debug!(table, "created table");
        Ok(())
    }

    /// Creates the table for a record type from its declared fields.
    ///
    /// The primary-key column is added when no field declares it, and
    /// `created_at`/`updated_at` are added when `timestamps` is set and the
    /// type does not already declare them.
    pub fn create_table_from_model(&self, record_type: &RecordType, timestamps: bool) -> Result<()> {
        let mut builder = TableBuilder::new();
        let declares_pk = record_type
            .fields
            .iter()
            .any(|f| f.primary_key || f.name == record_type.primary_key);
        if !declares_pk {
            builder = builder.field(
                FieldDef::integer(&record_type.primary_key)
                    .primary_key()
                    .auto_increment(),
            );
        }
        for field in &record_type.fields {
            builder = builder.field(field.clone());
        }
        if timestamps {
            for column in ["created_at", "updated_at"] {
                if !builder.has_column(column) {
                    builder = builder.field(timestamp_field(column));
                }
            }
        }
        self.create_table(&record_type.table_name, builder)
    }

    pub fn drop_table(&self, table: &str) -> Result<()> {
        validate_identifier(table)?;
        self.execute(&format!("DROP TABLE {table}"))
    }

    pub fn rename_table(&self, from: &str, to: &str) -> Result<()> {
        validate_identifier(from)?;
        validate_identifier(to)?;
        self.execute(&format!("ALTER TABLE {from} RENAME TO {to}"))
    }

    pub fn add_column(&self, table: &str, field: FieldDef) -> Result<()> {
        validate_identifier(table)?;
        validate_identifier(&field.name)?;
        self.execute(&format!("ALTER TABLE {table} ADD COLUMN {}", column_sql(&field)))
    }

    pub fn rename_column(&self, table: &str, from: &str, to: &str) -> Result<()> {
        validate_identifier(table)?;
        validate_identifier(from)?;
        validate_identifier(to)?;
        self.execute(&format!("ALTER TABLE {table} RENAME COLUMN {from} TO {to}"))
    }

    /// Creates `idx_<table>_<columns>` and returns its name.
    pub fn add_index(&self, table: &str, columns: &[&str], unique: bool) -> Result<String> {
        validate_identifier(table)?;
        for column in columns {
            validate_identifier(column)?;
        }
        let name = format!("idx_{table}_{}", columns.join("_"));
        let kind = if unique { "UNIQUE INDEX" } else { "INDEX" };
        self.execute(&format!(
            "CREATE {kind} {name} ON {table} ({})",
            columns.join(", ")
        ))?;
        Ok(name)
    }

    pub fn remove_index(&self, name: &str) -> Result<()> {
        validate_identifier(name)?;
        self.execute(&format!("DROP INDEX {name}"))
    }

    /// Removes a column by rebuilding the table.
    ///
    /// # Errors
    ///
    /// [`SqliteError::SchemaParse`] when the table is missing, the column
    /// is missing or the only one, the stored definition cannot be split,
    /// or a table constraint refers to the column.
    pub fn drop_column(&self, table: &str, column: &str) -> Result<()> {
        validate_identifier(table)?;
        validate_identifier(column)?;
        let parse_err = |reason: String| SqliteError::SchemaParse {
            table: table.to_string(),
            reason,
        };

        let stored = self.db.query(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?",
            &[table.into()],
        )?;
        let create_sql = stored
            .rows
            .first()
            .and_then(|row| row.get("sql"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| parse_err("table does not exist".to_string()))?;

        let definition = TableDefinition::parse(&create_sql).map_err(parse_err)?;
        let mut kept_columns = Vec::new();
        let mut kept_defs = Vec::new();
        let mut found = false;
        for def in &definition.columns {
            let name = column_name(def).ok_or_else(|| parse_err(format!("cannot read column in '{def}'")))?;
            if name.eq_ignore_ascii_case(column) {
                found = true;
            } else {
                kept_columns.push(name);
                kept_defs.push(def.clone());
            }
        }
        if !found {
            return Err(parse_err(format!("no such column '{column}'")));
        }
        if kept_columns.is_empty() {
            return Err(parse_err(format!("'{column}' is the only column")));
        }
        if let Some(constraint) = definition
            .constraints
            .iter()
            .find(|c| mentions(c, column))
        {
            return Err(parse_err(format!(
                "table constraint '{constraint}' refers to '{column}'"
            )));
        }

        let indexes = self.db.query(
            "SELECT name, sql FROM sqlite_master \
             WHERE type = 'index' AND tbl_name = ? AND sql IS NOT NULL",
            &[table.into()],
        )?;
        let kept_indexes: Vec<String> = indexes
            .rows
            .iter()
            .filter_map(|row| row.get("sql").and_then(|v| v.as_str()))
            .filter(|sql| !index_mentions(sql, column))
            .map(str::to_string)
            .collect();

        let temp = format!("{table}_rk_rebuild");
        let mut parts = kept_defs;
        parts.extend(definition.constraints.iter().cloned());
        let column_list = kept_columns
            .iter()
            .map(|name| quote_identifier(name))
            .collect::<Vec<_>>()
            .join(", ");

        self.db.transaction(|| -> Result<()> {
            self.execute("PRAGMA defer_foreign_keys = ON")?;
            self.execute(&format!(
                "CREATE TABLE {temp} ({}){}",
                parts.join(", "),
                definition.suffix
            ))?;
            self.execute(&format!(
                "INSERT INTO {temp} ({column_list}) SELECT {column_list} FROM {table}"
            ))?;
            self.execute(&format!("DROP TABLE {table}"))?;
            self.execute(&format!("ALTER TABLE {temp} RENAME TO {table}"))?;
            for index in &kept_indexes {
                self.execute(index)?;
            }
            Ok(())
        })?;

        info!(table, column, "dropped column");
        Ok(())
    }
}

/// A `CREATE TABLE` statement split into its parts.
#[derive(Debug, PartialEq)]
struct TableDefinition {
    columns: Vec<String>,
    constraints: Vec<String>,
    /// Text after the closing parenthesis (`WITHOUT ROWID`, `STRICT`).
    suffix: String,
}

impl TableDefinition {
    fn parse(sql: &str) -> std::result::Result<Self, String> {
        let open = sql
            .find('(')
            .ok_or_else(|| "definition has no column list".to_string())?;
        let close = matching_paren(sql, open)
            .ok_or_else(|| "unbalanced parentheses in definition".to_string())?;
        let body = &sql[open + 1..close];

        let mut columns = Vec::new();
        let mut constraints = Vec::new();
        for part in split_top_level(body)? {
            if is_table_constraint(&part) {
                constraints.push(part);
            } else {
                columns.push(part);
            }
        }
        if columns.is_empty() {
            return Err("definition has no columns".to_string());
        }
        Ok(Self {
            columns,
            constraints,
            suffix: sql[close + 1..].trim_end().to_string(),
        })
    }
}

/// Byte index of the parenthesis closing the one at `open`, skipping
/// quoted text.
fn matching_paren(sql: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in sql.char_indices().skip_while(|(i, _)| *i < open) {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Splits a column list on commas that are not nested in parentheses or
/// quotes.
fn split_top_level(body: &str) -> std::result::Result<Vec<String>, String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;

    for c in body.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`' | '[') => quote = Some(if c == '[' { ']' } else { c }),
            (None, '(') => depth += 1,
            (None, ')') => depth -= 1,
            (None, ',') if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        if depth < 0 {
            return Err("unbalanced parentheses in column list".to_string());
        }
        current.push(c);
    }
    if depth != 0 || quote.is_some() {
        return Err("unterminated column list".to_string());
    }
    parts.push(current.trim().to_string());
    if parts.iter().any(String::is_empty) {
        return Err("empty column definition".to_string());
    }
    Ok(parts)
}

fn is_table_constraint(part: &str) -> bool {
    let first = part
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_uppercase();
    matches!(
        first.as_str(),
        "CONSTRAINT" | "PRIMARY" | "UNIQUE" | "CHECK" | "FOREIGN"
    ) || first.starts_with("UNIQUE(")
        || first.starts_with("CHECK(")
}

/// Column name of a definition, unquoted.
fn column_name(def: &str) -> Option<String> {
    let def = def.trim_start();
    let mut chars = def.chars();
    let close = match chars.next()? {
        '"' => '"',
        '`' => '`',
        '[' => ']',
        '\'' => '\'',
        _ => return def.split_whitespace().next().map(str::to_string),
    };
    let rest = &def[1..];
    rest.find(close).map(|end| rest[..end].to_string())
}

/// Double-quoted identifier, safe for names with spaces or keywords.
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Whether `text` uses `column` as a whole word, case-insensitively.
fn mentions(text: &str, column: &str) -> bool {
    WORD_RE
        .find_iter(text)
        .any(|m| m.as_str().eq_ignore_ascii_case(column))
}

/// Whether the indexed expression list (or partial-index WHERE) uses `column`.
fn index_mentions(sql: &str, column: &str) -> bool {
    sql.find('(')
        .map(|open| mentions(&sql[open..], column))
        .unwrap_or(true)
}
