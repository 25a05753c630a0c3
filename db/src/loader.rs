//! Migration-file discovery, parsing and generation.
//!
//! A migration file is named `<version>_<name>.sql`, where `version` is a
//! run of digits (conventionally a `%Y%m%d%H%M%S` timestamp) and `name` is
//! made of letters, digits and `_`. Its body has two sections:
//!
//! ```sql
//! -- migrate:up
//! CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT);
//!
//! -- migrate:down
//! DROP TABLE users;
//! ```
//!
//! Files are returned sorted ascending by version. Versions compare as
//! strings, so keep them the same width.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use tracing::debug;

use crate::error::{LoadError, Result};

static FILE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)_([A-Za-z0-9_]+)\.sql$").expect("static regex must compile")
});

/// Version prefix format used by [`new_migration_file`].
pub const VERSION_FORMAT: &str = "%Y%m%d%H%M%S";

const UP_MARKER: &str = "-- migrate:up";
const DOWN_MARKER: &str = "-- migrate:down";

/// One parsed migration file.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationFile {
    pub version: String,
    pub name: String,
    pub path: PathBuf,
    /// Statements of the `up` section, in file order.
    pub up: Vec<String>,
    /// Statements of the `down` section; empty when the file has none.
    pub down: Vec<String>,
}

/// Splits a file name into `(version, name)`.
pub fn parse_file_name(file_name: &str) -> Option<(String, String)> {
    let caps = FILE_NAME_RE.captures(file_name)?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

/// Loads every `<version>_<name>.sql` file in `dir`, sorted by version.
///
/// A missing directory yields an empty list. Other `.sql` files whose names
/// do not match the pattern are rejected rather than silently skipped.
///
/// # Errors
///
/// [`LoadError::DuplicateVersion`] when two files share a version,
/// [`LoadError::InvalidMigrationFile`] for a malformed file and
/// [`LoadError::Io`] when the directory or a file cannot be read.
pub fn discover_migrations(dir: impl AsRef<Path>) -> Result<Vec<MigrationFile>> {
    let dir = dir.as_ref();
    if !dir.exists() {
        debug!(dir = %dir.display(), "migrations directory does not exist");
        return Ok(Vec::new());
    }

    let mut by_version: BTreeMap<String, MigrationFile> = BTreeMap::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("sql") {
            continue;
        }
        let file = load_migration_file(&path)?;
        if by_version.contains_key(&file.version) {
            return Err(LoadError::DuplicateVersion(file.version));
        }
        by_version.insert(file.version.clone(), file);
    }

    debug!(dir = %dir.display(), count = by_version.len(), "discovered migrations");
    Ok(by_version.into_values().collect())
}

/// Reads and parses a single migration file.
pub fn load_migration_file(path: impl AsRef<Path>) -> Result<MigrationFile> {
    let path = path.as_ref();
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let (version, name) = parse_file_name(file_name).ok_or_else(|| invalid(
        path,
        "file name must look like <version>_<name>.sql",
    ))?;

    let source = std::fs::read_to_string(path)?;
    let (up, down) = parse_sections(&source).map_err(|reason| invalid(path, &reason))?;

    Ok(MigrationFile {
        version,
        name,
        path: path.to_path_buf(),
        up,
        down,
    })
}

fn invalid(path: &Path, reason: &str) -> LoadError {
    LoadError::InvalidMigrationFile {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Splits a file body into its `up` and `down` statements.
pub fn parse_sections(source: &str) -> std::result::Result<(Vec<String>, Vec<String>), String> {
    #[derive(PartialEq)]
    enum Section {
        Preamble,
        Up,
        Down,
    }

    let mut section = Section::Preamble;
    let mut seen_up = false;
    let mut seen_down = false;
    let mut up = String::new();
    let mut down = String::new();

    for line in source.lines() {
        let marker = line.trim().to_lowercase();
        if marker == UP_MARKER {
            if seen_up || seen_down {
                return Err("'-- migrate:up' must appear once, before '-- migrate:down'".into());
            }
            seen_up = true;
            section = Section::Up;
            continue;
        }
        if marker == DOWN_MARKER {
            if !seen_up || seen_down {
                return Err("'-- migrate:down' must appear once, after '-- migrate:up'".into());
            }
            seen_down = true;
            section = Section::Down;
            continue;
        }

        match section {
            Section::Preamble => {
                let trimmed = line.trim();
                if !trimmed.is_empty() && !trimmed.starts_with("--") {
                    return Err("SQL found before '-- migrate:up'".into());
                }
            }
            Section::Up => {
                up.push_str(line);
                up.push('\n');
            }
            Section::Down => {
                down.push_str(line);
                down.push('\n');
            }
        }
    }

    if !seen_up {
        return Err("missing '-- migrate:up' section".into());
    }
    Ok((split_statements(&up), split_statements(&down)))
}

/// Splits a SQL script into statements on top-level `;`.
///
/// Semicolons inside quoted strings, quoted identifiers and comments do not
/// split. Inside `CREATE TRIGGER` only the `;` after the closing `END`
/// terminates the statement. Returned statements are trimmed, carry no
/// trailing `;`, and comment-only fragments are dropped.
pub fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' => {
                current.push(c);
                for inner in chars.by_ref() {
                    current.push(inner);
                    if inner == c {
                        // A doubled quote re-enters the literal on the next
                        // iteration of the outer loop.
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                for inner in chars.by_ref() {
                    if inner == '\n' {
                        current.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for inner in chars.by_ref() {
                    if prev == '*' && inner == '/' {
                        break;
                    }
                    prev = inner;
                }
                current.push(' ');
            }
            ';' if !inside_trigger_body(&current) => {
                push_statement(&mut statements, &current);
                current.clear();
            }
            _ => current.push(c),
        }
    }
    push_statement(&mut statements, &current);
    statements
}

fn push_statement(statements: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }
}

fn inside_trigger_body(current: &str) -> bool {
    let upper = current.to_uppercase();
    let words: Vec<&str> = upper.split_whitespace().collect();
    let is_trigger =
        words.first() == Some(&"CREATE") && words.iter().take(4).any(|w| *w == "TRIGGER");
    is_trigger && words.last() != Some(&"END")
}

/// Writes an empty migration template named `<now:%Y%m%d%H%M%S>_<name>.sql`
/// into `dir`, creating the directory when needed.
///
/// # Errors
///
/// [`LoadError::InvalidMigrationFile`] if `name` is not made of letters,
/// digits and `_`, or if the target file already exists.
pub fn new_migration_file(
    dir: impl AsRef<Path>,
    name: &str,
    now: NaiveDateTime,
) -> Result<PathBuf> {
    let dir = dir.as_ref();
    let file_name = format!("{}_{}.sql", now.format(VERSION_FORMAT), name);
    let path = dir.join(&file_name);
    if parse_file_name(&file_name).is_none() {
        return Err(invalid(&path, "name must contain only letters, digits and '_'"));
    }
    if path.exists() {
        return Err(invalid(&path, "file already exists"));
    }

    std::fs::create_dir_all(dir)?;
    std::fs::write(&path, format!("{UP_MARKER}\n\n\n{DOWN_MARKER}\n\n"))?;
    debug!(path = %path.display(), "created migration file");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_file_name() {
        assert_eq!(
            parse_file_name("20240101120000_create_users.sql"),
            Some(("20240101120000".to_string(), "create_users".to_string()))
        );
        assert_eq!(parse_file_name("create_users.sql"), None);
        assert_eq!(parse_file_name("001_create-users.sql"), None);
        assert_eq!(parse_file_name("001_users.txt"), None);
    }

    #[test]
    fn test_parse_sections() {
        let source = "-- create the users table\n\
                      -- migrate:up\n\
                      CREATE TABLE users (id INTEGER);\n\
                      CREATE INDEX idx_users_id ON users(id);\n\
                      -- migrate:down\n\
                      DROP TABLE users;\n";
        let (up, down) = parse_sections(source).unwrap();
        assert_eq!(up, vec!["CREATE TABLE users (id INTEGER)", "CREATE INDEX idx_users_id ON users(id)"]);
        assert_eq!(down, vec!["DROP TABLE users"]);
    }

    #[test]
    fn test_missing_up_section() {
        assert!(parse_sections("DROP TABLE users;").is_err());
        assert!(parse_sections("-- migrate:down\nDROP TABLE users;").is_err());
    }

    #[test]
    fn test_down_section_is_optional() {
        let (up, down) = parse_sections("-- migrate:up\nSELECT 1;").unwrap();
        assert_eq!(up.len(), 1);
        assert!(down.is_empty());
    }

    #[test]
    fn test_repeated_markers_rejected() {
        let source = "-- migrate:up\nSELECT 1;\n-- migrate:up\nSELECT 2;";
        assert!(parse_sections(source).is_err());
    }

    #[test]
    fn test_split_respects_quotes_and_comments() {
        let sql = "INSERT INTO t VALUES ('a;b'); -- trailing; comment\n\
                   /* block; comment */ INSERT INTO t VALUES (\"c;d\");\n\
                   INSERT INTO t VALUES ('it''s')";
        let statements = split_statements(sql);
        assert_eq!(
            statements,
            vec![
                "INSERT INTO t VALUES ('a;b')",
                "INSERT INTO t VALUES (\"c;d\")",
                "INSERT INTO t VALUES ('it''s')",
            ]
        );
    }

    #[test]
    fn test_split_keeps_trigger_body_together() {
        let sql = "CREATE TRIGGER touch AFTER UPDATE ON users BEGIN \
                   UPDATE users SET updated_at = CURRENT_TIMESTAMP WHERE id = NEW.id; END;\
                   SELECT 1;";
        let statements = split_statements(sql);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].ends_with("END"));
        assert_eq!(statements[1], "SELECT 1");
    }

    #[test]
    fn test_split_drops_comment_only_fragments() {
        assert!(split_statements("-- nothing here\n;  ;").is_empty());
    }
}
