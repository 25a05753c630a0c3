use std::path::Path;

use chrono::NaiveDate;
use recordkit_db::{DatabaseConfig, LoadError, discover_migrations, new_migration_file};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn write_migration(dir: &Path, file_name: &str, up: &str, down: &str) {
    let body = format!("-- migrate:up\n{up}\n-- migrate:down\n{down}\n");
    std::fs::write(dir.join(file_name), body).unwrap();
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

#[test]
fn test_discovery_sorts_by_version() {
    let dir = tempfile::tempdir().unwrap();
    write_migration(dir.path(), "003_add_index.sql", "CREATE INDEX i ON users(name);", "DROP INDEX i;");
    write_migration(dir.path(), "001_create_users.sql", "CREATE TABLE users (id INTEGER);", "DROP TABLE users;");
    write_migration(dir.path(), "002_create_posts.sql", "CREATE TABLE posts (id INTEGER);", "DROP TABLE posts;");
    std::fs::write(dir.path().join("README.md"), "not a migration").unwrap();

    let files = discover_migrations(dir.path()).unwrap();
    let versions: Vec<&str> = files.iter().map(|f| f.version.as_str()).collect();
    assert_eq!(versions, vec!["001", "002", "003"]);
    assert_eq!(files[0].name, "create_users");
    assert_eq!(files[0].up, vec!["CREATE TABLE users (id INTEGER)"]);
    assert_eq!(files[0].down, vec!["DROP TABLE users"]);
}

#[test]
fn test_discovery_missing_dir_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let files = discover_migrations(dir.path().join("nope")).unwrap();
    assert!(files.is_empty());
}

#[test]
fn test_discovery_rejects_duplicate_versions() {
    let dir = tempfile::tempdir().unwrap();
    write_migration(dir.path(), "001_a.sql", "SELECT 1;", "");
    write_migration(dir.path(), "001_b.sql", "SELECT 2;", "");

    let err = discover_migrations(dir.path()).unwrap_err();
    assert!(matches!(err, LoadError::DuplicateVersion(ref v) if v == "001"));
}

#[test]
fn test_discovery_rejects_badly_named_sql_files() {
    let dir = tempfile::tempdir().unwrap();
    write_migration(dir.path(), "create_users.sql", "SELECT 1;", "");

    let err = discover_migrations(dir.path()).unwrap_err();
    assert!(matches!(err, LoadError::InvalidMigrationFile { .. }));
}

#[test]
fn test_discovery_rejects_missing_up_section() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("001_broken.sql"), "CREATE TABLE t (id INTEGER);").unwrap();

    let err = discover_migrations(dir.path()).unwrap_err();
    assert!(err.to_string().contains("001_broken.sql"));
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

#[test]
fn test_new_migration_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("migrations");
    let now = NaiveDate::from_ymd_opt(2024, 3, 9)
        .unwrap()
        .and_hms_opt(14, 5, 7)
        .unwrap();

    let path = new_migration_file(&target, "create_users", now).unwrap();
    assert_eq!(path.file_name().unwrap(), "20240309140507_create_users.sql");

    let files = discover_migrations(&target).unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].version, "20240309140507");
    assert!(files[0].up.is_empty());

    assert!(new_migration_file(&target, "create_users", now).is_err());
    assert!(new_migration_file(&target, "bad name", now).is_err());
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[test]
fn test_config_load_and_save() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("recordkit.yml");
    std::fs::write(
        &path,
        "database: blog.db\nmigrations_dir: db/migrations\njournal_mode: wal\nbusy_timeout_ms: 250\n",
    )
    .unwrap();

    let config = DatabaseConfig::load(&path).unwrap();
    assert_eq!(config.database, Path::new("blog.db"));
    assert_eq!(config.migrations_dir, Path::new("db/migrations"));
    assert_eq!(config.journal_mode.as_deref(), Some("wal"));
    assert_eq!(config.busy_timeout_ms, 250);
    assert_eq!(config.migrations_table, "schema_migrations");

    let copy = dir.path().join("copy.yml");
    config.save(&copy).unwrap();
    assert_eq!(DatabaseConfig::load(&copy).unwrap(), config);
}

#[test]
fn test_config_load_rejects_invalid_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("recordkit.yml");
    std::fs::write(&path, "migrations_table: \"bad-name\"\n").unwrap();

    let err = DatabaseConfig::load(&path).unwrap_err();
    assert!(matches!(err, LoadError::InvalidConfig(_)));
}

#[test]
fn test_config_load_missing_file() {
    let err = DatabaseConfig::load("/definitely/not/here.yml").unwrap_err();
    assert!(matches!(err, LoadError::Io(_)));
}
