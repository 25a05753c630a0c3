use std::fs;
use std::path::Path;
use std::process::{Command, Output};

/// Runs the binary inside `dir` so relative config paths resolve there.
fn recordkit(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_recordkit"))
        .current_dir(dir)
        .args(args)
        .output()
        .expect("failed to run recordkit")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Config plus two migration files in a fresh project directory.
fn project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("recordkit.yml"),
        "database: app.db\nmigrations_dir: migrations\n",
    )
    .unwrap();
    let migrations = dir.path().join("migrations");
    fs::create_dir_all(&migrations).unwrap();
    fs::write(
        migrations.join("001_create_users.sql"),
        "-- migrate:up\nCREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);\n\
         -- migrate:down\nDROP TABLE users;\n",
    )
    .unwrap();
    fs::write(
        migrations.join("002_create_posts.sql"),
        "-- migrate:up\nCREATE TABLE posts (id INTEGER PRIMARY KEY, user_id INTEGER);\n\
         -- migrate:down\nDROP TABLE posts;\n",
    )
    .unwrap();
    dir
}

// ---------------------------------------------------------------------------
// migrate / rollback / reset
// ---------------------------------------------------------------------------

#[test]
fn test_migrate_applies_pending_versions_once() {
    let dir = project();

    let first = recordkit(dir.path(), &["migrate"]);
    assert!(first.status.success());
    let out = stdout(&first);
    assert!(out.contains("Applied 001"));
    assert!(out.contains("Applied 002"));
    assert!(dir.path().join("app.db").exists());

    let second = recordkit(dir.path(), &["migrate"]);
    assert!(second.status.success());
    assert!(stdout(&second).contains("Nothing to migrate."));
}

#[test]
fn test_rollback_and_reset() {
    let dir = project();
    assert!(recordkit(dir.path(), &["migrate"]).status.success());

    let rollback = recordkit(dir.path(), &["rollback"]);
    assert!(rollback.status.success());
    assert!(stdout(&rollback).contains("Reverted 002"));

    let reset = recordkit(dir.path(), &["reset"]);
    assert!(reset.status.success());
    assert!(stdout(&reset).contains("1 migration(s) reverted"));

    let again = recordkit(dir.path(), &["rollback"]);
    assert!(stdout(&again).contains("Nothing to roll back."));
}

#[test]
fn test_failed_migration_exits_non_zero() {
    let dir = project();
    fs::write(
        dir.path().join("migrations/003_broken.sql"),
        "-- migrate:up\nCREATE TABLE;\n",
    )
    .unwrap();

    let output = recordkit(dir.path(), &["migrate"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("003_broken"));

    let status = recordkit(dir.path(), &["status", "--json"]);
    let entries: serde_json::Value = serde_json::from_slice(&status.stdout).unwrap();
    assert_eq!(entries[1]["applied"], true);
    assert_eq!(entries[2]["applied"], false);
}

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

#[test]
fn test_status_table_and_json() {
    let dir = project();
    let db = dir.path().join("other.db");
    let db = db.to_str().unwrap();

    assert!(recordkit(dir.path(), &["--database", db, "migrate"]).status.success());
    assert!(recordkit(dir.path(), &["--database", db, "rollback"]).status.success());

    let table = stdout(&recordkit(dir.path(), &["--database", db, "status"]));
    let lines: Vec<&str> = table.lines().collect();
    assert!(lines[0].starts_with("up"));
    assert!(lines[0].contains("001 create_users"));
    assert!(lines[1].starts_with("down"));

    let json = recordkit(dir.path(), &["status", "--json", "--database", db]);
    let entries: serde_json::Value = serde_json::from_slice(&json.stdout).unwrap();
    assert_eq!(entries[0]["version"], "001");
    assert_eq!(entries[0]["applied"], true);
    assert_eq!(entries[1]["name"], "create_posts");
    assert!(entries[1]["migrated_at"].is_null());

    assert!(!dir.path().join("app.db").exists());
}

// ---------------------------------------------------------------------------
// new / configuration
// ---------------------------------------------------------------------------

#[test]
fn test_new_creates_template() {
    let dir = tempfile::tempdir().unwrap();

    let output = recordkit(dir.path(), &["--migrations", "db/migrate", "new", "add_email"]);
    assert!(output.status.success());

    let files: Vec<String> = fs::read_dir(dir.path().join("db/migrate"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(files.len(), 1);
    assert!(files[0].ends_with("_add_email.sql"));

    let bad = recordkit(dir.path(), &["new", "add-email"]);
    assert!(!bad.status.success());
}

#[test]
fn test_invalid_config_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("custom.yml");
    fs::write(&config, "journal_mode: sideways\n").unwrap();

    let output = recordkit(dir.path(), &["--config", config.to_str().unwrap(), "status"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("journal_mode"));
}
