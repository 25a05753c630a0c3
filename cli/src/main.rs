use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use recordkit_db::{DatabaseConfig, new_migration_file};
use recordkit_sqlite::{MigrationEngine, SqliteDatabase};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG: &str = "recordkit.yml";

#[derive(Debug, Parser)]
#[command(name = "recordkit")]
#[command(about = "Versioned SQLite schema migrations", version)]
struct Cli {
    #[command(flatten)]
    target: TargetArgs,
    /// Log at debug level (repeat for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct TargetArgs {
    /// YAML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Database file; overrides the configured path.
    #[arg(long, global = true)]
    database: Option<PathBuf>,
    /// Migrations directory; overrides the configured path.
    #[arg(long, global = true)]
    migrations: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply every pending migration.
    Migrate,
    /// Revert the most recently applied migration.
    Rollback,
    /// Revert every applied migration, newest first.
    Reset,
    /// Show which migrations are applied.
    Status(StatusArgs),
    /// Create an empty migration file.
    New(NewArgs),
}

#[derive(Debug, Args)]
struct StatusArgs {
    /// Print machine-readable JSON instead of a table.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct NewArgs {
    /// Migration name, e.g. `create_users`.
    name: String,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = resolve_config(&cli.target).and_then(|config| match cli.command {
        Command::Migrate => run_migrate(&config),
        Command::Rollback => run_rollback(&config),
        Command::Reset => run_reset(&config),
        Command::Status(args) => run_status(&config, args),
        Command::New(args) => run_new(&config, args),
    });

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Loads the configuration, then applies command-line overrides.
fn resolve_config(target: &TargetArgs) -> Result<DatabaseConfig, String> {
    let mut config = match &target.config {
        Some(path) => load_config(path)?,
        None if Path::new(DEFAULT_CONFIG).exists() => load_config(Path::new(DEFAULT_CONFIG))?,
        None => DatabaseConfig::default(),
    };
    if let Some(database) = &target.database {
        config.database = database.clone();
    }
    if let Some(migrations) = &target.migrations {
        config.migrations_dir = migrations.clone();
    }
    config
        .validate()
        .map_err(|e| format!("Invalid configuration: {e}"))?;
    debug!(?config, "resolved configuration");
    Ok(config)
}

fn load_config(path: &Path) -> Result<DatabaseConfig, String> {
    DatabaseConfig::load(path)
        .map_err(|e| format!("Failed to load config '{}': {e}", path.display()))
}

// ---------------------------------------------------------------------------
// migration commands
// ---------------------------------------------------------------------------

fn open(config: &DatabaseConfig) -> Result<SqliteDatabase, String> {
    SqliteDatabase::open(config)
        .map_err(|e| format!("Failed to open database '{}': {e}", config.database.display()))
}

fn engine<'a>(db: &'a SqliteDatabase, config: &DatabaseConfig) -> Result<MigrationEngine<'a>, String> {
    MigrationEngine::from_config(db, config)
        .map_err(|e| format!("Failed to load migrations: {e}"))
}

fn run_migrate(config: &DatabaseConfig) -> Result<(), String> {
    let db = open(config)?;
    let mut engine = engine(&db, config)?;
    let applied = engine.migrate().map_err(|e| format!("Migrate failed: {e}"))?;
    if applied.is_empty() {
        println!("Nothing to migrate.");
    }
    for version in applied {
        println!("Applied {version}");
    }
    Ok(())
}

fn run_rollback(config: &DatabaseConfig) -> Result<(), String> {
    let db = open(config)?;
    let mut engine = engine(&db, config)?;
    match engine.rollback().map_err(|e| format!("Rollback failed: {e}"))? {
        Some(version) => println!("Reverted {version}"),
        None => println!("Nothing to roll back."),
    }
    Ok(())
}

fn run_reset(config: &DatabaseConfig) -> Result<(), String> {
    let db = open(config)?;
    let mut engine = engine(&db, config)?;
    let reverted = engine.reset().map_err(|e| format!("Reset failed: {e}"))?;
    for version in &reverted {
        println!("Reverted {version}");
    }
    println!("Reset complete: {} migration(s) reverted.", reverted.len());
    Ok(())
}

fn run_status(config: &DatabaseConfig, args: StatusArgs) -> Result<(), String> {
    let db = open(config)?;
    let engine = engine(&db, config)?;
    let status = engine
        .status()
        .map_err(|e| format!("Failed to get migration status: {e}"))?;

    if args.json {
        let json = serde_json::to_string_pretty(&status)
            .map_err(|e| format!("Failed to serialize status: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    if status.is_empty() {
        println!("No migrations in '{}'.", config.migrations_dir.display());
    }
    for entry in status {
        let state = if entry.applied { "up" } else { "down" };
        println!(
            "{state:<5} {} {} {}",
            entry.version,
            entry.name,
            entry.migrated_at.unwrap_or_default()
        );
    }
    Ok(())
}

fn run_new(config: &DatabaseConfig, args: NewArgs) -> Result<(), String> {
    let now = chrono::Local::now().naive_local();
    let path = new_migration_file(&config.migrations_dir, &args.name, now)
        .map_err(|e| format!("Failed to create migration: {e}"))?;
    println!("Created {}", path.display());
    Ok(())
}
