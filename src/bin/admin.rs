//! Maintenance commands for the targetmap database.
//!
//! ## Usage
//!
//! ```bash
//! targetmap-admin init                  # create tables
//! targetmap-admin check                 # columns, row count, sample rows
//! targetmap-admin import targets.csv    # replace all targets from CSV
//! targetmap-admin export [out.csv]      # dump targets to CSV
//! targetmap-admin backup                # snapshot into the backup directory
//! ```

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

use targetmap::backup::BackupManager;
use targetmap::config::Config;
use targetmap::db::Db;
use targetmap::logging::{self, LogTarget};
use targetmap::{export, import};

enum Command {
    Init,
    Check,
    Import(PathBuf),
    Export(Option<PathBuf>),
    Backup,
}

struct AdminArgs {
    config_path: Option<PathBuf>,
    command: Command,
}

fn main() -> Result<()> {
    let args = parse_args();

    let mut config = match &args.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.logging.target = LogTarget::Stdout;
    logging::init(&config.logging)?;

    let db = Db::new(&config.db_path);

    match args.command {
        Command::Init => {
            db.initialize()?;
            println!("Database initialized at {}", config.db_path.display());
        }
        Command::Check => check(&db)?,
        Command::Import(csv_path) => {
            let count = import::import_targets(&db, &csv_path)
                .with_context(|| format!("Failed to import {}", csv_path.display()))?;
            println!("Imported {} targets from {}", count, csv_path.display());
        }
        Command::Export(path) => {
            let path = path.unwrap_or_else(export::default_export_path);
            let count = export::export_targets(&db, &path)?;
            println!("Exported {} targets to {}", count, path.display());
        }
        Command::Backup => {
            let manager = BackupManager::new(config.backups.clone());
            let snapshot = manager.create(&db)?;
            info!(snapshot = %snapshot.filename, "backup created");
            println!(
                "Backup created: {}",
                manager.backup_dir().join(&snapshot.filename).display()
            );
        }
    }

    Ok(())
}

fn check(db: &Db) -> Result<()> {
    println!("Checking database at: {}", db.path().display());

    println!("\nTable structure:");
    for column in db.columns_of("targets")? {
        println!("  {}: {} ({})", column.cid, column.name, column.data_type);
    }

    let count = targetmap::db::count_targets_in(db.path())?;
    println!("\nTotal rows: {count}");

    println!("\nSample rows:");
    for row in db.sample_rows("targets", 3)? {
        println!("  {}", serde_json::Value::Array(row));
    }
    Ok(())
}

fn parse_args() -> AdminArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;
    let mut positional = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            arg if arg.starts_with('-') => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
            arg => positional.push(arg.to_string()),
        }
        i += 1;
    }

    let command = match positional.as_slice() {
        [cmd] if cmd == "init" => Command::Init,
        [cmd] if cmd == "check" => Command::Check,
        [cmd] if cmd == "backup" => Command::Backup,
        [cmd, path] if cmd == "import" => Command::Import(PathBuf::from(path)),
        [cmd] if cmd == "export" => Command::Export(None),
        [cmd, path] if cmd == "export" => Command::Export(Some(PathBuf::from(path))),
        _ => {
            print_help();
            std::process::exit(1);
        }
    };

    AdminArgs {
        config_path,
        command,
    }
}

fn print_help() {
    println!(
        r#"targetmap-admin - database maintenance for targetmap

USAGE:
    targetmap-admin [OPTIONS] <COMMAND>

COMMANDS:
    init                Create the schema (safe to re-run)
    check               Print targets columns, row count and sample rows
    import <CSV>        Replace all targets with the rows of a CSV file
    export [PATH]       Write targets to CSV (default: targets_export_<time>.csv)
    backup              Snapshot the database into the backup directory

OPTIONS:
    --config, -c PATH   Path to config file
    --help, -h          Show this help message

ENVIRONMENT:
    TARGETMAP_CONFIG    Path to config file (overrides default location)
    TARGETMAP_DB        Database path (overrides config)
    TARGETMAP_LOG       Log filter (trace, debug, info, warn, error)"#
    );
}
