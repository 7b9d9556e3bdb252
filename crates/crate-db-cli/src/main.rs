//! crate-db Command-Line Migration Runner
//!
//! Runs registered migration units against a SQLite database and inspects
//! the migration ledger and persisted schema documents.

mod commands;
mod formatter;
mod migrations;

use clap::{Parser, Subcommand};
use formatter::OutputFormat;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// crate-db Command-Line Migration Runner
#[derive(Parser, Debug)]
#[command(name = "crate-db")]
#[command(version, about = "crate-db migration runner")]
pub struct Args {
    /// SQLite database file (`:memory:` for a throwaway database)
    #[arg(short = 'd', long, default_value = "./storage/database.sqlite")]
    pub database: PathBuf,

    /// Directory holding schema documents
    #[arg(short = 's', long, default_value = crate_db_core::config::DEFAULT_SCHEMA_DIR)]
    pub schemas: PathBuf,

    /// JSON configuration file; replaces --database and --schemas
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Engine version used for feature detection, e.g. 3.34.0
    #[arg(long)]
    pub compat_version: Option<String>,

    /// Replay migrations without touching the database or schema documents
    #[arg(long)]
    pub dry_run: bool,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run pending migrations of a module, or a single migration
    Migrate {
        /// Module whose migrations run
        #[arg(short = 'm', long, default_value = migrations::DEMO_MODULE)]
        module: String,

        /// Run only this migration path
        #[arg(short = 'p', long)]
        path: Option<String>,
    },
    /// Replay the uninstall routine of a migration
    Uninstall {
        /// Module of the migration
        #[arg(short = 'm', long, default_value = migrations::DEMO_MODULE)]
        module: String,

        /// Migration path
        path: String,
    },
    /// Show applied migrations
    Status,
    /// List registered migrations
    Migrations,
    /// List persisted schemas
    List,
    /// Print a persisted schema document
    Show {
        /// Collection name
        name: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("crate_db=info")),
        )
        .init();

    let args = Args::parse();
    let formatter = formatter::create_formatter(args.format);

    match commands::run(&args) {
        Ok(output) => println!("{}", formatter.render(&output)),
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("{}", formatter.format_error(&e.to_string()));
            std::process::exit(1);
        }
    }
}
