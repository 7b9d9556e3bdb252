//! Subcommand execution.

use crate::migrations;
use crate::{Args, Command};
use crate_db_core::catalog::{validate_name, SchemaRegistry};
use crate_db_core::config::{DatabaseConfig, DoctorConfig, DriverConfig, SqliteConfig};
use crate_db_core::driver::SqliteDriver;
use crate_db_core::migration::{Doctor, LedgerRecord, MigrationError, MigrationReport};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Command errors.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Configuration, driver or registry failure.
    #[error("{0}")]
    Core(#[from] crate_db_core::Error),

    /// Migration failure.
    #[error("{0}")]
    Migration(#[from] MigrationError),

    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// No document for the requested schema.
    #[error("schema '{0}' not found")]
    SchemaNotFound(String),
}

/// A registered migration unit.
#[derive(Debug, Clone)]
pub struct UnitInfo {
    pub module: String,
    pub path: String,
    pub title: String,
    pub applied: bool,
}

/// Result of a command, rendered by a formatter.
#[derive(Debug)]
pub enum Output {
    /// Executed migration units.
    Reports(Vec<MigrationReport>),
    /// Ledger contents.
    Ledger(Vec<LedgerRecord>),
    /// Registered migration units.
    Units(Vec<UnitInfo>),
    /// Persisted schema names.
    Schemas(Vec<String>),
    /// A persisted schema document.
    Document(Value),
}

/// Run the selected subcommand.
pub fn run(args: &Args) -> Result<Output, CommandError> {
    let config = load_config(args)?;

    match &args.command {
        Command::List => {
            let registry = SchemaRegistry::open(&config.schema_dir)?;
            Ok(Output::Schemas(registry.list()?))
        }
        Command::Show { name } => {
            validate_name(name)?;
            let registry = SchemaRegistry::open(&config.schema_dir)?;
            let path = registry.path_for(name);
            if !path.exists() {
                return Err(CommandError::SchemaNotFound(name.clone()));
            }
            let document: Value = serde_json::from_str(&std::fs::read_to_string(path)?)
                .map_err(crate_db_core::Error::from)?;
            Ok(Output::Document(document))
        }
        Command::Migrate { module, path } => {
            let mut doctor = open_doctor(&config, args)?;
            let mut reports = Vec::new();
            if !args.dry_run {
                reports.extend(doctor.ensure_ledger()?);
            }
            match path {
                Some(path) => reports.push(doctor.execute(module, path)?),
                None => reports.extend(doctor.run_pending(module)?),
            }
            Ok(Output::Reports(reports))
        }
        Command::Uninstall { module, path } => {
            let mut doctor = open_doctor(&config, args)?;
            Ok(Output::Reports(vec![doctor.uninstall(module, path)?]))
        }
        Command::Status => {
            let mut doctor = open_doctor(&config, args)?;
            Ok(Output::Ledger(doctor.applied()?))
        }
        Command::Migrations => {
            let mut doctor = open_doctor(&config, args)?;
            let applied = doctor.applied()?;
            let units = doctor.units();
            let mut infos = Vec::new();
            for module in units.modules() {
                for path in units.paths(module) {
                    infos.push(UnitInfo {
                        module: module.to_string(),
                        path: path.to_string(),
                        title: units.get(module, path).map(|u| u.title()).unwrap_or_default(),
                        applied: applied.iter().any(|record| record.is(module, path)),
                    });
                }
            }
            Ok(Output::Units(infos))
        }
    }
}

fn load_config(args: &Args) -> Result<DatabaseConfig, CommandError> {
    let mut config = match &args.config {
        Some(path) => DatabaseConfig::load(path)?,
        None => DatabaseConfig::new(&args.database).with_schema_dir(&args.schemas),
    };

    if let Some(version) = &args.compat_version {
        let DriverConfig::Sqlite(sqlite) = &mut config.driver;
        sqlite.compat_version = Some(version.clone());
    }
    config.validate()?;
    Ok(config)
}

fn open_doctor(config: &DatabaseConfig, args: &Args) -> Result<Doctor<SqliteDriver>, CommandError> {
    let DriverConfig::Sqlite(sqlite) = &config.driver;
    ensure_parent_dir(sqlite)?;

    let driver = SqliteDriver::open(sqlite.clone())?;
    let registry = Arc::new(SchemaRegistry::open(&config.schema_dir)?);
    let mut doctor = Doctor::new(driver, registry).with_config(
        DoctorConfig::default()
            .with_dry_run(args.dry_run)
            .with_skip_applied(true),
    );
    migrations::register(&mut doctor);
    Ok(doctor)
}

fn ensure_parent_dir(sqlite: &SqliteConfig) -> Result<(), CommandError> {
    if sqlite.is_memory() {
        return Ok(());
    }
    if let Some(parent) = sqlite.path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}
