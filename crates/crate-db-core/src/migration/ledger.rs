//! Ledger of applied migration units.

use super::builder::{DeclareProperties, SchemaBuilder};
use super::migrator::{Intent, Migrator};
use super::unit::Migration;
use crate::catalog::{PrimaryKeyFormat, Schema};
use crate::driver::Row;
use crate::error::Error;
use chrono::NaiveDateTime;
use serde_json::Value;

/// Collection holding the ledger.
pub const LEDGER_TABLE: &str = "migrations";

/// Module the ledger unit is registered under.
pub const LEDGER_MODULE: &str = "crate";

/// Path of the unit installing the ledger collection.
pub const LEDGER_MIGRATION_PATH: &str = "000_migrations-table";

/// Column stamped when a record is written.
pub const LEDGER_APPLIED_COLUMN: &str = "migrated_at";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One applied migration unit.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRecord {
    /// Record id.
    pub id: i64,
    /// Module the unit belongs to.
    pub module: String,
    /// Unit path within the module.
    pub migration: String,
    /// When the unit was applied.
    pub applied_at: Option<NaiveDateTime>,
}

impl LedgerRecord {
    /// Read a record from a ledger row.
    pub fn from_row(row: &Row) -> Option<Self> {
        Some(Self {
            id: row.get("id").and_then(Value::as_i64)?,
            module: row.get("module").and_then(Value::as_str)?.to_string(),
            migration: row.get("migration").and_then(Value::as_str)?.to_string(),
            applied_at: row
                .get(LEDGER_APPLIED_COLUMN)
                .and_then(Value::as_str)
                .and_then(|s| NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).ok()),
        })
    }

    /// Check whether this record is for the given unit.
    pub fn is(&self, module: &str, migration: &str) -> bool {
        self.module == module && self.migration == migration
    }
}

/// The unit installing the ledger collection itself.
///
/// The ledger is an internal collection: no schema document is stored for
/// it and it has no update timestamp.
#[derive(Debug, Default, Clone, Copy)]
pub struct LedgerTable;

impl Migration for LedgerTable {
    fn title(&self) -> String {
        "Install Migration Schema".to_string()
    }

    fn install(&self, migrator: &mut Migrator) {
        migrator.create(LEDGER_TABLE, |schema| {
            schema.driver = LEDGER_MODULE.to_string();
            schema.storage = false;
            schema
                .primary_key("id", PrimaryKeyFormat::Id)
                .created(Some(LEDGER_APPLIED_COLUMN))
                .updated(None);

            schema.string("module")?.required();
            schema.string("migration")?.required();
            Ok(())
        });
    }

    fn uninstall(&self, migrator: &mut Migrator) {
        migrator.delete(LEDGER_TABLE);
    }
}

/// Snapshot of the ledger collection.
///
/// The ledger has no persisted document, so the snapshot is derived from the
/// unit that installs it.
pub fn ledger_schema() -> Result<Schema, Error> {
    let mut migrator = Migrator::new();
    LedgerTable.install(&mut migrator);

    let mut builder = SchemaBuilder::new(LEDGER_TABLE);
    for intent in migrator.into_intents() {
        if let Intent::Create { build, .. } = intent {
            build(&mut builder)?;
        }
    }
    builder.storage = true;
    Schema::from_document(&builder.to_document()?)
}
