//! Migration engine for crate-db.
//!
//! Migrations are described, then executed:
//! - [`SchemaBuilder`] declares a new collection
//! - [`SchemaEditor`] records a diff against an existing snapshot
//! - [`Migrator`] holds the ordered intents of one migration unit
//! - [`Doctor`] replays intents against a driver inside a transaction and
//!   records applied units in the `migrations` ledger
//!
//! # Example
//!
//! ```ignore
//! use crate_db_core::migration::{DeclareProperties, Migration, Migrator};
//!
//! struct CreateUsers;
//!
//! impl Migration for CreateUsers {
//!     fn title(&self) -> String {
//!         "Create users".to_string()
//!     }
//!
//!     fn install(&self, migrator: &mut Migrator) {
//!         migrator.create("users", |schema| {
//!             schema.string("username")?.required().unique();
//!             schema.email("email", false)?.required();
//!             Ok(())
//!         });
//!     }
//!
//!     fn uninstall(&self, migrator: &mut Migrator) {
//!         migrator.delete("users");
//!     }
//! }
//! ```

pub mod builder;
pub mod doctor;
pub mod editor;
pub mod error;
pub mod ledger;
pub mod migrator;
pub mod state;
pub mod unit;

pub use builder::{
    DeclareProperties, SchemaBuilder, DEFAULT_CREATED, DEFAULT_DRIVER, DEFAULT_PRIMARY_KEY,
    DEFAULT_UPDATED,
};
pub use doctor::{Doctor, MigrationReport};
pub use editor::{Converter, DiffOp, SchemaEditor};
pub use error::MigrationError;
pub use ledger::{
    ledger_schema, LedgerRecord, LedgerTable, LEDGER_APPLIED_COLUMN, LEDGER_MIGRATION_PATH,
    LEDGER_MODULE, LEDGER_TABLE,
};
pub use migrator::{BuildFn, EditFn, Intent, IntentKind, Migrator, SelectFn};
pub use state::{UnitState, UnitStatus};
pub use unit::{Migration, MigrationSet};

pub use crate::config::DoctorConfig;
