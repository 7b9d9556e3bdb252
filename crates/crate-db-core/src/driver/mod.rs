//! Storage drivers.
//!
//! A driver realizes schema builders, editors and snapshots as backend
//! structures and performs row-level reads and writes. The migration doctor
//! and the repository only depend on the [`Driver`] trait.

mod query;
pub mod sqlite;

pub use query::{OrderDirection, Query};
pub use sqlite::SqliteDriver;

use crate::catalog::Schema;
use crate::error::Error;
use crate::migration::{SchemaBuilder, SchemaEditor};
use serde_json::{Map, Value};

/// A row keyed by column name.
pub type Row = Map<String, Value>;

/// Outcome of the last statement a driver executed.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum LastResult {
    /// Nothing executed yet.
    #[default]
    None,
    /// Statement succeeded without a row count.
    Success,
    /// Statement failed; see the driver's last error.
    Failure,
    /// Statement changed this many rows.
    Affected(usize),
    /// Query returned this many rows.
    Rows(usize),
}

impl LastResult {
    /// Check if the last statement succeeded.
    pub fn is_success(&self) -> bool {
        !matches!(self, LastResult::Failure)
    }
}

/// Optional features of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Backend supports transactions.
    pub transactions: bool,
    /// Backend can drop columns natively.
    pub native_drop_column: bool,
}

/// Storage backend contract.
pub trait Driver {
    /// Driver name.
    fn name(&self) -> &str;

    /// Backend capabilities.
    fn capabilities(&self) -> Capabilities;

    /// Text of the last attempted statement.
    fn last_query(&self) -> Option<&str>;

    /// Outcome of the last attempted statement.
    fn last_result(&self) -> &LastResult;

    /// Native error text of the last failed statement.
    fn last_error(&self) -> Option<&str>;

    /// Create the structures of a new collection.
    fn create_schema(&mut self, builder: &SchemaBuilder) -> Result<(), Error>;

    /// Apply an editor's diff to an existing collection.
    fn alter_schema(&mut self, editor: &SchemaEditor) -> Result<(), Error>;

    /// Drop a collection and its dependent structures.
    fn drop_schema(&mut self, schema: &Schema) -> Result<(), Error>;

    /// Check whether a collection exists in the backend.
    fn has_table(&mut self, name: &str) -> Result<bool, Error>;

    /// Select rows from a collection.
    fn select(&mut self, collection: &str, query: &Query) -> Result<Vec<Row>, Error>;

    /// Insert rows; returns the number of inserted rows.
    fn insert(&mut self, collection: &str, rows: &[Row]) -> Result<usize, Error>;

    /// Update rows matching every condition; returns the number of changed rows.
    fn update(&mut self, collection: &str, values: &Row, conditions: &Row) -> Result<usize, Error>;

    /// Delete rows matching every condition; returns the number of deleted rows.
    fn delete(&mut self, collection: &str, conditions: &Row) -> Result<usize, Error>;

    /// Open a transaction.
    fn begin(&mut self) -> Result<(), Error>;

    /// Commit the open transaction.
    fn commit(&mut self) -> Result<(), Error>;

    /// Roll back the open transaction.
    fn rollback(&mut self) -> Result<(), Error>;

    /// Check if a transaction is open.
    fn in_transaction(&self) -> bool;

    /// Switch referential enforcement off ahead of a transaction that may
    /// rebuild tables. Returns whether it was on and is now suspended.
    ///
    /// A suspending driver still verifies the references of rebuilt tables.
    fn suspend_foreign_keys(&mut self) -> Result<bool, Error> {
        Ok(false)
    }

    /// Undo [`Driver::suspend_foreign_keys`] once the transaction has ended.
    fn restore_foreign_keys(&mut self, enabled: bool) -> Result<(), Error> {
        let _ = enabled;
        Ok(())
    }
}
