//! crate-db Core - Schema definition, schema evolution and migrations.
//!
//! This crate declares document collections as typed schemas, persists them
//! as canonical JSON documents and evolves them through migration units
//! executed against a SQLite backend.

pub mod catalog;
pub mod config;
pub mod driver;
pub mod error;
pub mod migration;
pub mod repository;

pub use catalog::{
    FeatureFlags, PrimaryKeyFormat, Property, PropertyKind, Schema, SchemaDocument,
    SchemaRegistry,
};
pub use config::{DatabaseConfig, DoctorConfig, DriverConfig, SqliteConfig};
pub use driver::{Driver, LastResult, OrderDirection, Query, Row, SqliteDriver};
pub use error::Error;
pub use migration::{
    DeclareProperties, Doctor, Migration, MigrationError, MigrationReport, Migrator,
    SchemaBuilder, SchemaEditor,
};
pub use repository::Repository;
