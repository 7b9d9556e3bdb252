//! Schema catalog for crate-db.
//!
//! The catalog holds the property model, immutable schema snapshots, the
//! canonical persisted document format and the registry that loads and
//! caches documents by collection name.

mod document;
mod property;
mod registry;
mod schema;

pub use document::{
    property_from_fragment, property_to_fragment, InternalConfig, InternalProperties,
    SchemaDocument, SCHEMA_DIALECT,
};
pub use property::{Property, PropertyKind, UID_LENGTH, UUID_LENGTH};
pub use registry::{validate_name, SchemaRegistry};
pub use schema::{FeatureFlags, PrimaryKeyFormat, Schema};
