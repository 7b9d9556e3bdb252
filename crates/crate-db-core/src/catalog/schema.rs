//! Immutable schema snapshots.

use super::document::{property_from_fragment, SchemaDocument};
use super::property::Property;
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Primary key generation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimaryKeyFormat {
    /// Auto-increment integer.
    Id,
    /// Fixed-length 26 character identifier.
    Uid,
    /// Fixed-length 36 character UUID.
    Uuid,
}

impl PrimaryKeyFormat {
    /// Format name as written into schema documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            PrimaryKeyFormat::Id => "id",
            PrimaryKeyFormat::Uid => "uid",
            PrimaryKeyFormat::Uuid => "uuid",
        }
    }

    /// Parse a format name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "id" => Some(PrimaryKeyFormat::Id),
            "uid" => Some(PrimaryKeyFormat::Uid),
            "uuid" => Some(PrimaryKeyFormat::Uuid),
            _ => None,
        }
    }
}

impl std::fmt::Display for PrimaryKeyFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional collection features.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Branch tables (`{name}_branch_*`) exist.
    pub branches: bool,
    /// A revisions table (`{name}_revisions`) exists.
    pub history: bool,
    /// Property collecting undeclared fields.
    pub dynamic: Option<String>,
    /// Strict document collection.
    pub document: bool,
}

/// A previously persisted description of a collection.
///
/// Snapshots are never mutated; a new version is produced by applying a
/// schema editor and re-persisting the resulting document.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    name: String,
    id: String,
    title: String,
    description: String,
    driver: String,
    primary_key: String,
    primary_key_format: PrimaryKeyFormat,
    created: Option<String>,
    updated: Option<String>,
    properties: Vec<Property>,
    uniques: Vec<Vec<String>>,
    features: FeatureFlags,
}

impl Schema {
    /// Build a snapshot from a parsed document.
    pub fn from_document(document: &SchemaDocument) -> Result<Self, Error> {
        let internal = &document.internal_properties;
        let primary_key = internal.primary.clone();
        if primary_key.is_empty() {
            return Err(Error::InvalidSchema(format!(
                "schema '{}' has no primary key",
                document.name
            )));
        }

        let primary_key_format = match document.properties.get(&primary_key) {
            Some(fragment) => match fragment.get("format").and_then(|f| f.as_str()) {
                Some(format) => PrimaryKeyFormat::parse(format).ok_or_else(|| {
                    Error::InvalidSchema(format!("unknown primary key format '{}'", format))
                })?,
                None => PrimaryKeyFormat::Id,
            },
            None => {
                return Err(Error::InvalidSchema(format!(
                    "primary key '{}' is not described in schema '{}'",
                    primary_key, document.name
                )))
            }
        };

        let implicit = |name: &str| {
            name == primary_key
                || internal.created.as_deref() == Some(name)
                || internal.updated.as_deref() == Some(name)
        };

        let mut properties = Vec::with_capacity(document.properties.len());
        for (name, fragment) in &document.properties {
            if implicit(name) {
                continue;
            }
            let required = document.required.iter().any(|r| r == name);
            properties.push(property_from_fragment(name, fragment, required)?);
        }

        let config = &document.internal_config;
        Ok(Self {
            name: document.name.clone(),
            id: document.id.clone(),
            title: document.title.clone(),
            description: document.description.clone(),
            driver: config.driver.clone(),
            primary_key,
            primary_key_format,
            created: internal.created.clone(),
            updated: internal.updated.clone(),
            properties,
            uniques: config.uniques.clone(),
            features: FeatureFlags {
                branches: config.branches,
                history: config.history,
                dynamic: config.dynamic.clone(),
                document: config.document,
            },
        })
    }

    /// Parse a snapshot from JSON text.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        if value.get("$schema").is_none() {
            return Err(Error::InvalidSchema("missing '$schema' key".into()));
        }
        let document: SchemaDocument = serde_json::from_value(value)
            .map_err(|e| Error::InvalidSchema(e.to_string()))?;
        Self::from_document(&document)
    }

    /// Load a snapshot from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Document identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Driver key.
    pub fn driver(&self) -> &str {
        &self.driver
    }

    /// Primary key column name.
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Primary key format.
    pub fn primary_key_format(&self) -> PrimaryKeyFormat {
        self.primary_key_format
    }

    /// Creation timestamp column.
    pub fn created(&self) -> Option<&str> {
        self.created.as_deref()
    }

    /// Update timestamp column.
    pub fn updated(&self) -> Option<&str> {
        self.updated.as_deref()
    }

    /// Declared properties in order.
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    /// Look up a declared property.
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name() == name)
    }

    /// Unique index groups.
    pub fn uniques(&self) -> &[Vec<String>] {
        &self.uniques
    }

    /// Feature flags.
    pub fn features(&self) -> &FeatureFlags {
        &self.features
    }

    /// Check whether a name refers to a declared property or an implicit
    /// column.
    pub fn property_exists(&self, name: &str) -> bool {
        self.primary_key == name
            || self.created.as_deref() == Some(name)
            || self.updated.as_deref() == Some(name)
            || self.property(name).is_some()
    }

    /// All physical column names: primary key, properties, then timestamps.
    pub fn column_names(&self) -> Vec<String> {
        let mut columns = Vec::with_capacity(self.properties.len() + 3);
        columns.push(self.primary_key.clone());
        columns.extend(self.properties.iter().map(|p| p.name().to_string()));
        columns.extend(self.created.clone());
        columns.extend(self.updated.clone());
        columns
    }
}
