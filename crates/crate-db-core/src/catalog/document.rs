//! Canonical persisted schema document.
//!
//! A schema is stored as a JSON-Schema flavoured document carrying the
//! property fragments plus an `internalConfig` / `internalProperties` section
//! describing how the collection is laid out in the backend.

use super::property::{Property, PropertyKind};
use crate::error::Error;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON-Schema dialect written into every document.
pub const SCHEMA_DIALECT: &str = "https://json-schema.org/draft/2020-12/schema";

/// Backend-facing configuration of a collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InternalConfig {
    /// Driver key the collection is bound to.
    pub driver: String,
    /// Name of the property collecting undeclared fields, if any.
    #[serde(default)]
    pub dynamic: Option<String>,
    /// Whether branch tables exist for this collection.
    #[serde(default)]
    pub branches: bool,
    /// Whether a revisions table exists for this collection.
    #[serde(default)]
    pub history: bool,
    /// Whether the collection is a strict document.
    #[serde(default)]
    pub document: bool,
    /// Unique index groups.
    #[serde(default)]
    pub uniques: Vec<Vec<String>>,
}

/// Names of the implicit columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InternalProperties {
    /// Primary key column.
    pub primary: String,
    /// Creation timestamp column.
    #[serde(default)]
    pub created: Option<String>,
    /// Update timestamp column.
    #[serde(default)]
    pub updated: Option<String>,
}

/// The persisted schema document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDocument {
    /// JSON-Schema dialect.
    #[serde(rename = "$schema")]
    pub dialect: String,
    /// Document identifier.
    #[serde(rename = "$id")]
    pub id: String,
    /// Collection name.
    pub name: String,
    /// Display title.
    pub title: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Always `object`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Backend configuration.
    #[serde(rename = "internalConfig")]
    pub internal_config: InternalConfig,
    /// Implicit column names.
    #[serde(rename = "internalProperties")]
    pub internal_properties: InternalProperties,
    /// Property fragments, including the implicit columns.
    pub properties: Map<String, Value>,
    /// Required property names.
    #[serde(default)]
    pub required: Vec<String>,
}

impl SchemaDocument {
    /// Fragment describing the primary key column.
    pub fn primary_key_fragment(format: &str) -> Value {
        let mut fragment = Map::new();
        if format == "id" {
            fragment.insert("type".into(), Value::from("integer"));
        } else {
            fragment.insert("type".into(), Value::from("string"));
            fragment.insert("format".into(), Value::from(format));
        }
        Value::Object(fragment)
    }

    /// Fragment describing a timestamp column.
    pub fn timestamp_fragment() -> Value {
        let mut fragment = Map::new();
        fragment.insert("type".into(), Value::from("string"));
        fragment.insert("format".into(), Value::from("date-time"));
        Value::Object(fragment)
    }
}

/// Convert a property into its JSON-Schema fragment.
pub fn property_to_fragment(property: &Property) -> Value {
    let mut fragment = Map::new();
    fragment.insert("type".into(), Value::from(property.kind().as_str()));

    if let Some(format) = &property.format {
        fragment.insert("format".into(), Value::from(format.as_str()));
    }
    if let Some(description) = &property.description {
        fragment.insert("description".into(), Value::from(description.as_str()));
    }
    if let Some(default) = &property.default {
        fragment.insert("default".into(), default.clone());
    }
    if let Some(values) = &property.enumeration {
        fragment.insert("enum".into(), Value::Array(values.clone()));
    }
    if let Some(min) = property.min_length {
        fragment.insert("minLength".into(), Value::from(min));
    }
    if let Some(max) = property.max_length {
        fragment.insert("maxLength".into(), Value::from(max));
    }
    if let Some(min) = property.minimum {
        fragment.insert("minimum".into(), number(min));
    }
    if let Some(max) = property.maximum {
        fragment.insert("maximum".into(), number(max));
    }
    if let Some(unsigned) = property.unsigned {
        fragment.insert("unsigned".into(), Value::Bool(unsigned));
    }
    if property.unique {
        fragment.insert("unique".into(), Value::Bool(true));
    }

    Value::Object(fragment)
}

/// Rebuild a property from its JSON-Schema fragment.
pub fn property_from_fragment(name: &str, fragment: &Value, required: bool) -> Result<Property, Error> {
    let object = fragment
        .as_object()
        .ok_or_else(|| Error::InvalidSchema(format!("property '{}' is not an object", name)))?;

    let kind = object
        .get("type")
        .and_then(Value::as_str)
        .and_then(PropertyKind::parse)
        .ok_or_else(|| Error::InvalidSchema(format!("property '{}' has no valid type", name)))?;

    let mut property = Property::new(name, kind);
    property.required = required;
    property.unique = object.get("unique").and_then(Value::as_bool).unwrap_or(false);
    property.default = object.get("default").cloned();
    property.format = object.get("format").and_then(Value::as_str).map(String::from);
    property.description = object
        .get("description")
        .and_then(Value::as_str)
        .map(String::from);
    property.min_length = object.get("minLength").and_then(Value::as_u64);
    property.max_length = object.get("maxLength").and_then(Value::as_u64);
    property.minimum = object.get("minimum").and_then(Value::as_f64);
    property.maximum = object.get("maximum").and_then(Value::as_f64);
    property.unsigned = object.get("unsigned").and_then(Value::as_bool);
    property.enumeration = object.get("enum").and_then(Value::as_array).cloned();

    Ok(property)
}

// Whole numbers are written as integers so documents stay stable across
// reloads.
fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}
