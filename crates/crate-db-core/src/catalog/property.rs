//! Property definitions for schemas.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fixed length of a `uid` formatted value.
pub const UID_LENGTH: u64 = 26;

/// Fixed length of a `uuid` formatted value.
pub const UUID_LENGTH: u64 = 36;

/// Base data kinds supported by schema properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    /// UTF-8 string.
    String,
    /// Ordered list of values.
    Array,
    /// Nested object.
    Object,
    /// Floating point number.
    Number,
    /// Integer number.
    Integer,
    /// Boolean value.
    Boolean,
}

impl PropertyKind {
    /// JSON-Schema type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyKind::String => "string",
            PropertyKind::Array => "array",
            PropertyKind::Object => "object",
            PropertyKind::Number => "number",
            PropertyKind::Integer => "integer",
            PropertyKind::Boolean => "boolean",
        }
    }

    /// Parse a JSON-Schema type name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(PropertyKind::String),
            "array" => Some(PropertyKind::Array),
            "object" => Some(PropertyKind::Object),
            "number" => Some(PropertyKind::Number),
            "integer" => Some(PropertyKind::Integer),
            "boolean" => Some(PropertyKind::Boolean),
            _ => None,
        }
    }

    /// Check if this kind is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(self, PropertyKind::Number | PropertyKind::Integer)
    }

    /// Check if values of this kind are stored as encoded JSON.
    pub fn is_structured(&self) -> bool {
        matches!(self, PropertyKind::Array | PropertyKind::Object)
    }
}

impl std::fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed, constrained property within a schema.
///
/// The name and kind are fixed once created; only an explicit rename inside
/// a schema editor produces a property under a different name.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    name: String,
    kind: PropertyKind,
    /// Whether a value is required (NOT NULL).
    pub required: bool,
    /// Whether values must be unique across the collection.
    pub unique: bool,
    /// Default value if not provided.
    pub default: Option<Value>,
    /// Semantic format (uid, uuid, email, date-time, ...).
    pub format: Option<String>,
    /// Human readable description.
    pub description: Option<String>,
    /// Minimum string or array length.
    pub min_length: Option<u64>,
    /// Maximum string or array length.
    pub max_length: Option<u64>,
    /// Minimum numeric value.
    pub minimum: Option<f64>,
    /// Maximum numeric value.
    pub maximum: Option<f64>,
    /// Unsigned numeric value.
    pub unsigned: Option<bool>,
    /// Allowed values.
    pub enumeration: Option<Vec<Value>>,
}

impl Property {
    /// Create a new optional property.
    pub fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            unique: false,
            default: None,
            format: None,
            description: None,
            min_length: None,
            max_length: None,
            minimum: None,
            maximum: None,
            unsigned: None,
            enumeration: None,
        }
    }

    /// Property name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Property kind.
    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    /// Clone this property under a different name.
    pub(crate) fn renamed(&self, name: impl Into<String>) -> Self {
        let mut property = self.clone();
        property.name = name.into();
        property
    }

    /// Set the description.
    pub fn describe(&mut self, description: impl Into<String>) -> &mut Self {
        self.description = Some(description.into());
        self
    }

    /// Set the semantic format.
    pub fn format(&mut self, format: impl Into<String>) -> &mut Self {
        self.format = Some(format.into());
        self
    }

    /// Set the default value. Boolean properties store the truthiness of
    /// the given value.
    pub fn default(&mut self, value: impl Into<Value>) -> &mut Self {
        let value = value.into();
        self.default = Some(match self.kind {
            PropertyKind::Boolean if !value.is_null() => Value::Bool(truthy(&value)),
            _ => value,
        });
        self
    }

    /// Mark as required.
    pub fn required(&mut self) -> &mut Self {
        self.required = true;
        self
    }

    /// Mark as optional.
    pub fn optional(&mut self) -> &mut Self {
        self.required = false;
        self
    }

    /// Mark as unique.
    pub fn unique(&mut self) -> &mut Self {
        self.unique = true;
        self
    }

    /// Set an exact length.
    pub fn length(&mut self, length: u64) -> &mut Self {
        self.min_length = Some(length);
        self.max_length = Some(length);
        self
    }

    /// Set the minimum length.
    pub fn min_length(&mut self, length: u64) -> &mut Self {
        self.min_length = Some(length);
        self
    }

    /// Set the maximum length.
    pub fn max_length(&mut self, length: u64) -> &mut Self {
        self.max_length = Some(length);
        self
    }

    /// Restrict values to the given set.
    pub fn enumeration<I, V>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.enumeration = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Set the minimum value.
    pub fn min(&mut self, value: f64) -> &mut Self {
        self.minimum = Some(value);
        self
    }

    /// Set the maximum value.
    pub fn max(&mut self, value: f64) -> &mut Self {
        self.maximum = Some(value);
        self
    }

    /// Mark as unsigned.
    pub fn unsigned(&mut self) -> &mut Self {
        self.unsigned = Some(true);
        self
    }

    /// Mark as signed.
    pub fn signed(&mut self) -> &mut Self {
        self.unsigned = Some(false);
        self
    }

    /// Check if this property has a default value.
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(a) => !a.is_empty(),
        Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_property_setters() {
        let mut property = Property::new("email", PropertyKind::String);
        property.format("email").required().unique().max_length(120);

        assert_eq!(property.name(), "email");
        assert_eq!(property.kind(), PropertyKind::String);
        assert!(property.required);
        assert!(property.unique);
        assert_eq!(property.format.as_deref(), Some("email"));
        assert_eq!(property.max_length, Some(120));
        assert!(!property.has_default());

        property.optional();
        assert!(!property.required);
    }

    #[test]
    fn test_length_sets_both_bounds() {
        let mut property = Property::new("code", PropertyKind::String);
        property.length(20);
        assert_eq!(property.min_length, Some(20));
        assert_eq!(property.max_length, Some(20));
    }

    #[test]
    fn test_boolean_default_is_coerced() {
        let mut property = Property::new("active", PropertyKind::Boolean);
        property.default(1);
        assert_eq!(property.default, Some(json!(true)));

        property.default("");
        assert_eq!(property.default, Some(json!(false)));
    }

    #[test]
    fn test_renamed_keeps_constraints() {
        let mut property = Property::new("old", PropertyKind::Integer);
        property.unsigned().min(1.0);

        let renamed = property.renamed("new");
        assert_eq!(renamed.name(), "new");
        assert_eq!(renamed.kind(), PropertyKind::Integer);
        assert_eq!(renamed.unsigned, Some(true));
        assert_eq!(renamed.minimum, Some(1.0));
    }

    #[test]
    fn test_kind_names() {
        for kind in [
            PropertyKind::String,
            PropertyKind::Array,
            PropertyKind::Object,
            PropertyKind::Number,
            PropertyKind::Integer,
            PropertyKind::Boolean,
        ] {
            assert_eq!(PropertyKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(PropertyKind::parse("date"), None);
        assert!(PropertyKind::Integer.is_numeric());
        assert!(PropertyKind::Object.is_structured());
        assert!(!PropertyKind::String.is_structured());
    }
}
