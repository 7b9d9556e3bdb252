//! Schema builder for new collections.

use crate::catalog::{
    property_to_fragment, validate_name, FeatureFlags, InternalConfig, InternalProperties, PrimaryKeyFormat,
    Property, PropertyKind, SchemaDocument, SCHEMA_DIALECT, UID_LENGTH, UUID_LENGTH,
};
use crate::error::Error;
use serde_json::Map;

/// Default driver key for new collections.
pub const DEFAULT_DRIVER: &str = "default";

/// Default primary key column name.
pub const DEFAULT_PRIMARY_KEY: &str = "uuid";

/// Default creation timestamp column.
pub const DEFAULT_CREATED: &str = "created_at";

/// Default update timestamp column.
pub const DEFAULT_UPDATED: &str = "updated_at";

/// Property declaration shared by the schema builder and editor.
///
/// Every constructor refuses names that collide with an existing property,
/// the primary key or a timestamp column.
pub trait DeclareProperties {
    /// Name of the schema being declared.
    fn schema_name(&self) -> &str;

    /// Check whether a name is already taken.
    fn property_exists(&self, name: &str) -> bool;

    /// Store a freshly declared property and return it for further setup.
    #[doc(hidden)]
    fn insert_property(&mut self, property: Property) -> &mut Property;

    /// Declare a property of the given kind.
    fn property(&mut self, kind: PropertyKind, name: &str) -> Result<&mut Property, Error> {
        if self.property_exists(name) {
            return Err(Error::duplicate(self.schema_name(), name));
        }
        Ok(self.insert_property(Property::new(name, kind)))
    }

    /// Declare a string property.
    fn string(&mut self, name: &str) -> Result<&mut Property, Error> {
        self.property(PropertyKind::String, name)
    }

    /// Declare an array property.
    fn array(&mut self, name: &str) -> Result<&mut Property, Error> {
        self.property(PropertyKind::Array, name)
    }

    /// Declare an object property.
    fn object(&mut self, name: &str) -> Result<&mut Property, Error> {
        self.property(PropertyKind::Object, name)
    }

    /// Declare a number property.
    fn number(&mut self, name: &str) -> Result<&mut Property, Error> {
        self.property(PropertyKind::Number, name)
    }

    /// Declare an integer property.
    fn integer(&mut self, name: &str) -> Result<&mut Property, Error> {
        self.property(PropertyKind::Integer, name)
    }

    /// Declare a boolean property.
    fn boolean(&mut self, name: &str) -> Result<&mut Property, Error> {
        self.property(PropertyKind::Boolean, name)
    }

    /// Declare a unique fixed-length `uid` string.
    fn uid(&mut self, name: &str) -> Result<&mut Property, Error> {
        let property = self.string(name)?;
        property.format("uid").length(UID_LENGTH).unique();
        Ok(property)
    }

    /// Declare a unique `uuid` string.
    fn uuid(&mut self, name: &str) -> Result<&mut Property, Error> {
        let property = self.string(name)?;
        property.format("uuid").length(UUID_LENGTH).unique();
        Ok(property)
    }

    /// Declare an unsigned integer unix timestamp.
    fn timestamp(&mut self, name: &str) -> Result<&mut Property, Error> {
        let property = self.integer(name)?;
        property.format("timestamp").unsigned();
        Ok(property)
    }

    /// Declare a time string.
    fn time(&mut self, name: &str) -> Result<&mut Property, Error> {
        let property = self.string(name)?;
        property.format("time");
        Ok(property)
    }

    /// Declare a date string.
    fn date(&mut self, name: &str) -> Result<&mut Property, Error> {
        let property = self.string(name)?;
        property.format("date");
        Ok(property)
    }

    /// Declare a date-time string.
    fn datetime(&mut self, name: &str) -> Result<&mut Property, Error> {
        let property = self.string(name)?;
        property.format("date-time");
        Ok(property)
    }

    /// Declare an email string. `rfc6531` allows internationalized addresses.
    fn email(&mut self, name: &str, rfc6531: bool) -> Result<&mut Property, Error> {
        let property = self.string(name)?;
        property.format(if rfc6531 { "idn-email" } else { "email" });
        Ok(property)
    }

    /// Declare an IPv4 address string.
    fn ipv4(&mut self, name: &str) -> Result<&mut Property, Error> {
        let property = self.string(name)?;
        property.format("ipv4");
        Ok(property)
    }

    /// Declare an IPv6 address string.
    fn ipv6(&mut self, name: &str) -> Result<&mut Property, Error> {
        let property = self.string(name)?;
        property.format("ipv6");
        Ok(property)
    }
}

/// Mutable definition of a new collection.
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    /// Collection name.
    pub name: String,
    /// Whether the schema document is persisted.
    pub storage: bool,
    /// Driver key.
    pub driver: String,
    /// Document identifier, defaults to `custom_{name}`.
    pub id: Option<String>,
    /// Display title, defaults to the name.
    pub title: Option<String>,
    /// Description.
    pub description: Option<String>,
    /// Primary key column name.
    pub primary_key: String,
    /// Primary key format.
    pub primary_key_format: PrimaryKeyFormat,
    /// Creation timestamp column.
    pub created: Option<String>,
    /// Update timestamp column.
    pub updated: Option<String>,
    /// Optional collection features.
    pub features: FeatureFlags,
    properties: Vec<Property>,
    uniques: Vec<Vec<String>>,
}

impl SchemaBuilder {
    /// Create a builder with the default conventions.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            storage: true,
            driver: DEFAULT_DRIVER.to_string(),
            id: None,
            title: None,
            description: None,
            primary_key: DEFAULT_PRIMARY_KEY.to_string(),
            primary_key_format: PrimaryKeyFormat::Uuid,
            created: Some(DEFAULT_CREATED.to_string()),
            updated: Some(DEFAULT_UPDATED.to_string()),
            features: FeatureFlags::default(),
            properties: Vec::new(),
            uniques: Vec::new(),
        }
    }

    /// Assemble a builder from resolved parts.
    pub(crate) fn from_parts(
        mut template: SchemaBuilder,
        properties: Vec<Property>,
        uniques: Vec<Vec<String>>,
    ) -> Self {
        template.properties = properties;
        template.uniques = uniques;
        template
    }

    /// Set the primary key column and format.
    pub fn primary_key(&mut self, name: impl Into<String>, format: PrimaryKeyFormat) -> &mut Self {
        self.primary_key = name.into();
        self.primary_key_format = format;
        self
    }

    /// Set or clear the creation timestamp column.
    pub fn created(&mut self, name: Option<&str>) -> &mut Self {
        self.created = name.map(String::from);
        self
    }

    /// Set or clear the update timestamp column.
    pub fn updated(&mut self, name: Option<&str>) -> &mut Self {
        self.updated = name.map(String::from);
        self
    }

    /// Declared properties in order.
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    /// Look up a declared property.
    pub fn get_property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name() == name)
    }

    /// Unique index groups.
    pub fn uniques(&self) -> &[Vec<String>] {
        &self.uniques
    }

    /// Declare a unique index over declared properties.
    pub fn unique_index(&mut self, names: &[&str]) -> Result<&mut Self, Error> {
        for name in names {
            if self.get_property(name).is_none() {
                return Err(Error::unknown(&self.name, *name));
            }
        }
        self.uniques
            .push(names.iter().map(|n| n.to_string()).collect());
        Ok(self)
    }

    /// Check the structural invariants: the name is usable as a document
    /// file name, implicit columns never appear among properties and every
    /// unique index refers to declared properties.
    pub fn validate(&self) -> Result<(), Error> {
        validate_name(&self.name)?;
        let implicit = std::iter::once(self.primary_key.as_str())
            .chain(self.created.as_deref())
            .chain(self.updated.as_deref());
        for name in implicit {
            if self.get_property(name).is_some() {
                return Err(Error::duplicate(&self.name, name));
            }
        }
        if self.created.is_some() && self.created == self.updated {
            return Err(Error::duplicate(&self.name, self.created.as_deref().unwrap_or_default()));
        }
        for group in &self.uniques {
            for name in group {
                if self.get_property(name).is_none() {
                    return Err(Error::unknown(&self.name, name));
                }
            }
        }
        Ok(())
    }

    /// Physical column names: primary key, properties, then timestamps.
    pub fn column_names(&self) -> Vec<String> {
        let mut columns = Vec::with_capacity(self.properties.len() + 3);
        columns.push(self.primary_key.clone());
        columns.extend(self.properties.iter().map(|p| p.name().to_string()));
        columns.extend(self.created.clone());
        columns.extend(self.updated.clone());
        columns
    }

    /// Produce the canonical schema document.
    pub fn to_document(&self) -> Result<SchemaDocument, Error> {
        if !self.storage {
            return Err(Error::NotStorable(self.name.clone()));
        }
        self.validate()?;

        let mut properties = Map::new();
        let mut required = Vec::new();

        properties.insert(
            self.primary_key.clone(),
            SchemaDocument::primary_key_fragment(self.primary_key_format.as_str()),
        );
        for property in &self.properties {
            if property.required {
                required.push(property.name().to_string());
            }
            properties.insert(property.name().to_string(), property_to_fragment(property));
        }
        if let Some(created) = &self.created {
            properties.insert(created.clone(), SchemaDocument::timestamp_fragment());
        }
        if let Some(updated) = &self.updated {
            properties.insert(updated.clone(), SchemaDocument::timestamp_fragment());
        }

        Ok(SchemaDocument {
            dialect: SCHEMA_DIALECT.to_string(),
            id: self
                .id
                .clone()
                .unwrap_or_else(|| format!("custom_{}", self.name)),
            name: self.name.clone(),
            title: self.title.clone().unwrap_or_else(|| self.name.clone()),
            description: self.description.clone().unwrap_or_default(),
            kind: "object".to_string(),
            internal_config: InternalConfig {
                driver: self.driver.clone(),
                dynamic: self.features.dynamic.clone(),
                branches: self.features.branches,
                history: self.features.history,
                document: self.features.document,
                uniques: self.uniques.clone(),
            },
            internal_properties: InternalProperties {
                primary: self.primary_key.clone(),
                created: self.created.clone(),
                updated: self.updated.clone(),
            },
            properties,
            required,
        })
    }

    /// Serialize the canonical schema document to JSON.
    pub fn to_json(&self, pretty: bool) -> Result<String, Error> {
        let document = self.to_document()?;
        let json = if pretty {
            serde_json::to_string_pretty(&document)?
        } else {
            serde_json::to_string(&document)?
        };
        Ok(json)
    }
}

impl DeclareProperties for SchemaBuilder {
    fn schema_name(&self) -> &str {
        &self.name
    }

    fn property_exists(&self, name: &str) -> bool {
        self.primary_key == name
            || self.created.as_deref() == Some(name)
            || self.updated.as_deref() == Some(name)
            || self.get_property(name).is_some()
    }

    fn insert_property(&mut self, property: Property) -> &mut Property {
        self.properties.push(property);
        let last = self.properties.len() - 1;
        &mut self.properties[last]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Schema;
    use serde_json::json;

    #[test]
    fn test_builder_defaults() {
        let builder = SchemaBuilder::new("articles");
        assert_eq!(builder.primary_key, "uuid");
        assert_eq!(builder.primary_key_format, PrimaryKeyFormat::Uuid);
        assert_eq!(builder.created.as_deref(), Some("created_at"));
        assert_eq!(builder.updated.as_deref(), Some("updated_at"));
        assert_eq!(builder.driver, "default");
        assert!(builder.storage);
    }

    #[test]
    fn test_property_exists_after_declaration() {
        let mut builder = SchemaBuilder::new("articles");
        builder.string("title").unwrap().required();

        assert!(builder.property_exists("title"));
        assert!(builder.property_exists("uuid"));
        assert!(builder.property_exists("created_at"));
        assert!(!builder.property_exists("body"));

        let err = builder.string("title").unwrap_err();
        assert!(matches!(err, Error::DuplicateProperty { .. }));
        let err = builder.integer("updated_at").unwrap_err();
        assert!(matches!(err, Error::DuplicateProperty { .. }));
        let err = builder.uuid("uuid").unwrap_err();
        assert!(matches!(err, Error::DuplicateProperty { .. }));
    }

    #[test]
    fn test_convenience_constructors() {
        let mut builder = SchemaBuilder::new("accounts");
        builder.uid("public_id").unwrap();
        builder.uuid("external_id").unwrap();
        builder.timestamp("seen").unwrap();
        builder.email("email", true).unwrap();
        builder.ipv6("last_ip").unwrap();

        let uid = builder.get_property("public_id").unwrap();
        assert_eq!(uid.format.as_deref(), Some("uid"));
        assert_eq!(uid.max_length, Some(UID_LENGTH));
        assert!(uid.unique);

        let uuid = builder.get_property("external_id").unwrap();
        assert_eq!(uuid.min_length, Some(36));
        assert!(uuid.unique);

        let seen = builder.get_property("seen").unwrap();
        assert_eq!(seen.kind(), PropertyKind::Integer);
        assert_eq!(seen.unsigned, Some(true));

        let email = builder.get_property("email").unwrap();
        assert_eq!(email.format.as_deref(), Some("idn-email"));
    }

    #[test]
    fn test_unique_index_requires_declared_properties() {
        let mut builder = SchemaBuilder::new("accounts");
        builder.string("first").unwrap();
        builder.string("last").unwrap();

        builder.unique_index(&["first", "last"]).unwrap();
        assert_eq!(builder.uniques().len(), 1);

        let err = builder.unique_index(&["first", "middle"]).unwrap_err();
        assert!(matches!(err, Error::UnknownProperty { .. }));
        assert_eq!(builder.uniques().len(), 1);
    }

    #[test]
    fn test_not_storable() {
        let mut builder = SchemaBuilder::new("migrations");
        builder.storage = false;
        assert!(matches!(builder.to_document(), Err(Error::NotStorable(_))));
        assert!(matches!(builder.to_json(false), Err(Error::NotStorable(_))));
    }

    #[test]
    fn test_validate_rejects_moved_primary_key() {
        let mut builder = SchemaBuilder::new("accounts");
        builder.string("code").unwrap();
        builder.primary_key("code", PrimaryKeyFormat::Uid);
        assert!(matches!(builder.validate(), Err(Error::DuplicateProperty { .. })));
    }

    #[test]
    fn test_validate_rejects_path_like_names() {
        assert!(matches!(SchemaBuilder::new("../users").validate(), Err(Error::InvalidSchema(_))));
        assert!(matches!(SchemaBuilder::new("a/b").validate(), Err(Error::InvalidSchema(_))));
        assert!(SchemaBuilder::new("user_profiles").validate().is_ok());
    }

    #[test]
    fn test_canonical_document() {
        let mut builder = SchemaBuilder::new("accounts");
        builder.primary_key("id", PrimaryKeyFormat::Id).updated(None);
        builder.string("name").unwrap().required().max_length(64);
        builder.boolean("active").unwrap().default("yes");

        let document = serde_json::to_value(builder.to_document().unwrap()).unwrap();
        assert_eq!(document["$id"], json!("custom_accounts"));
        assert_eq!(document["title"], json!("accounts"));
        assert_eq!(document["description"], json!(""));
        assert_eq!(document["type"], json!("object"));
        assert_eq!(document["internalProperties"]["primary"], json!("id"));
        assert_eq!(document["internalProperties"]["updated"], serde_json::Value::Null);
        assert_eq!(document["properties"]["id"], json!({"type": "integer"}));
        assert_eq!(
            document["properties"]["created_at"],
            json!({"type": "string", "format": "date-time"})
        );
        assert_eq!(document["properties"]["active"]["default"], json!(true));
        assert_eq!(document["required"], json!(["name"]));

        let keys: Vec<_> = document["properties"]
            .as_object()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        assert_eq!(keys, vec!["id", "name", "active", "created_at"]);
    }

    #[test]
    fn test_document_round_trip_to_snapshot() {
        let mut builder = SchemaBuilder::new("accounts");
        builder.uuid("token").unwrap();
        builder.number("balance").unwrap().min(0.0).default(0);
        builder.array("tags").unwrap().default(json!(["new"]));
        builder.unique_index(&["token", "balance"]).unwrap();

        let schema = Schema::from_json(&builder.to_json(true).unwrap()).unwrap();
        assert_eq!(schema.properties(), builder.properties());
        assert_eq!(schema.uniques(), builder.uniques());
        assert_eq!(schema.primary_key(), "uuid");
        assert_eq!(schema.primary_key_format(), PrimaryKeyFormat::Uuid);
        assert_eq!(schema.column_names(), builder.column_names());
    }
}
