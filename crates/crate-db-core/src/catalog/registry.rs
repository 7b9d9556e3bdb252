//! Schema registry for storing and retrieving persisted schema documents.

use super::document::SchemaDocument;
use super::schema::Schema;
use crate::error::Error;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File suffix of persisted schema documents.
const SCHEMA_SUFFIX: &str = ".schema.json";

/// Check that a collection name maps to a single file inside the schema
/// directory.
pub fn validate_name(name: &str) -> Result<(), Error> {
    if name.is_empty() || name.contains(['/', '\\', '\0']) || name.contains("..") {
        return Err(Error::InvalidSchema(format!("invalid collection name '{}'", name)));
    }
    Ok(())
}

/// Registry of persisted schema documents.
///
/// Documents live at `{dir}/{name}.schema.json`. Snapshots are loaded lazily
/// and cached by name until the document is stored again or removed.
pub struct SchemaRegistry {
    /// Directory holding schema documents.
    dir: PathBuf,
    /// Loaded snapshots.
    cache: DashMap<String, Arc<Schema>>,
}

impl SchemaRegistry {
    /// Open a registry rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            cache: DashMap::new(),
        })
    }

    /// Directory holding schema documents.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the document for a collection.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}{}", name, SCHEMA_SUFFIX))
    }

    /// Get the snapshot for a collection, loading it on first access.
    pub fn get(&self, name: &str) -> Result<Arc<Schema>, Error> {
        validate_name(name)?;
        if let Some(schema) = self.cache.get(name) {
            return Ok(Arc::clone(&schema));
        }

        let path = self.path_for(name);
        if !path.exists() {
            return Err(Error::SchemaNotFound(name.to_string()));
        }

        let schema = Arc::new(Schema::load(&path)?);
        self.cache.insert(name.to_string(), Arc::clone(&schema));
        tracing::debug!(schema = %name, path = %path.display(), "Loaded schema document");
        Ok(schema)
    }

    /// Persist a document and drop any cached snapshot for it.
    pub fn store(&self, document: &SchemaDocument) -> Result<(), Error> {
        validate_name(&document.name)?;
        let path = self.path_for(&document.name);
        let content = serde_json::to_string_pretty(document)?;
        std::fs::write(&path, content)?;
        self.invalidate(&document.name);
        tracing::debug!(schema = %document.name, path = %path.display(), "Stored schema document");
        Ok(())
    }

    /// Delete a persisted document. Missing documents are ignored.
    pub fn remove(&self, name: &str) -> Result<(), Error> {
        validate_name(name)?;
        let path = self.path_for(name);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        self.invalidate(name);
        Ok(())
    }

    /// Drop a cached snapshot.
    pub fn invalidate(&self, name: &str) {
        self.cache.remove(name);
    }

    /// Check whether a document exists for the collection.
    pub fn contains(&self, name: &str) -> bool {
        self.cache.contains_key(name) || self.path_for(name).exists()
    }

    /// List the names of all persisted documents, sorted.
    pub fn list(&self) -> Result<Vec<String>, Error> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            if let Some(name) = file_name.to_str().and_then(|n| n.strip_suffix(SCHEMA_SUFFIX)) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::document::{InternalConfig, InternalProperties, SCHEMA_DIALECT};
    use serde_json::Map;

    fn document(name: &str) -> SchemaDocument {
        let mut properties = Map::new();
        properties.insert("id".into(), SchemaDocument::primary_key_fragment("id"));
        properties.insert("title".into(), serde_json::json!({"type": "string"}));
        SchemaDocument {
            dialect: SCHEMA_DIALECT.into(),
            id: format!("custom_{}", name),
            name: name.into(),
            title: name.into(),
            description: String::new(),
            kind: "object".into(),
            internal_config: InternalConfig {
                driver: "default".into(),
                ..Default::default()
            },
            internal_properties: InternalProperties {
                primary: "id".into(),
                created: None,
                updated: None,
            },
            properties,
            required: vec![],
        }
    }

    #[test]
    fn test_store_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SchemaRegistry::open(dir.path()).unwrap();

        assert!(!registry.contains("posts"));
        assert!(matches!(registry.get("posts"), Err(Error::SchemaNotFound(_))));

        registry.store(&document("posts")).unwrap();
        assert!(registry.contains("posts"));
        assert!(registry.path_for("posts").ends_with("posts.schema.json"));

        let first = registry.get("posts").unwrap();
        let second = registry.get("posts").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.property_exists("title"));
    }

    #[test]
    fn test_store_invalidates_cache() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SchemaRegistry::open(dir.path()).unwrap();

        registry.store(&document("posts")).unwrap();
        let before = registry.get("posts").unwrap();

        let mut updated = document("posts");
        updated
            .properties
            .insert("body".into(), serde_json::json!({"type": "string"}));
        registry.store(&updated).unwrap();

        let after = registry.get("posts").unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(after.property_exists("body"));
    }

    #[test]
    fn test_remove_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SchemaRegistry::open(dir.path()).unwrap();

        registry.store(&document("users")).unwrap();
        registry.store(&document("posts")).unwrap();
        assert_eq!(registry.list().unwrap(), vec!["posts", "users"]);

        registry.remove("posts").unwrap();
        registry.remove("never-existed").unwrap();
        assert_eq!(registry.list().unwrap(), vec!["users"]);
        assert!(registry.get("posts").is_err());
    }

    #[test]
    fn test_names_stay_inside_dir() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SchemaRegistry::open(dir.path().join("schemes")).unwrap();

        for name in ["../escape", "a/b", "a\\b", ""] {
            assert!(matches!(registry.store(&document(name)), Err(Error::InvalidSchema(_))));
            assert!(matches!(registry.get(name), Err(Error::InvalidSchema(_))));
        }
        assert!(!dir.path().join("escape.schema.json").exists());
        assert!(validate_name("user_profiles").is_ok());
    }
}
