//! Database configuration.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Default directory for persisted schema documents.
pub const DEFAULT_SCHEMA_DIR: &str = "./storage/schemes";

/// Path that opens a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

fn default_schema_dir() -> PathBuf {
    PathBuf::from(DEFAULT_SCHEMA_DIR)
}

fn default_pragmas() -> Map<String, Value> {
    let mut pragmas = Map::new();
    pragmas.insert("foreign_keys".into(), Value::Bool(true));
    pragmas
}

/// Top-level database configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Storage backend.
    pub driver: DriverConfig,
    /// Directory holding schema documents.
    #[serde(default = "default_schema_dir")]
    pub schema_dir: PathBuf,
}

impl DatabaseConfig {
    /// Create a configuration for a SQLite database file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            driver: DriverConfig::Sqlite(SqliteConfig::new(path)),
            schema_dir: default_schema_dir(),
        }
    }

    /// Parse a configuration from JSON text.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Set the schema document directory.
    pub fn with_schema_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.schema_dir = dir.into();
        self
    }

    /// Set the driver configuration.
    pub fn with_driver(mut self, driver: DriverConfig) -> Self {
        self.driver = driver;
        self
    }

    /// Check the configuration for values the backend would reject.
    pub fn validate(&self) -> Result<(), Error> {
        match &self.driver {
            DriverConfig::Sqlite(sqlite) => sqlite.validate(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::new("./storage/database.sqlite")
    }
}

/// Backend selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum DriverConfig {
    /// SQLite database.
    Sqlite(SqliteConfig),
}

/// SQLite connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// Database file, or `:memory:`.
    pub path: PathBuf,
    /// Pragmas applied in order when the connection opens. Booleans are
    /// written as `yes` / `no`.
    #[serde(default = "default_pragmas")]
    pub pragmas: Map<String, Value>,
    /// Engine version used for feature detection instead of the real one.
    #[serde(default)]
    pub compat_version: Option<String>,
}

impl SqliteConfig {
    /// Create a configuration for a database file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pragmas: default_pragmas(),
            compat_version: None,
        }
    }

    /// Create a configuration for a private in-memory database.
    pub fn in_memory() -> Self {
        Self::new(MEMORY_PATH)
    }

    /// Check if this configuration opens an in-memory database.
    pub fn is_memory(&self) -> bool {
        self.path.as_os_str() == MEMORY_PATH
    }

    /// Set a pragma, replacing an earlier value.
    pub fn with_pragma(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.pragmas.insert(name.into(), value.into());
        self
    }

    /// Pin the engine version used for feature detection.
    pub fn with_compat_version(mut self, version: impl Into<String>) -> Self {
        self.compat_version = Some(version.into());
        self
    }

    /// Render the pragma statements in order.
    pub fn pragma_statements(&self) -> Result<Vec<String>, Error> {
        self.pragmas
            .iter()
            .map(|(name, value)| {
                if !is_plain_word(name) {
                    return Err(Error::Config(format!("invalid pragma name '{}'", name)));
                }
                let value = match value {
                    Value::Bool(true) => "yes".to_string(),
                    Value::Bool(false) => "no".to_string(),
                    Value::Number(n) => n.to_string(),
                    Value::String(s) if is_plain_word(s) => s.clone(),
                    other => {
                        return Err(Error::Config(format!(
                            "invalid value {} for pragma '{}'",
                            other, name
                        )))
                    }
                };
                Ok(format!("PRAGMA {} = {};", name, value))
            })
            .collect()
    }

    /// Check pragmas and the compat version.
    pub fn validate(&self) -> Result<(), Error> {
        self.pragma_statements()?;
        if let Some(version) = &self.compat_version {
            if parse_version(version).is_none() {
                return Err(Error::Config(format!("invalid compat version '{}'", version)));
            }
        }
        Ok(())
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Migration doctor settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoctorConfig {
    /// Replay callbacks and resolve schemas without touching the backend
    /// or the schema documents.
    #[serde(default)]
    pub dry_run: bool,
    /// Skip units already recorded in the ledger.
    #[serde(default)]
    pub skip_applied: bool,
}

impl DoctorConfig {
    /// Enable or disable dry runs.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Enable or disable skipping applied units.
    pub fn with_skip_applied(mut self, skip: bool) -> Self {
        self.skip_applied = skip;
        self
    }
}

/// Parse a dotted engine version into `(major, minor, patch)`.
pub fn parse_version(version: &str) -> Option<(u32, u32, u32)> {
    let mut parts = version.trim().split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().map_or(Some(0), |p| p.parse().ok())?;
    let patch = parts.next().map_or(Some(0), |p| p.parse().ok())?;
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor, patch))
}

fn is_plain_word(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DatabaseConfig::default();
        assert_eq!(config.schema_dir, PathBuf::from(DEFAULT_SCHEMA_DIR));
        let DriverConfig::Sqlite(sqlite) = &config.driver;
        assert_eq!(sqlite.pragmas.get("foreign_keys"), Some(&Value::Bool(true)));
        assert!(sqlite.compat_version.is_none());
    }

    #[test]
    fn test_config_from_json() {
        let config = DatabaseConfig::from_json(
            r#"{
                "driver": {
                    "provider": "sqlite",
                    "path": ":memory:",
                    "pragmas": {"foreign_keys": false, "journal_mode": "WAL"},
                    "compat_version": "3.34.0"
                },
                "schema_dir": "/tmp/schemes"
            }"#,
        )
        .unwrap();

        let DriverConfig::Sqlite(sqlite) = &config.driver;
        assert!(sqlite.is_memory());
        assert_eq!(
            sqlite.pragma_statements().unwrap(),
            vec!["PRAGMA foreign_keys = no;", "PRAGMA journal_mode = WAL;"]
        );
        assert_eq!(sqlite.compat_version.as_deref(), Some("3.34.0"));
        assert_eq!(config.schema_dir, PathBuf::from("/tmp/schemes"));
    }

    #[test]
    fn test_invalid_config() {
        let err = DatabaseConfig::from_json(r#"{"driver": {"provider": "mongodb"}}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let sqlite = SqliteConfig::in_memory().with_pragma("key; DROP TABLE x", 1);
        assert!(sqlite.validate().is_err());

        let sqlite = SqliteConfig::in_memory().with_pragma("cache_size", "1; DROP TABLE x");
        assert!(sqlite.validate().is_err());

        let sqlite = SqliteConfig::in_memory().with_compat_version("three");
        assert!(matches!(sqlite.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_builder_setters() {
        let config = DatabaseConfig::new("db.sqlite").with_schema_dir("schemes").with_driver(
            DriverConfig::Sqlite(SqliteConfig::in_memory().with_pragma("cache_size", -2000)),
        );
        let DriverConfig::Sqlite(sqlite) = &config.driver;
        assert_eq!(
            sqlite.pragma_statements().unwrap(),
            vec!["PRAGMA foreign_keys = yes;", "PRAGMA cache_size = -2000;"]
        );

        let doctor = DoctorConfig::default().with_dry_run(true).with_skip_applied(true);
        assert!(doctor.dry_run && doctor.skip_applied);
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("3.45.1"), Some((3, 45, 1)));
        assert_eq!(parse_version("3.35"), Some((3, 35, 0)));
        assert_eq!(parse_version("3"), Some((3, 0, 0)));
        assert_eq!(parse_version("3.x"), None);
        assert_eq!(parse_version("1.2.3.4"), None);
    }
}
