//! Core error types.

use thiserror::Error;

/// Core schema and backend errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A property name collides with an existing property, the primary key
    /// or one of the timestamp columns.
    #[error("property '{property}' already exists in schema '{schema}'")]
    DuplicateProperty {
        /// Schema the property was declared on.
        schema: String,
        /// The colliding property name.
        property: String,
    },

    /// A property name does not exist where one was required.
    #[error("property '{property}' does not exist in schema '{schema}'")]
    UnknownProperty {
        /// Schema that was looked up.
        schema: String,
        /// The missing property name.
        property: String,
    },

    /// The schema is flagged as non-storable and cannot be serialized.
    #[error("schema '{0}' does not support to be stored")]
    NotStorable(String),

    /// A backend statement failed.
    #[error("statement failed: {message} (statement: {statement})")]
    Statement {
        /// The statement (or logical operation) that was attempted.
        statement: String,
        /// The backend's native error text.
        message: String,
    },

    /// Transaction primitives were used in the wrong state.
    #[error("transaction error: {0}")]
    TransactionState(String),

    /// Referential integrity check failed after a table rebuild.
    #[error("foreign key check failed for '{table}': {}", violations.join("; "))]
    IntegrityViolation {
        /// The rebuilt table.
        table: String,
        /// One entry per violating row.
        violations: Vec<String>,
    },

    /// No persisted schema document exists for the name.
    #[error("schema '{0}' not found")]
    SchemaNotFound(String),

    /// A persisted schema document is malformed.
    #[error("invalid schema document: {0}")]
    InvalidSchema(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Build a statement error.
    pub fn statement(statement: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Statement {
            statement: statement.into(),
            message: message.into(),
        }
    }

    /// Build a duplicate property error.
    pub fn duplicate(schema: impl Into<String>, property: impl Into<String>) -> Self {
        Error::DuplicateProperty {
            schema: schema.into(),
            property: property.into(),
        }
    }

    /// Build an unknown property error.
    pub fn unknown(schema: impl Into<String>, property: impl Into<String>) -> Self {
        Error::UnknownProperty {
            schema: schema.into(),
            property: property.into(),
        }
    }

    /// Whether this error is an authoring bug in a schema definition rather
    /// than a failure reported by the backend.
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            Error::DuplicateProperty { .. }
                | Error::UnknownProperty { .. }
                | Error::NotStorable(_)
                | Error::SchemaNotFound(_)
                | Error::InvalidSchema(_)
        )
    }

    /// The backend's native error text, if this is a statement failure.
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            Error::Statement { message, .. } => Some(message),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_errors() {
        assert!(Error::duplicate("users", "email").is_definition_error());
        assert!(Error::unknown("users", "email").is_definition_error());
        assert!(Error::NotStorable("migrations".into()).is_definition_error());
        assert!(!Error::statement("DROP TABLE x", "no such table: x").is_definition_error());
        assert!(!Error::TransactionState("nested".into()).is_definition_error());
    }

    #[test]
    fn test_error_display() {
        let err = Error::statement("DROP TABLE x", "no such table: x");
        assert!(err.to_string().contains("no such table: x"));
        assert_eq!(err.backend_message(), Some("no such table: x"));

        let err = Error::IntegrityViolation {
            table: "posts".into(),
            violations: vec!["rowid 1 -> users".into(), "rowid 2 -> users".into()],
        };
        assert!(err.to_string().contains("rowid 1 -> users; rowid 2 -> users"));
    }
}
