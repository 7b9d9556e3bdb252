//! Migration-specific error types.

use super::migrator::IntentKind;
use crate::error::Error;
use thiserror::Error;

/// Migration-specific errors.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// No unit is registered at the given location.
    #[error("migration '{path}' of module '{module}' not found")]
    UnitNotFound {
        /// Module name.
        module: String,
        /// Unit path.
        path: String,
    },

    /// A unit failed while its intents were replayed.
    #[error("migration '{title}' failed at intent {position} ({intent}): {message}")]
    UnitFailed {
        /// Title of the failed unit.
        title: String,
        /// Zero-based position of the failing intent in the ledger.
        position: usize,
        /// Kind of the failing intent.
        intent: IntentKind,
        /// The backend's last error text, or the failure itself.
        message: String,
        /// The underlying error.
        #[source]
        source: Error,
    },

    /// A schema definition is invalid.
    #[error("invalid schema definition: {0}")]
    Definition(#[source] Error),

    /// Ledger or registry access failed outside of a unit's intents.
    #[error("storage error: {0}")]
    Storage(#[from] Error),

    /// The unit is already recorded in the ledger.
    #[error("migration '{path}' of module '{module}' is already applied")]
    AlreadyApplied {
        /// Module name.
        module: String,
        /// Unit path.
        path: String,
    },
}

impl MigrationError {
    /// The underlying core error, if any.
    pub fn core_error(&self) -> Option<&Error> {
        match self {
            MigrationError::UnitFailed { source, .. } => Some(source),
            MigrationError::Definition(e) | MigrationError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_failed_display() {
        let err = MigrationError::UnitFailed {
            title: "Install Users".into(),
            position: 2,
            intent: IntentKind::Update,
            message: "no such column: email".into(),
            source: Error::statement("ALTER TABLE", "no such column: email"),
        };
        let text = err.to_string();
        assert!(text.contains("Install Users"));
        assert!(text.contains("intent 2 (update)"));
        assert!(text.contains("no such column: email"));
        assert!(matches!(err.core_error(), Some(Error::Statement { .. })));
    }

    #[test]
    fn test_storage_from_core_error() {
        let err: MigrationError = Error::SchemaNotFound("users".into()).into();
        assert!(matches!(err, MigrationError::Storage(Error::SchemaNotFound(_))));
    }
}
