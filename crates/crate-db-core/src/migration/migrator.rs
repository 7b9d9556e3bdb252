//! Migrator - the ordered intent ledger of a migration unit.
//!
//! A migration unit's install routine records what it wants to happen. The
//! migrator never touches a backend; the doctor replays the recorded intents.

use super::builder::SchemaBuilder;
use super::editor::SchemaEditor;
use crate::error::Error;
use crate::repository::Repository;
use std::fmt;

/// Callback configuring a new schema.
pub type BuildFn = Box<dyn FnOnce(&mut SchemaBuilder) -> Result<(), Error>>;

/// Callback recording changes against an existing schema.
pub type EditFn = Box<dyn FnOnce(&mut SchemaEditor) -> Result<(), Error>>;

/// Callback working on the rows of a collection.
pub type SelectFn = Box<dyn FnOnce(&mut Repository<'_>) -> Result<(), Error>>;

/// Kind of a recorded intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentKind {
    /// Create a collection.
    Create,
    /// Alter a collection.
    Update,
    /// Drop a collection.
    Delete,
    /// Data step against a collection.
    Select,
    /// Transaction checkpoint.
    Commit,
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntentKind::Create => write!(f, "create"),
            IntentKind::Update => write!(f, "update"),
            IntentKind::Delete => write!(f, "delete"),
            IntentKind::Select => write!(f, "select"),
            IntentKind::Commit => write!(f, "commit"),
        }
    }
}

/// A recorded high-level intent.
pub enum Intent {
    /// Create a collection from a builder callback.
    Create {
        /// Collection name.
        name: String,
        /// Builder callback.
        build: BuildFn,
    },
    /// Alter a collection from an editor callback.
    Update {
        /// Collection name.
        name: String,
        /// Editor callback.
        edit: EditFn,
    },
    /// Drop a collection.
    Delete {
        /// Collection name.
        name: String,
    },
    /// Run a repository callback against a collection.
    Select {
        /// Collection name.
        name: String,
        /// Repository callback.
        callback: SelectFn,
    },
    /// Commit the current transaction segment and open a new one.
    Commit,
}

impl Intent {
    /// Kind of this intent.
    pub fn kind(&self) -> IntentKind {
        match self {
            Intent::Create { .. } => IntentKind::Create,
            Intent::Update { .. } => IntentKind::Update,
            Intent::Delete { .. } => IntentKind::Delete,
            Intent::Select { .. } => IntentKind::Select,
            Intent::Commit => IntentKind::Commit,
        }
    }

    /// Collection the intent targets, if any.
    pub fn target(&self) -> Option<&str> {
        match self {
            Intent::Create { name, .. }
            | Intent::Update { name, .. }
            | Intent::Delete { name }
            | Intent::Select { name, .. } => Some(name.as_str()),
            Intent::Commit => None,
        }
    }
}

impl fmt::Debug for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target() {
            Some(target) => write!(f, "{}({})", self.kind(), target),
            None => write!(f, "{}", self.kind()),
        }
    }
}

/// Append-only ledger of intents.
#[derive(Debug, Default)]
pub struct Migrator {
    intents: Vec<Intent>,
}

impl Migrator {
    /// Create an empty migrator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the creation of a collection.
    pub fn create<F>(&mut self, name: impl Into<String>, build: F) -> &mut Self
    where
        F: FnOnce(&mut SchemaBuilder) -> Result<(), Error> + 'static,
    {
        self.intents.push(Intent::Create {
            name: name.into(),
            build: Box::new(build),
        });
        self
    }

    /// Record changes to an existing collection.
    pub fn update<F>(&mut self, name: impl Into<String>, edit: F) -> &mut Self
    where
        F: FnOnce(&mut SchemaEditor) -> Result<(), Error> + 'static,
    {
        self.intents.push(Intent::Update {
            name: name.into(),
            edit: Box::new(edit),
        });
        self
    }

    /// Record dropping a collection.
    pub fn delete(&mut self, name: impl Into<String>) -> &mut Self {
        self.intents.push(Intent::Delete { name: name.into() });
        self
    }

    /// Record a data step against a collection.
    pub fn select<F>(&mut self, name: impl Into<String>, callback: F) -> &mut Self
    where
        F: FnOnce(&mut Repository<'_>) -> Result<(), Error> + 'static,
    {
        self.intents.push(Intent::Select {
            name: name.into(),
            callback: Box::new(callback),
        });
        self
    }

    /// Record a transaction checkpoint.
    ///
    /// Everything recorded before a checkpoint is committed when it is
    /// reached; a later failure only rolls back the segment after it.
    pub fn commit(&mut self) -> &mut Self {
        self.intents.push(Intent::Commit);
        self
    }

    /// Recorded intents in order.
    pub fn intents(&self) -> &[Intent] {
        &self.intents
    }

    /// Number of recorded intents.
    pub fn len(&self) -> usize {
        self.intents.len()
    }

    /// Check if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    /// Consume the ledger.
    pub fn into_intents(self) -> Vec<Intent> {
        self.intents
    }
}
