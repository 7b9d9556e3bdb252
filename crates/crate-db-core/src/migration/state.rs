//! Execution state of a migration unit.
//!
//! A unit moves through `Loaded -> Recording -> Executing` and ends either
//! `Committed` or `RolledBack`.

use chrono::{DateTime, Utc};

/// Lifecycle status of a migration unit run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStatus {
    /// Unit looked up, nothing recorded yet.
    Loaded,
    /// Install routine is populating the migrator.
    Recording,
    /// Intents are being replayed against the backend.
    Executing,
    /// All intents applied and the final segment committed.
    Committed,
    /// A step failed and the active segment was rolled back.
    RolledBack,
}

impl UnitStatus {
    /// Check if the run has finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, UnitStatus::Committed | UnitStatus::RolledBack)
    }
}

impl std::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitStatus::Loaded => write!(f, "loaded"),
            UnitStatus::Recording => write!(f, "recording"),
            UnitStatus::Executing => write!(f, "executing"),
            UnitStatus::Committed => write!(f, "committed"),
            UnitStatus::RolledBack => write!(f, "rolled_back"),
        }
    }
}

/// Progress of one migration unit run.
#[derive(Debug, Clone)]
pub struct UnitState {
    /// Module of the unit.
    pub module: String,
    /// Path of the unit.
    pub path: String,
    /// Current status.
    pub status: UnitStatus,
    /// Number of recorded intents.
    pub total_intents: usize,
    /// Number of intents applied so far.
    pub applied_intents: usize,
    /// Number of commit checkpoints reached.
    pub checkpoints: usize,
    /// When execution started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the run finished.
    pub completed_at: Option<DateTime<Utc>>,
    /// Failure message.
    pub error: Option<String>,
}

impl UnitState {
    /// Create the state of a freshly loaded unit.
    pub fn new(module: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            path: path.into(),
            status: UnitStatus::Loaded,
            total_intents: 0,
            applied_intents: 0,
            checkpoints: 0,
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    /// Enter the recording phase.
    pub fn record(&mut self) {
        self.status = UnitStatus::Recording;
    }

    /// Enter the execution phase with the number of recorded intents.
    pub fn start(&mut self, total_intents: usize) {
        self.status = UnitStatus::Executing;
        self.total_intents = total_intents;
        self.started_at = Some(Utc::now());
    }

    /// Count one applied intent.
    pub fn advance(&mut self) {
        self.applied_intents += 1;
    }

    /// Count a reached commit checkpoint.
    pub fn checkpoint(&mut self) {
        self.checkpoints += 1;
    }

    /// Mark the run as committed.
    pub fn complete(&mut self) {
        self.status = UnitStatus::Committed;
        self.completed_at = Some(Utc::now());
    }

    /// Mark the run as rolled back.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = UnitStatus::RolledBack;
        self.completed_at = Some(Utc::now());
        self.error = Some(error.into());
    }

    /// Whether some checkpoint committed work before a failure.
    pub fn partially_applied(&self) -> bool {
        self.status == UnitStatus::RolledBack && self.checkpoints > 0
    }
}
