//! Migration doctor - replays migration units against a driver.
//!
//! A unit's install routine is recorded into a [`Migrator`] first; the
//! recorded intents are then replayed inside a transaction. Schema documents
//! produced along the way are staged and only written to the registry once
//! the transaction segment that produced them commits.

use super::builder::SchemaBuilder;
use super::editor::SchemaEditor;
use super::error::MigrationError;
use super::ledger::{ledger_schema, LedgerRecord, LedgerTable, LEDGER_MIGRATION_PATH, LEDGER_MODULE, LEDGER_TABLE};
use super::migrator::{Intent, IntentKind, Migrator};
use super::state::{UnitState, UnitStatus};
use super::unit::{Migration, MigrationSet};
use crate::catalog::{Schema, SchemaDocument, SchemaRegistry};
use crate::config::DoctorConfig;
use crate::driver::{Driver, OrderDirection, Query, Row};
use crate::error::Error;
use crate::repository::Repository;
use serde_json::Value;
use std::sync::Arc;

/// Schema document changes waiting for a commit. `None` removes the document.
type Staged = Vec<(String, Option<SchemaDocument>)>;

/// Outcome of one migration unit run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Module of the unit.
    pub module: String,
    /// Path of the unit.
    pub path: String,
    /// Title of the unit.
    pub title: String,
    /// Final status.
    pub status: UnitStatus,
    /// Number of replayed intents.
    pub intents: usize,
    /// Number of commit checkpoints reached.
    pub checkpoints: usize,
    /// The unit was already applied and nothing ran.
    pub skipped: bool,
    /// Nothing reached the backend or the registry.
    pub dry_run: bool,
}

impl MigrationReport {
    fn from_state(state: &UnitState, title: String, dry_run: bool) -> Self {
        Self {
            module: state.module.clone(),
            path: state.path.clone(),
            title,
            status: state.status,
            intents: state.applied_intents,
            checkpoints: state.checkpoints,
            skipped: false,
            dry_run,
        }
    }
}

/// Executes migration units against one driver.
pub struct Doctor<D: Driver> {
    driver: D,
    registry: Arc<SchemaRegistry>,
    units: MigrationSet,
    config: DoctorConfig,
    last_error: Option<String>,
}

impl<D: Driver> Doctor<D> {
    /// Create a doctor. The ledger unit is registered under
    /// `crate/000_migrations-table`.
    pub fn new(driver: D, registry: Arc<SchemaRegistry>) -> Self {
        let mut units = MigrationSet::new();
        units.register(LEDGER_MODULE, LEDGER_MIGRATION_PATH, LedgerTable);
        Self {
            driver,
            registry,
            units,
            config: DoctorConfig::default(),
            last_error: None,
        }
    }

    /// Replace the doctor settings.
    pub fn with_config(mut self, config: DoctorConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a migration unit.
    pub fn register(
        &mut self,
        module: impl Into<String>,
        path: impl Into<String>,
        unit: impl Migration + 'static,
    ) -> &mut Self {
        self.units.register(module, path, unit);
        self
    }

    /// Registered units.
    pub fn units(&self) -> &MigrationSet {
        &self.units
    }

    /// Doctor settings.
    pub fn config(&self) -> &DoctorConfig {
        &self.config
    }

    /// The driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// The driver, mutably.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Give the driver back.
    pub fn into_driver(self) -> D {
        self.driver
    }

    /// The schema registry.
    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Failure message of the last failed run.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Install the ledger collection if it does not exist yet.
    pub fn ensure_ledger(&mut self) -> Result<Option<MigrationReport>, MigrationError> {
        if self.driver.has_table(LEDGER_TABLE)? {
            return Ok(None);
        }
        self.run_unit(LEDGER_MODULE, LEDGER_MIGRATION_PATH).map(Some)
    }

    /// Applied units in the order they were recorded.
    pub fn applied(&mut self) -> Result<Vec<LedgerRecord>, MigrationError> {
        if !self.driver.has_table(LEDGER_TABLE)? {
            return Ok(Vec::new());
        }
        let rows = self
            .driver
            .select(LEDGER_TABLE, &Query::new().order_by("id", OrderDirection::Asc))?;
        Ok(rows.iter().filter_map(LedgerRecord::from_row).collect())
    }

    /// Check whether a unit is recorded in the ledger.
    pub fn is_applied(&mut self, module: &str, path: &str) -> Result<bool, MigrationError> {
        Ok(self.applied()?.iter().any(|record| record.is(module, path)))
    }

    /// Execute one unit and record it in the ledger.
    ///
    /// The ledger collection is installed first when missing.
    pub fn execute(&mut self, module: &str, path: &str) -> Result<MigrationReport, MigrationError> {
        if !self.units.contains(module, path) {
            return Err(MigrationError::UnitNotFound {
                module: module.to_string(),
                path: path.to_string(),
            });
        }

        if self.is_applied(module, path)? {
            if self.config.skip_applied {
                tracing::info!(module = %module, path = %path, "Skipping applied migration");
                let title = self.units.get(module, path).map(|u| u.title()).unwrap_or_default();
                let mut state = UnitState::new(module, path);
                state.complete();
                let mut report = MigrationReport::from_state(&state, title, self.config.dry_run);
                report.skipped = true;
                return Ok(report);
            }
            return Err(MigrationError::AlreadyApplied {
                module: module.to_string(),
                path: path.to_string(),
            });
        }

        if !self.config.dry_run && (module, path) != (LEDGER_MODULE, LEDGER_MIGRATION_PATH) {
            self.ensure_ledger()?;
        }
        self.run_unit(module, path)
    }

    /// Execute every registered unit of a module in path order, skipping
    /// applied ones.
    pub fn run_pending(&mut self, module: &str) -> Result<Vec<MigrationReport>, MigrationError> {
        let mut reports = Vec::new();
        if !self.config.dry_run {
            reports.extend(self.ensure_ledger()?);
        }

        let applied = self.applied()?;
        let paths: Vec<String> = self.units.paths(module).into_iter().map(String::from).collect();
        for path in paths {
            if applied.iter().any(|record| record.is(module, &path)) {
                tracing::debug!(module = %module, path = %path, "Migration already applied");
                continue;
            }
            reports.push(self.execute(module, &path)?);
        }
        Ok(reports)
    }

    /// Replay a unit's uninstall routine. Ledger records are left untouched.
    pub fn uninstall(&mut self, module: &str, path: &str) -> Result<MigrationReport, MigrationError> {
        let unit = self
            .units
            .get(module, path)
            .ok_or_else(|| MigrationError::UnitNotFound {
                module: module.to_string(),
                path: path.to_string(),
            })?;

        let mut state = UnitState::new(module, path);
        let mut migrator = Migrator::new();
        state.record();
        unit.uninstall(&mut migrator);
        let title = unit.title();

        tracing::info!(module = %module, path = %path, title = %title, "Uninstalling migration");
        self.replay(&title, migrator.into_intents(), &mut state, false)?;
        Ok(MigrationReport::from_state(&state, title, self.config.dry_run))
    }

    fn run_unit(&mut self, module: &str, path: &str) -> Result<MigrationReport, MigrationError> {
        let unit = self
            .units
            .get(module, path)
            .ok_or_else(|| MigrationError::UnitNotFound {
                module: module.to_string(),
                path: path.to_string(),
            })?;

        let mut state = UnitState::new(module, path);
        let mut migrator = Migrator::new();
        state.record();
        unit.install(&mut migrator);
        let title = unit.title();

        tracing::info!(
            module = %module,
            path = %path,
            title = %title,
            intents = migrator.len(),
            dry_run = self.config.dry_run,
            "Executing migration"
        );
        self.replay(&title, migrator.into_intents(), &mut state, true)?;
        Ok(MigrationReport::from_state(&state, title, self.config.dry_run))
    }

    fn replay(
        &mut self,
        title: &str,
        intents: Vec<Intent>,
        state: &mut UnitState,
        record: bool,
    ) -> Result<(), MigrationError> {
        let transactional = !self.config.dry_run && self.driver.capabilities().transactions;
        // Rebuilding a referenced table needs enforcement off, which only
        // takes effect outside a transaction.
        let alters = intents.iter().any(|intent| intent.kind() == IntentKind::Update);
        let suspended = if transactional && alters {
            self.driver.suspend_foreign_keys()?
        } else {
            false
        };

        let result = self.replay_segments(title, intents, state, record, transactional);

        if suspended {
            if let Err(error) = self.driver.restore_foreign_keys(true) {
                tracing::error!(error = %error, "Failed to restore foreign key enforcement");
                return result.and(Err(MigrationError::Storage(error)));
            }
        }
        result
    }

    fn replay_segments(
        &mut self,
        title: &str,
        intents: Vec<Intent>,
        state: &mut UnitState,
        record: bool,
        transactional: bool,
    ) -> Result<(), MigrationError> {
        let dry_run = self.config.dry_run;
        let mut staged = Staged::new();

        state.start(intents.len());
        if transactional {
            self.driver.begin()?;
        }

        for (position, intent) in intents.into_iter().enumerate() {
            let kind = intent.kind();
            tracing::debug!(position, intent = ?intent, "Replaying intent");
            if let Err(error) = self.apply(intent, &mut staged, state, transactional) {
                let failure = if error.is_definition_error() {
                    MigrationError::Definition(error)
                } else {
                    MigrationError::UnitFailed {
                        title: title.to_string(),
                        position,
                        intent: kind,
                        message: error
                            .backend_message()
                            .map(String::from)
                            .unwrap_or_else(|| error.to_string()),
                        source: error,
                    }
                };
                return Err(self.abort(state, transactional, failure));
            }
            state.advance();
        }

        if record && !dry_run {
            if let Err(error) = self.append_ledger(&state.module, &state.path) {
                return Err(self.abort(state, transactional, MigrationError::Storage(error)));
            }
        }
        if transactional {
            if let Err(error) = self.driver.commit() {
                return Err(self.abort(state, transactional, MigrationError::Storage(error)));
            }
        }
        if !dry_run {
            self.flush(&mut staged)?;
        }

        state.complete();
        tracing::info!(module = %state.module, path = %state.path, intents = state.applied_intents, "Committed migration");
        Ok(())
    }

    fn apply(
        &mut self,
        intent: Intent,
        staged: &mut Staged,
        state: &mut UnitState,
        transactional: bool,
    ) -> Result<(), Error> {
        let dry_run = self.config.dry_run;
        match intent {
            Intent::Create { name, build } => {
                let mut builder = SchemaBuilder::new(name.as_str());
                build(&mut builder)?;
                builder.validate()?;
                let document = if builder.storage {
                    Some(builder.to_document()?)
                } else {
                    None
                };
                if !dry_run {
                    self.driver.create_schema(&builder)?;
                }
                if let Some(document) = document {
                    staged.push((name, Some(document)));
                }
            }
            Intent::Update { name, edit } => {
                let snapshot = self.snapshot(&name, staged)?;
                let mut editor = SchemaEditor::new(snapshot);
                edit(&mut editor)?;
                let document = editor.to_document()?;
                if !dry_run {
                    self.driver.alter_schema(&editor)?;
                }
                if name != LEDGER_TABLE {
                    staged.push((name, Some(document)));
                }
            }
            Intent::Delete { name } => {
                let snapshot = self.snapshot(&name, staged)?;
                if !dry_run {
                    self.driver.drop_schema(&snapshot)?;
                }
                staged.push((name, None));
            }
            Intent::Select { name, callback } => {
                if dry_run {
                    tracing::debug!(schema = %name, "Skipping data step in dry run");
                    return Ok(());
                }
                let snapshot = self.snapshot(&name, staged)?;
                let mut repository = Repository::new(&mut self.driver, snapshot);
                callback(&mut repository)?;
            }
            Intent::Commit => {
                if transactional {
                    self.driver.commit()?;
                }
                if !dry_run {
                    self.flush(staged)?;
                }
                if transactional {
                    self.driver.begin()?;
                }
                state.checkpoint();
                tracing::info!(module = %state.module, path = %state.path, checkpoint = state.checkpoints, "Reached commit checkpoint");
            }
        }
        Ok(())
    }

    /// Current snapshot of a collection, seeing staged documents first.
    fn snapshot(&self, name: &str, staged: &Staged) -> Result<Arc<Schema>, Error> {
        match staged.iter().rev().find(|(staged_name, _)| staged_name == name) {
            Some((_, Some(document))) => Ok(Arc::new(Schema::from_document(document)?)),
            Some((_, None)) => Err(Error::SchemaNotFound(name.to_string())),
            None if name == LEDGER_TABLE => Ok(Arc::new(ledger_schema()?)),
            None => self.registry.get(name),
        }
    }

    fn flush(&self, staged: &mut Staged) -> Result<(), Error> {
        for (name, document) in staged.drain(..) {
            match document {
                Some(document) => self.registry.store(&document)?,
                None => self.registry.remove(&name)?,
            }
        }
        Ok(())
    }

    fn append_ledger(&mut self, module: &str, path: &str) -> Result<(), Error> {
        if !self.driver.has_table(LEDGER_TABLE)? {
            tracing::debug!(module = %module, path = %path, "No ledger collection, not recording");
            return Ok(());
        }

        let mut row = Row::new();
        row.insert("module".into(), Value::from(module));
        row.insert("migration".into(), Value::from(path));
        self.driver.insert(LEDGER_TABLE, &[row])?;
        tracing::info!(module = %module, path = %path, "Recorded migration");
        Ok(())
    }

    fn abort(
        &mut self,
        state: &mut UnitState,
        transactional: bool,
        error: MigrationError,
    ) -> MigrationError {
        if transactional && self.driver.in_transaction() {
            if let Err(rollback) = self.driver.rollback() {
                tracing::warn!(error = %rollback, "Rollback failed");
            }
        }

        let message = error.to_string();
        state.fail(message.as_str());
        if state.partially_applied() {
            tracing::warn!(
                module = %state.module,
                path = %state.path,
                checkpoints = state.checkpoints,
                "Migration rolled back after committed checkpoints; earlier segments stay applied"
            );
        } else {
            tracing::warn!(module = %state.module, path = %state.path, error = %message, "Rolled back migration");
        }
        self.last_error = Some(message);
        error
    }
}

impl<D: Driver> std::fmt::Debug for Doctor<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Doctor")
            .field("driver", &self.driver.name())
            .field("registry", &self.registry.dir())
            .field("units", &self.units)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::SqliteDriver;
    use crate::migration::DeclareProperties;
    use serde_json::json;
    use tempfile::TempDir;

    struct CreateNotes;

    impl Migration for CreateNotes {
        fn title(&self) -> String {
            "Create notes".to_string()
        }

        fn install(&self, migrator: &mut Migrator) {
            migrator.create("notes", |schema| {
                schema.string("title")?.required();
                schema.integer("rank")?;
                Ok(())
            });
        }

        fn uninstall(&self, migrator: &mut Migrator) {
            migrator.delete("notes");
        }
    }

    struct BrokenInsert;

    impl Migration for BrokenInsert {
        fn title(&self) -> String {
            "Broken insert".to_string()
        }

        fn install(&self, migrator: &mut Migrator) {
            migrator
                .create("drafts", |schema| {
                    schema.string("title")?.required();
                    Ok(())
                })
                .select("drafts", |repo| {
                    let row = json!({"rank": 1}).as_object().cloned().unwrap_or_default();
                    repo.insert(vec![row])?;
                    Ok(())
                });
        }

        fn uninstall(&self, _migrator: &mut Migrator) {}
    }

    struct Checkpointed;

    impl Migration for Checkpointed {
        fn title(&self) -> String {
            "Checkpointed".to_string()
        }

        fn install(&self, migrator: &mut Migrator) {
            migrator
                .create("first", |schema| {
                    schema.string("name")?;
                    Ok(())
                })
                .commit()
                .create("first", |schema| {
                    schema.string("name")?;
                    Ok(())
                });
        }

        fn uninstall(&self, _migrator: &mut Migrator) {}
    }

    fn doctor(dir: &TempDir) -> Doctor<SqliteDriver> {
        let registry = Arc::new(SchemaRegistry::open(dir.path()).unwrap());
        let mut doctor = Doctor::new(SqliteDriver::open_in_memory().unwrap(), registry);
        doctor.register("app", "001_notes", CreateNotes);
        doctor.register("app", "002_broken", BrokenInsert);
        doctor.register("app", "003_checkpointed", Checkpointed);
        doctor
    }

    #[test]
    fn test_execute_records_ledger_and_document() {
        let dir = TempDir::new().unwrap();
        let mut doctor = doctor(&dir);

        let report = doctor.execute("app", "001_notes").unwrap();
        assert_eq!(report.status, UnitStatus::Committed);
        assert_eq!(report.intents, 1);
        assert_eq!(report.title, "Create notes");

        assert!(doctor.driver_mut().has_table("notes").unwrap());
        assert!(doctor.registry().contains("notes"));
        assert!(!doctor.registry().contains(LEDGER_TABLE));

        let applied = doctor.applied().unwrap();
        assert_eq!(applied.len(), 2);
        assert!(applied[0].is(LEDGER_MODULE, LEDGER_MIGRATION_PATH));
        assert!(applied[1].is("app", "001_notes"));
        assert!(applied[1].applied_at.is_some());
    }

    #[test]
    fn test_already_applied() {
        let dir = TempDir::new().unwrap();
        let mut doctor = doctor(&dir);
        doctor.execute("app", "001_notes").unwrap();

        let err = doctor.execute("app", "001_notes").unwrap_err();
        assert!(matches!(err, MigrationError::AlreadyApplied { .. }));

        let mut doctor = doctor.with_config(DoctorConfig::default().with_skip_applied(true));
        let report = doctor.execute("app", "001_notes").unwrap();
        assert!(report.skipped);
    }

    #[test]
    fn test_unknown_unit() {
        let dir = TempDir::new().unwrap();
        let mut doctor = doctor(&dir);
        let err = doctor.execute("app", "999_missing").unwrap_err();
        assert!(matches!(err, MigrationError::UnitNotFound { .. }));
    }

    #[test]
    fn test_failure_rolls_back_unit() {
        let dir = TempDir::new().unwrap();
        let mut doctor = doctor(&dir);

        let err = doctor.execute("app", "002_broken").unwrap_err();
        assert!(matches!(err, MigrationError::Definition(Error::UnknownProperty { .. })));
        assert!(doctor.last_error().unwrap().contains("rank"));

        assert!(!doctor.driver_mut().has_table("drafts").unwrap());
        assert!(!doctor.registry().contains("drafts"));
        assert!(!doctor.is_applied("app", "002_broken").unwrap());
        assert!(!doctor.driver().in_transaction());
    }

    #[test]
    fn test_checkpoint_keeps_earlier_segment() {
        let dir = TempDir::new().unwrap();
        let mut doctor = doctor(&dir);

        let err = doctor.execute("app", "003_checkpointed").unwrap_err();
        match err {
            MigrationError::UnitFailed { position, intent, ref message, .. } => {
                assert_eq!(position, 2);
                assert_eq!(intent, IntentKind::Create);
                assert!(message.contains("already exists"));
            }
            other => panic!("unexpected error {:?}", other),
        }

        assert!(doctor.driver_mut().has_table("first").unwrap());
        assert!(doctor.registry().contains("first"));
        assert!(!doctor.is_applied("app", "003_checkpointed").unwrap());
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let mut doctor = doctor(&dir).with_config(DoctorConfig::default().with_dry_run(true));

        let report = doctor.execute("app", "001_notes").unwrap();
        assert!(report.dry_run);
        assert_eq!(report.status, UnitStatus::Committed);
        assert!(!doctor.driver_mut().has_table("notes").unwrap());
        assert!(!doctor.driver_mut().has_table(LEDGER_TABLE).unwrap());
        assert!(!doctor.registry().contains("notes"));
    }

    #[test]
    fn test_run_pending_and_uninstall() {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(SchemaRegistry::open(dir.path()).unwrap());
        let mut doctor = Doctor::new(SqliteDriver::open_in_memory().unwrap(), registry);
        doctor.register("app", "001_notes", CreateNotes);

        let reports = doctor.run_pending("app").unwrap();
        assert_eq!(reports.len(), 2);
        assert!(doctor.run_pending("app").unwrap().is_empty());

        let report = doctor.uninstall("app", "001_notes").unwrap();
        assert_eq!(report.status, UnitStatus::Committed);
        assert!(!doctor.driver_mut().has_table("notes").unwrap());
        assert!(!doctor.registry().contains("notes"));
        assert!(doctor.is_applied("app", "001_notes").unwrap());
    }
}
