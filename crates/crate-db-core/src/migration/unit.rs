//! Migration units and their registry.

use super::migrator::Migrator;
use std::collections::BTreeMap;

/// A migration unit.
///
/// Units are pure descriptions: `install` and `uninstall` only record
/// intents on the given migrator.
pub trait Migration {
    /// Human readable title.
    fn title(&self) -> String;

    /// Record the intents that apply this unit.
    fn install(&self, migrator: &mut Migrator);

    /// Record the intents that revert this unit.
    fn uninstall(&self, migrator: &mut Migrator);
}

/// Registered migration units keyed by module and path.
///
/// Paths sort lexicographically, so the usual `001_`, `002_` prefixes
/// define the execution order within a module.
#[derive(Default)]
pub struct MigrationSet {
    units: BTreeMap<(String, String), Box<dyn Migration>>,
}

impl MigrationSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit, replacing any unit at the same location.
    pub fn register(
        &mut self,
        module: impl Into<String>,
        path: impl Into<String>,
        unit: impl Migration + 'static,
    ) -> &mut Self {
        self.units.insert((module.into(), path.into()), Box::new(unit));
        self
    }

    /// Look up a unit.
    pub fn get(&self, module: &str, path: &str) -> Option<&dyn Migration> {
        self.units
            .get(&(module.to_string(), path.to_string()))
            .map(Box::as_ref)
    }

    /// Check if a unit is registered.
    pub fn contains(&self, module: &str, path: &str) -> bool {
        self.get(module, path).is_some()
    }

    /// Paths registered for a module, in execution order.
    pub fn paths(&self, module: &str) -> Vec<&str> {
        self.units
            .keys()
            .filter(|(m, _)| m == module)
            .map(|(_, path)| path.as_str())
            .collect()
    }

    /// Registered module names.
    pub fn modules(&self) -> Vec<&str> {
        let mut modules: Vec<&str> = self.units.keys().map(|(m, _)| m.as_str()).collect();
        modules.dedup();
        modules
    }

    /// Number of registered units.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Check if no unit is registered.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl std::fmt::Debug for MigrationSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.units.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop(&'static str);

    impl Migration for Noop {
        fn title(&self) -> String {
            self.0.to_string()
        }

        fn install(&self, migrator: &mut Migrator) {
            migrator.commit();
        }

        fn uninstall(&self, _migrator: &mut Migrator) {}
    }

    #[test]
    fn test_paths_are_ordered() {
        let mut set = MigrationSet::new();
        set.register("app", "002_second", Noop("second"))
            .register("app", "001_first", Noop("first"))
            .register("crate", "000_migrations-table", Noop("ledger"));

        assert_eq!(set.len(), 3);
        assert_eq!(set.paths("app"), vec!["001_first", "002_second"]);
        assert_eq!(set.modules(), vec!["app", "crate"]);
        assert!(set.paths("missing").is_empty());
    }

    #[test]
    fn test_get_unit() {
        let mut set = MigrationSet::new();
        set.register("app", "001_first", Noop("first"));

        let unit = set.get("app", "001_first").unwrap();
        assert_eq!(unit.title(), "first");

        let mut migrator = Migrator::new();
        unit.install(&mut migrator);
        assert_eq!(migrator.len(), 1);

        assert!(set.get("app", "002_second").is_none());
        assert!(!set.contains("other", "001_first"));
    }
}
