use crate_db_core::migration::{DeclareProperties, Migration, Migrator};
use serde_json::json;

/// Key/value singletons; undeclared fields land in `document`.
pub struct SingletonsDynamicDocument;

impl Migration for SingletonsDynamicDocument {
    fn title(&self) -> String {
        "Singletons dynamic document".to_string()
    }

    fn install(&self, migrator: &mut Migrator) {
        migrator
            .create("singletons", |schema| {
                schema.string("key")?.required().unique();
                schema.object("document")?;
                schema.features.dynamic = Some("document".to_string());
                Ok(())
            })
            .commit()
            .select("singletons", |repository| {
                let row = json!({ "key": "demo", "someColumn": "value" });
                if let Some(row) = row.as_object() {
                    repository.insert(vec![row.clone()])?;
                }
                Ok(())
            });
    }

    fn uninstall(&self, migrator: &mut Migrator) {
        migrator.delete("singletons");
    }
}
