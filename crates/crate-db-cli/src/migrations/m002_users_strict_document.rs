use crate_db_core::migration::{DeclareProperties, Migration, Migrator};

/// Users collection stored as a strict document.
pub struct UsersStrictDocument;

impl Migration for UsersStrictDocument {
    fn title(&self) -> String {
        "Users strict document".to_string()
    }

    fn install(&self, migrator: &mut Migrator) {
        migrator.create("users", |schema| {
            schema.features.document = true;
            schema.string("username")?.required().unique().max_length(64);
            schema.email("email", true)?.required().unique();
            schema.string("display_name")?;
            Ok(())
        });
    }

    fn uninstall(&self, migrator: &mut Migrator) {
        migrator.delete("users");
    }
}
