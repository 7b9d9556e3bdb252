//! Exercises every property kind and every editor operation.

use crate_db_core::migration::{DeclareProperties, Migration, Migrator};

pub struct TestMigratorMethods;

impl Migration for TestMigratorMethods {
    fn title(&self) -> String {
        "Test migrator methods".to_string()
    }

    fn install(&self, migrator: &mut Migrator) {
        migrator
            .create("test", |schema| {
                schema.description = Some("Every property kind".to_string());
                schema.string("title")?.required().max_length(255);
                schema.string("summary")?.min_length(3);
                schema.string("code")?.length(8);
                schema
                    .string("status")?
                    .enumeration(["draft", "published"])
                    .default("draft");
                schema.array("tags")?;
                schema.object("meta")?;
                schema.number("score")?.min(0.0).max(100.0);
                schema.integer("position")?.unsigned().default(0);
                schema.boolean("flag_on")?.default(true);
                schema.boolean("flag_off")?.default(false);
                schema.uid("special_uid")?;
                schema.uuid("special_uuid")?;
                schema.timestamp("published")?;
                schema.time("opens")?;
                schema.date("released")?;
                schema.datetime("expires")?;
                schema.email("special_email", false)?;
                schema.email("intl_email", true)?;
                schema.ipv4("address_v4")?;
                schema.ipv6("address_v6")?;
                schema.unique_index(&["code", "status"])?;
                Ok(())
            })
            .commit()
            .update("test", |schema| {
                schema.email("custom_email", false)?.unique();
                schema.rename("special_uuid", "custom_uuid")?;
                schema.replace("special_email", "custom_email")?;
                schema.remove("flag_on")?;
                schema.remove("flag_off")?;
                Ok(())
            });
    }

    fn uninstall(&self, migrator: &mut Migrator) {
        migrator.delete("test");
    }
}
