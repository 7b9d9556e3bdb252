//! Table rebuild for changes SQLite cannot apply in place.

use super::value::quote_ident;
use super::{ddl, SqliteDriver};
use crate::error::Error;
use crate::migration::SchemaEditor;
use rusqlite::types::Value as SqlValue;
use serde_json::Value;
use std::collections::HashMap;

impl SqliteDriver {
    /// Recreate the edited table with its resulting definition and copy every
    /// row over.
    ///
    /// Final columns are copied from the column of the same name unless
    /// `sources` maps them to another expression. The primary key and both
    /// timestamps are carried over.
    pub(super) fn rebuild_table(
        &mut self,
        editor: &SchemaEditor,
        sources: &HashMap<String, String>,
        foreign_keys: bool,
    ) -> Result<(), Error> {
        let table = editor.name();
        let temp = format!("{}_temp", table);
        let builder = editor.to_builder(Some(&temp));
        let columns = builder.column_names();

        let targets: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
        let selects: Vec<String> = columns
            .iter()
            .map(|c| sources.get(c).cloned().unwrap_or_else(|| quote_ident(c)))
            .collect();

        tracing::info!(table = %table, columns = columns.len(), "Rebuilding table");

        if foreign_keys && self.foreign_keys_enabled()? {
            // Enforcement cannot be switched off inside a transaction.
            self.execute("PRAGMA defer_foreign_keys = ON;")?;
        }

        self.with_savepoint("rebuild_table", |driver| {
            driver.execute(&ddl::create_table(&builder, table))?;
            driver.execute(&format!(
                "INSERT INTO {} ({}) SELECT {} FROM {};",
                quote_ident(&temp),
                targets.join(", "),
                selects.join(", "),
                quote_ident(table)
            ))?;
            driver.execute(&format!("DROP TABLE {};", quote_ident(table)))?;
            driver.execute(&format!(
                "ALTER TABLE {} RENAME TO {};",
                quote_ident(&temp),
                quote_ident(table)
            ))?;
            if let Some(updated) = editor.updated() {
                driver.execute(&ddl::create_trigger(table, editor.primary_key(), updated))?;
            }
            if foreign_keys {
                driver.check_foreign_keys(table)?;
            }
            Ok(())
        })
    }

    /// Fail with every broken reference from or to `table`. References
    /// between other tables are left alone.
    fn check_foreign_keys(&mut self, table: &str) -> Result<(), Error> {
        let referrers = self.query_rows(
            "SELECT DISTINCT m.name AS name FROM sqlite_master AS m, pragma_foreign_key_list(m.name) AS f \
             WHERE m.type = 'table' AND f.\"table\" = ?1 COLLATE NOCASE;",
            &[SqlValue::Text(table.to_string())],
        )?;
        let mut scope = vec![table.to_string()];
        for name in referrers
            .iter()
            .filter_map(|row| row.get("name").and_then(Value::as_str))
        {
            if !scope.iter().any(|t| t == name) {
                scope.push(name.to_string());
            }
        }

        let mut violations = Vec::new();
        for child in &scope {
            let rows = self.query_rows(&format!("PRAGMA foreign_key_check({});", quote_ident(child)), &[])?;
            for row in &rows {
                let parent = row.get("parent").and_then(Value::as_str).unwrap_or_default();
                if child != table && !parent.eq_ignore_ascii_case(table) {
                    continue;
                }
                violations.push(format!(
                    "{} rowid {} -> {}",
                    child,
                    row.get("rowid").unwrap_or(&Value::Null),
                    parent
                ));
            }
        }

        if violations.is_empty() {
            return Ok(());
        }
        tracing::error!(table = %table, violations = violations.len(), "Foreign key check failed after rebuild");
        Err(Error::IntegrityViolation {
            table: table.to_string(),
            violations,
        })
    }
}
