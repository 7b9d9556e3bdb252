//! In-place table alteration.

use super::value::{quote_ident, to_sql};
use super::{ddl, SqliteDriver};
use crate::error::Error;
use crate::migration::{Converter, DiffOp, SchemaEditor};
use crate::repository::{decode_row, decode_value};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;

/// Physical work collected while walking an editor.
#[derive(Debug, Default)]
struct AlterPlan {
    /// Columns waiting to be dropped.
    removals: Vec<String>,
    /// Redefined columns as `(final name, temporary column)`; renamed once
    /// the original column is gone.
    pending: Vec<(String, String)>,
    /// Copy expression per final column, for rebuilds.
    sources: HashMap<String, String>,
    /// Added or redefined columns that need a unique index, by final name.
    unique_columns: Vec<String>,
    /// Some change can only be reached by rebuilding.
    rebuild: bool,
}

impl AlterPlan {
    fn take_pending(&mut self, name: &str) -> Option<String> {
        let index = self.pending.iter().position(|(target, _)| target == name)?;
        Some(self.pending.remove(index).1)
    }
}

impl SqliteDriver {
    /// Apply an editor's diff. Runs inside the caller's savepoint.
    pub(super) fn alter_table(
        &mut self,
        editor: &SchemaEditor,
        foreign_keys: bool,
    ) -> Result<(), Error> {
        let table = editor.name();
        let mut plan = AlterPlan::default();

        // Data copies must not touch the update timestamp.
        if let Some(updated) = editor.original().updated() {
            self.execute(&ddl::drop_trigger(table, updated))?;
        }

        self.add_columns(editor, &mut plan)?;
        self.alter_timestamps(editor, &mut plan)?;
        for op in editor.operations() {
            self.apply_operation(editor, op, &mut plan)?;
        }

        if !plan.rebuild && self.supports_drop_column() {
            let mut remaining = Vec::new();
            for column in std::mem::take(&mut plan.removals) {
                if let Err(e) = self.execute(&ddl::drop_column(table, &column)) {
                    tracing::warn!(
                        table = %table,
                        column = %column,
                        error = %e,
                        "Native column drop failed, rebuilding table"
                    );
                    remaining.push(column);
                }
            }
            plan.removals = remaining;
        }

        if plan.rebuild || !plan.removals.is_empty() {
            for (target, temp) in &plan.pending {
                plan.sources.insert(target.clone(), quote_ident(temp));
            }
            return self.rebuild_table(editor, &plan.sources, foreign_keys);
        }

        for (target, temp) in &plan.pending {
            self.execute(&ddl::rename_column(table, temp, target))?;
        }

        let live: Vec<String> = editor
            .resolve_final_properties()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        for column in plan.unique_columns.iter().filter(|c| live.contains(c)) {
            self.execute(&ddl::create_unique_index(table, std::slice::from_ref(column)))?;
        }
        for group in editor.added_uniques() {
            self.execute(&ddl::create_unique_index(table, &group))?;
        }

        if let Some(updated) = editor.updated() {
            self.execute(&ddl::create_trigger(table, editor.primary_key(), updated))?;
        }
        Ok(())
    }

    fn add_columns(&mut self, editor: &SchemaEditor, plan: &mut AlterPlan) -> Result<(), Error> {
        for property in editor.added() {
            let mut column = property.clone();
            if column.required && !column.has_default() {
                // Existing rows have no value yet; the rebuild enforces the constraint.
                column.optional();
                plan.rebuild = true;
            }
            self.execute(&ddl::add_column(
                editor.name(),
                &ddl::column_definition(&column, false),
            ))?;
            if property.unique {
                plan.unique_columns.push(property.name().to_string());
            }
        }
        Ok(())
    }

    fn alter_timestamps(&mut self, editor: &SchemaEditor, plan: &mut AlterPlan) -> Result<(), Error> {
        let table = editor.name();
        let original = editor.original();

        match (original.created(), editor.created()) {
            (None, Some(created)) => {
                // A non-constant default cannot be added in place.
                plan.rebuild = true;
                plan.sources.insert(created.to_string(), ddl::NOW.to_string());
            }
            (Some(old), None) => plan.removals.push(old.to_string()),
            (Some(old), Some(new)) if old != new => {
                self.execute(&ddl::rename_column(table, old, new))?;
            }
            _ => {}
        }

        match (original.updated(), editor.updated()) {
            (None, Some(updated)) => {
                self.execute(&ddl::add_column(table, &ddl::updated_definition(updated)))?;
            }
            (Some(old), None) => plan.removals.push(old.to_string()),
            (Some(old), Some(new)) if old != new => {
                self.execute(&ddl::rename_column(table, old, new))?;
            }
            _ => {}
        }
        Ok(())
    }

    fn apply_operation(
        &mut self,
        editor: &SchemaEditor,
        op: &DiffOp,
        plan: &mut AlterPlan,
    ) -> Result<(), Error> {
        let table = editor.name();
        match op {
            DiffOp::Rename { from, to } => {
                if let Some(entry) = plan.pending.iter_mut().find(|(target, _)| target == from) {
                    entry.0 = to.clone();
                } else {
                    self.execute(&ddl::rename_column(table, from, to))?;
                }
                for column in plan.unique_columns.iter_mut().filter(|c| c.as_str() == from.as_str()) {
                    *column = to.clone();
                }
            }
            DiffOp::Replace { from, to, .. } if from == to => {
                self.redefine_column(editor, from, plan)?;
            }
            DiffOp::Replace { from, to, converter } => {
                let source = plan.take_pending(from).unwrap_or_else(|| from.clone());
                match converter {
                    Some(convert) => {
                        self.convert_column(editor, from, &source, to, convert)?;
                    }
                    None => self.execute(&format!(
                        "UPDATE {} SET {} = {};",
                        quote_ident(table),
                        quote_ident(to),
                        quote_ident(&source)
                    ))?,
                }
                plan.removals.push(source);
            }
            DiffOp::Remove { name } => {
                let column = plan.take_pending(name).unwrap_or_else(|| name.clone());
                plan.removals.push(column);
            }
        }
        Ok(())
    }

    /// Copy an edited property into a fresh column carrying the new definition.
    fn redefine_column(
        &mut self,
        editor: &SchemaEditor,
        name: &str,
        plan: &mut AlterPlan,
    ) -> Result<(), Error> {
        let table = editor.name();
        let property = editor
            .edited_property(name)
            .ok_or_else(|| Error::unknown(table, name))?;
        let temp = format!("{}_{}", name, Utc::now().timestamp());

        let mut column = property.renamed(temp.as_str());
        if column.required && !column.has_default() {
            column.optional();
            plan.rebuild = true;
        }
        self.execute(&ddl::add_column(table, &ddl::column_definition(&column, false)))?;
        self.execute(&format!(
            "UPDATE {} SET {} = {};",
            quote_ident(table),
            quote_ident(&temp),
            quote_ident(name)
        ))?;

        plan.removals.push(name.to_string());
        plan.pending.push((name.to_string(), temp));
        if property.unique {
            plan.unique_columns.push(name.to_string());
        }
        Ok(())
    }

    fn convert_column(
        &mut self,
        editor: &SchemaEditor,
        from: &str,
        source: &str,
        to: &str,
        convert: &Converter,
    ) -> Result<(), Error> {
        let table = editor.name();
        let primary_key = editor.primary_key();
        let rows = self.query_rows(&format!("SELECT * FROM {};", quote_ident(table)), &[])?;
        let update = format!(
            "UPDATE {} SET {} = ?1 WHERE {} = ?2;",
            quote_ident(table),
            quote_ident(to),
            quote_ident(primary_key)
        );

        let count = rows.len();
        let original = editor.original();
        let kind = original.property(from).map(|p| p.kind());
        for row in rows {
            let mut current = row.get(source).cloned().unwrap_or(Value::Null);
            if let Some(kind) = kind {
                decode_value(kind, &mut current);
            }
            let row = decode_row(original, row);
            let converted = match convert(&current, &row) {
                Ok(value) => value,
                Err(message) => {
                    self.last_error = Some(message.clone());
                    return Err(Error::statement(format!("replace {} -> {}", from, to), message));
                }
            };
            let key = row.get(primary_key).unwrap_or(&Value::Null);
            self.execute_params(&update, &[to_sql(&converted), to_sql(key)])?;
        }

        tracing::debug!(table = %table, from = %from, to = %to, rows = count, "Converted column");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::catalog::Schema;
    use crate::driver::{Driver, Query, Row, SqliteDriver};
    use crate::migration::{DeclareProperties, SchemaBuilder, SchemaEditor};
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn setup() -> (SqliteDriver, Arc<Schema>) {
        let mut driver = SqliteDriver::open_in_memory().unwrap();
        let mut builder = SchemaBuilder::new("notes");
        builder.string("title").unwrap().required();
        builder.string("body").unwrap();
        builder.integer("rank").unwrap();
        driver.create_schema(&builder).unwrap();

        let rows: Vec<Row> = [json!({"uuid": "00000000-0000-0000-0000-000000000001", "title": "a", "body": "x", "rank": 1}),
            json!({"uuid": "00000000-0000-0000-0000-000000000002", "title": "b", "body": "y", "rank": 2})]
        .iter()
        .map(|v| v.as_object().cloned().unwrap())
        .collect();
        driver.insert("notes", &rows).unwrap();

        let schema = Arc::new(Schema::from_json(&builder.to_json(false).unwrap()).unwrap());
        (driver, schema)
    }

    #[test]
    fn test_edit_property_in_place() {
        let (mut driver, schema) = setup();
        let mut editor = SchemaEditor::new(schema);
        editor.edit_property("rank").unwrap().default(0).required();
        driver.alter_schema(&editor).unwrap();

        assert_eq!(
            driver.table_columns("notes").unwrap(),
            vec!["uuid", "title", "body", "created_at", "updated_at", "rank"]
        );
        let rows = driver
            .select("notes", &Query::new().where_eq("title", "b"))
            .unwrap();
        assert_eq!(rows[0]["rank"], json!(2));
        assert!(rows[0]["updated_at"].is_null());
    }

    #[test]
    fn test_replace_with_converter() {
        let (mut driver, schema) = setup();
        let mut editor = SchemaEditor::new(schema);
        editor.string("summary").unwrap();
        editor
            .replace_with("body", "summary", |value, row| {
                Ok(json!(format!("{}: {}", row["title"].as_str().unwrap_or(""), value.as_str().unwrap_or(""))))
            })
            .unwrap();
        driver.alter_schema(&editor).unwrap();

        let rows = driver.select("notes", &Query::new().where_eq("title", "a")).unwrap();
        assert_eq!(rows[0]["summary"], json!("a: x"));
        assert!(!rows[0].contains_key("body"));
    }

    #[test]
    fn test_converter_sees_decoded_values() {
        let mut driver = SqliteDriver::open_in_memory().unwrap();
        let mut builder = SchemaBuilder::new("flags");
        builder.boolean("enabled").unwrap();
        builder.array("labels").unwrap();
        driver.create_schema(&builder).unwrap();
        driver
            .insert(
                "flags",
                &[json!({"uuid": "00000000-0000-0000-0000-000000000001", "enabled": true, "labels": ["a", "b"]})
                    .as_object()
                    .cloned()
                    .unwrap()],
            )
            .unwrap();

        let schema = Arc::new(Schema::from_json(&builder.to_json(false).unwrap()).unwrap());
        let mut editor = SchemaEditor::new(schema);
        editor.string("state").unwrap();
        editor
            .replace_with("enabled", "state", |value, row| match (value, &row["labels"]) {
                (Value::Bool(on), Value::Array(labels)) => {
                    Ok(json!(format!("{}:{}", if *on { "on" } else { "off" }, labels.len())))
                }
                other => Err(format!("undecoded values {:?}", other)),
            })
            .unwrap();
        driver.alter_schema(&editor).unwrap();

        let rows = driver.select("flags", &Query::new()).unwrap();
        assert_eq!(rows[0]["state"], json!("on:2"));
    }

    #[test]
    fn test_unique_added_column_gets_index() {
        let (mut driver, schema) = setup();
        let mut editor = SchemaEditor::new(schema);
        editor.string("slug").unwrap().unique();
        driver.alter_schema(&editor).unwrap();

        let indexes = driver
            .query_rows(
                "SELECT name FROM sqlite_master WHERE type = 'index' AND name = 'notes_slug_unique';",
                &[],
            )
            .unwrap();
        assert_eq!(indexes.len(), 1);
    }

    #[test]
    fn test_edited_unique_survives_rename() {
        let (mut driver, schema) = setup();
        let mut editor = SchemaEditor::new(schema);
        editor.edit_property("body").unwrap().unique();
        editor.rename("body", "content").unwrap();
        driver.alter_schema(&editor).unwrap();

        assert_eq!(
            driver.table_columns("notes").unwrap(),
            vec!["uuid", "title", "rank", "created_at", "updated_at", "content"]
        );
        let rows = driver.select("notes", &Query::new().where_eq("title", "a")).unwrap();
        assert_eq!(rows[0]["content"], json!("x"));

        let duplicate = json!({"uuid": "00000000-0000-0000-0000-000000000003", "title": "c", "content": "x"});
        let err = driver
            .insert("notes", &[duplicate.as_object().cloned().unwrap()])
            .unwrap_err();
        assert!(driver.last_error().unwrap().contains("UNIQUE"), "{:?}", err);
    }

    #[test]
    fn test_added_created_column_rebuilds() {
        let mut driver = SqliteDriver::open_in_memory().unwrap();
        let mut builder = SchemaBuilder::new("events");
        builder.created(None);
        builder.string("kind").unwrap();
        driver.create_schema(&builder).unwrap();
        driver
            .insert("events", &[json!({"uuid": "00000000-0000-0000-0000-000000000001", "kind": "boot"}).as_object().cloned().unwrap()])
            .unwrap();

        let schema = Arc::new(Schema::from_json(&builder.to_json(false).unwrap()).unwrap());
        let mut editor = SchemaEditor::new(schema);
        editor.set_created(Some("created_at")).unwrap();
        driver.alter_schema(&editor).unwrap();

        let rows = driver.select("events", &Query::new()).unwrap();
        assert_eq!(rows[0]["kind"], json!("boot"));
        assert!(rows[0]["created_at"].is_string());
    }
}
