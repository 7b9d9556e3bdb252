//! SQLite DDL generation.

use super::value::{quote_ident, to_literal};
use crate::catalog::{PrimaryKeyFormat, Property, PropertyKind, UID_LENGTH, UUID_LENGTH};
use crate::migration::SchemaBuilder;

/// Expression stamping the current timestamp.
pub const NOW: &str = "DATETIME('NOW')";

/// Column affinity for a property kind.
pub fn column_type(kind: PropertyKind) -> &'static str {
    match kind {
        PropertyKind::Number => "REAL",
        PropertyKind::Integer | PropertyKind::Boolean => "INTEGER",
        _ => "TEXT",
    }
}

/// Column definition for a property.
///
/// `inline_unique` controls whether a `UNIQUE` constraint is emitted;
/// columns added through `ALTER TABLE` get a unique index instead.
pub fn column_definition(property: &Property, inline_unique: bool) -> String {
    let mut parts = vec![quote_ident(property.name()), column_type(property.kind()).to_string()];

    let nullability = if property.required { "NOT NULL" } else { "NULL" };
    parts.push(nullability.to_string());
    if property.unique && inline_unique {
        parts.push("UNIQUE".to_string());
    }
    if let Some(default) = &property.default {
        parts.push(format!("DEFAULT {}", to_literal(default)));
    }

    parts.join(" ")
}

/// Column definition of the primary key.
pub fn primary_key_definition(name: &str, format: PrimaryKeyFormat) -> String {
    let column = quote_ident(name);
    match format {
        PrimaryKeyFormat::Id => format!("{} INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT", column),
        PrimaryKeyFormat::Uid => format!(
            "{0} TEXT NOT NULL PRIMARY KEY CHECK(length({0}) = {1})",
            column, UID_LENGTH
        ),
        PrimaryKeyFormat::Uuid => format!(
            "{0} TEXT NOT NULL PRIMARY KEY CHECK(length({0}) = {1})",
            column, UUID_LENGTH
        ),
    }
}

/// Column definition of the creation timestamp.
pub fn created_definition(name: &str) -> String {
    format!("{} TEXT DEFAULT ({})", quote_ident(name), NOW)
}

/// Column definition of the update timestamp.
pub fn updated_definition(name: &str) -> String {
    format!("{} TEXT NULL", quote_ident(name))
}

/// Name of a unique constraint or index over the given columns.
pub fn unique_name(collection: &str, columns: &[String]) -> String {
    format!("{}_{}_unique", collection, columns.join("_"))
}

/// `CREATE TABLE` statement for a builder.
///
/// The table is named after the builder; constraint names are prefixed with
/// `collection`, so a table built under a temporary name keeps the names of
/// the collection it replaces.
pub fn create_table(builder: &SchemaBuilder, collection: &str) -> String {
    let mut fields = vec![primary_key_definition(
        &builder.primary_key,
        builder.primary_key_format,
    )];
    fields.extend(builder.properties().iter().map(|p| column_definition(p, true)));
    if let Some(created) = &builder.created {
        fields.push(created_definition(created));
    }
    if let Some(updated) = &builder.updated {
        fields.push(updated_definition(updated));
    }
    for group in builder.uniques() {
        let columns: Vec<String> = group.iter().map(|c| quote_ident(c)).collect();
        fields.push(format!(
            "CONSTRAINT {} UNIQUE ({})",
            quote_ident(&unique_name(collection, group)),
            columns.join(", ")
        ));
    }

    format!(
        "CREATE TABLE {} (\n  {}\n);",
        quote_ident(&builder.name),
        fields.join(",\n  ")
    )
}

/// Name of the update-timestamp trigger.
pub fn trigger_name(table: &str, updated: &str) -> String {
    format!("{}_{}", table, updated)
}

/// Trigger stamping the update timestamp after every row update.
pub fn create_trigger(table: &str, primary_key: &str, updated: &str) -> String {
    let table_ident = quote_ident(table);
    let pk = quote_ident(primary_key);
    format!(
        "CREATE TRIGGER {} AFTER UPDATE ON {}\n  BEGIN\n    UPDATE {} SET {} = {} WHERE {} = NEW.{};\n  END;",
        quote_ident(&trigger_name(table, updated)),
        table_ident,
        table_ident,
        quote_ident(updated),
        NOW,
        pk,
        pk
    )
}

/// Drop the update-timestamp trigger.
pub fn drop_trigger(table: &str, updated: &str) -> String {
    format!("DROP TRIGGER IF EXISTS {};", quote_ident(&trigger_name(table, updated)))
}

/// Unique index over columns of an existing table.
pub fn create_unique_index(table: &str, columns: &[String]) -> String {
    let quoted: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    format!(
        "CREATE UNIQUE INDEX {} ON {} ({});",
        quote_ident(&unique_name(table, columns)),
        quote_ident(table),
        quoted.join(", ")
    )
}

/// `ALTER TABLE ... ADD COLUMN`.
pub fn add_column(table: &str, definition: &str) -> String {
    format!("ALTER TABLE {} ADD COLUMN {};", quote_ident(table), definition)
}

/// `ALTER TABLE ... RENAME COLUMN`.
pub fn rename_column(table: &str, from: &str, to: &str) -> String {
    format!(
        "ALTER TABLE {} RENAME COLUMN {} TO {};",
        quote_ident(table),
        quote_ident(from),
        quote_ident(to)
    )
}

/// `ALTER TABLE ... DROP COLUMN`.
pub fn drop_column(table: &str, column: &str) -> String {
    format!(
        "ALTER TABLE {} DROP COLUMN {};",
        quote_ident(table),
        quote_ident(column)
    )
}
