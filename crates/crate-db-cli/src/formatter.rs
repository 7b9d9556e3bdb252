//! Output formatters for command results.

use crate::commands::{Output, UnitInfo};
use clap::ValueEnum;
use comfy_table::{Cell, Table};
use crate_db_core::migration::{LedgerRecord, MigrationReport};
use serde_json::{json, Value};

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter {
    /// Format executed migration units.
    fn format_reports(&self, reports: &[MigrationReport]) -> String;

    /// Format ledger records.
    fn format_ledger(&self, records: &[LedgerRecord]) -> String;

    /// Format registered migration units.
    fn format_units(&self, units: &[UnitInfo]) -> String;

    /// Format persisted schema names.
    fn format_schemas(&self, names: &[String]) -> String;

    /// Format a schema document.
    fn format_document(&self, document: &Value) -> String;

    /// Format an error message.
    fn format_error(&self, error: &str) -> String;

    /// Format any command output.
    fn render(&self, output: &Output) -> String {
        match output {
            Output::Reports(reports) => self.format_reports(reports),
            Output::Ledger(records) => self.format_ledger(records),
            Output::Units(units) => self.format_units(units),
            Output::Schemas(names) => self.format_schemas(names),
            Output::Document(document) => self.format_document(document),
        }
    }
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

fn applied_at(record: &LedgerRecord) -> String {
    record
        .applied_at
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_reports(&self, reports: &[MigrationReport]) -> String {
        if reports.is_empty() {
            return "Nothing to migrate".to_string();
        }

        let mut table = Table::new();
        table.set_header(vec!["Module", "Migration", "Title", "Status", "Intents", "Checkpoints"]);
        for report in reports {
            let status = match (report.skipped, report.dry_run) {
                (true, _) => "skipped".to_string(),
                (false, true) => format!("{} (dry run)", report.status),
                (false, false) => report.status.to_string(),
            };
            table.add_row(vec![
                Cell::new(&report.module),
                Cell::new(&report.path),
                Cell::new(&report.title),
                Cell::new(status),
                Cell::new(report.intents),
                Cell::new(report.checkpoints),
            ]);
        }
        table.to_string()
    }

    fn format_ledger(&self, records: &[LedgerRecord]) -> String {
        if records.is_empty() {
            return "No migrations applied".to_string();
        }

        let mut table = Table::new();
        table.set_header(vec!["Id", "Module", "Migration", "Applied At"]);
        for record in records {
            table.add_row(vec![
                Cell::new(record.id),
                Cell::new(&record.module),
                Cell::new(&record.migration),
                Cell::new(applied_at(record)),
            ]);
        }
        table.to_string()
    }

    fn format_units(&self, units: &[UnitInfo]) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Module", "Migration", "Title", "Applied"]);
        for unit in units {
            table.add_row(vec![
                Cell::new(&unit.module),
                Cell::new(&unit.path),
                Cell::new(&unit.title),
                Cell::new(if unit.applied { "yes" } else { "no" }),
            ]);
        }
        table.to_string()
    }

    fn format_schemas(&self, names: &[String]) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Schema"]);
        for name in names {
            table.add_row(vec![name]);
        }
        table.to_string()
    }

    fn format_document(&self, document: &Value) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Property", "Type", "Format", "Required"]);

        let required: Vec<&str> = document["required"]
            .as_array()
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        if let Some(properties) = document["properties"].as_object() {
            for (name, fragment) in properties {
                table.add_row(vec![
                    Cell::new(name),
                    Cell::new(fragment["type"].as_str().unwrap_or("")),
                    Cell::new(fragment["format"].as_str().unwrap_or("")),
                    Cell::new(if required.contains(&name.as_str()) { "yes" } else { "" }),
                ]);
            }
        }

        format!(
            "{} ({})\n{}",
            document["name"].as_str().unwrap_or(""),
            document["$id"].as_str().unwrap_or(""),
            table
        )
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}", error)
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl JsonFormatter {
    fn pretty(value: &Value) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    }
}

impl Formatter for JsonFormatter {
    fn format_reports(&self, reports: &[MigrationReport]) -> String {
        let rows: Vec<Value> = reports
            .iter()
            .map(|report| {
                json!({
                    "module": report.module,
                    "migration": report.path,
                    "title": report.title,
                    "status": report.status.to_string(),
                    "intents": report.intents,
                    "checkpoints": report.checkpoints,
                    "skipped": report.skipped,
                    "dry_run": report.dry_run,
                })
            })
            .collect();
        Self::pretty(&Value::Array(rows))
    }

    fn format_ledger(&self, records: &[LedgerRecord]) -> String {
        let rows: Vec<Value> = records
            .iter()
            .map(|record| {
                json!({
                    "id": record.id,
                    "module": record.module,
                    "migration": record.migration,
                    "migrated_at": applied_at(record),
                })
            })
            .collect();
        Self::pretty(&Value::Array(rows))
    }

    fn format_units(&self, units: &[UnitInfo]) -> String {
        let rows: Vec<Value> = units
            .iter()
            .map(|unit| {
                json!({
                    "module": unit.module,
                    "migration": unit.path,
                    "title": unit.title,
                    "applied": unit.applied,
                })
            })
            .collect();
        Self::pretty(&Value::Array(rows))
    }

    fn format_schemas(&self, names: &[String]) -> String {
        Self::pretty(&json!(names))
    }

    fn format_document(&self, document: &Value) -> String {
        Self::pretty(document)
    }

    fn format_error(&self, error: &str) -> String {
        Self::pretty(&json!({ "error": error }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate_db_core::migration::UnitStatus;

    fn report() -> MigrationReport {
        MigrationReport {
            module: "demo".to_string(),
            path: "001_test-migrator-methods".to_string(),
            title: "Test Migrator Methods".to_string(),
            status: UnitStatus::Committed,
            intents: 3,
            checkpoints: 1,
            skipped: false,
            dry_run: false,
        }
    }

    #[test]
    fn test_table_reports() {
        let output = TableFormatter.format_reports(&[report()]);
        assert!(output.contains("001_test-migrator-methods"));
        assert!(output.contains("committed"));
        assert_eq!(TableFormatter.format_reports(&[]), "Nothing to migrate");
    }

    #[test]
    fn test_json_reports() {
        let output = JsonFormatter.format_reports(&[report()]);
        let parsed: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed[0]["status"], "committed");
        assert_eq!(parsed[0]["checkpoints"], 1);
    }

    #[test]
    fn test_document_table() {
        let document = json!({
            "name": "users",
            "$id": "custom_users",
            "properties": {
                "uuid": {"type": "string", "format": "uuid"},
                "username": {"type": "string"}
            },
            "required": ["username"]
        });
        let output = TableFormatter.format_document(&document);
        assert!(output.starts_with("users (custom_users)"));
        assert!(output.contains("username"));
    }

    #[test]
    fn test_errors() {
        assert_eq!(TableFormatter.format_error("boom"), "Error: boom");
        let parsed: Value = serde_json::from_str(&JsonFormatter.format_error("boom")).unwrap();
        assert_eq!(parsed["error"], "boom");
    }
}
