//! SQLite driver.
//!
//! SQLite only supports a subset of `ALTER TABLE`. Column renames and
//! additions are native; column removal is native from 3.35 on but refuses
//! unique or indexed columns. Whatever cannot be done in place is handled by
//! rebuilding the table under a temporary name.

mod alter;
pub mod ddl;
mod rebuild;
pub mod value;

use super::{Capabilities, Driver, LastResult, OrderDirection, Query, Row};
use crate::catalog::Schema;
use crate::config::{parse_version, SqliteConfig};
use crate::error::Error;
use crate::migration::{SchemaBuilder, SchemaEditor};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;
use value::{from_sql, quote_ident, to_sql};

/// First engine version with `ALTER TABLE ... DROP COLUMN`.
pub const DROP_COLUMN_VERSION: (u32, u32, u32) = (3, 35, 0);

/// SQLite storage driver.
///
/// Owns a single connection. Every statement is recorded so the last query,
/// its outcome and the native error text stay retrievable.
pub struct SqliteDriver {
    conn: Connection,
    config: SqliteConfig,
    engine_version: String,
    last_query: Option<String>,
    last_result: LastResult,
    last_error: Option<String>,
    last_insert_ids: Vec<i64>,
    in_transaction: bool,
    foreign_keys_suspended: bool,
}

impl SqliteDriver {
    /// Open a connection and apply the configured pragmas.
    pub fn open(config: SqliteConfig) -> Result<Self, Error> {
        config.validate()?;

        let opened = if config.is_memory() {
            Connection::open_in_memory()
        } else {
            Connection::open(&config.path)
        };
        let conn = opened.map_err(|e| {
            Error::statement(format!("open {}", config.path.display()), e.to_string())
        })?;
        let engine_version: String = conn
            .query_row("SELECT sqlite_version()", [], |row| row.get(0))
            .map_err(|e| Error::statement("SELECT sqlite_version()", e.to_string()))?;

        let mut driver = Self {
            conn,
            config,
            engine_version,
            last_query: None,
            last_result: LastResult::None,
            last_error: None,
            last_insert_ids: Vec::new(),
            in_transaction: false,
            foreign_keys_suspended: false,
        };

        for statement in driver.config.pragma_statements()? {
            driver.execute(&statement)?;
        }

        tracing::info!(
            path = %driver.config.path.display(),
            version = %driver.engine_version,
            compat_version = ?driver.config.compat_version,
            "Opened SQLite database"
        );
        Ok(driver)
    }

    /// Open a private in-memory database with default pragmas.
    pub fn open_in_memory() -> Result<Self, Error> {
        Self::open(SqliteConfig::in_memory())
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Connection settings.
    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// Version reported by the linked engine.
    pub fn engine_version(&self) -> &str {
        &self.engine_version
    }

    /// Version used for feature detection.
    pub fn version(&self) -> &str {
        self.config
            .compat_version
            .as_deref()
            .unwrap_or(&self.engine_version)
    }

    /// Check whether columns can be dropped natively.
    pub fn supports_drop_column(&self) -> bool {
        parse_version(self.version()).is_some_and(|v| v >= DROP_COLUMN_VERSION)
    }

    /// Row ids assigned by the last successful insert.
    pub fn last_insert_ids(&self) -> &[i64] {
        &self.last_insert_ids
    }

    /// Execute one or more statements without parameters.
    pub fn execute(&mut self, sql: &str) -> Result<(), Error> {
        self.run(sql, |conn| conn.execute_batch(sql), |_| LastResult::Success)
    }

    /// Execute a single parameterized statement; returns the changed row count.
    pub fn execute_params(&mut self, sql: &str, params: &[SqlValue]) -> Result<usize, Error> {
        self.run(
            sql,
            |conn| conn.execute(sql, params_from_iter(params.iter())),
            |changed| LastResult::Affected(*changed),
        )
    }

    /// Run a parameterized query and decode every row.
    pub fn query_rows(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, Error> {
        self.run(
            sql,
            |conn| {
                let mut stmt = conn.prepare(sql)?;
                let columns: Vec<String> =
                    stmt.column_names().into_iter().map(String::from).collect();
                let mut rows = stmt.query(params_from_iter(params.iter()))?;
                let mut decoded = Vec::new();
                while let Some(row) = rows.next()? {
                    let mut map = Row::new();
                    for (index, name) in columns.iter().enumerate() {
                        map.insert(name.clone(), from_sql(row.get_ref(index)?));
                    }
                    decoded.push(map);
                }
                Ok(decoded)
            },
            |rows| LastResult::Rows(rows.len()),
        )
    }

    /// Column names of a table in physical order.
    pub fn table_columns(&mut self, table: &str) -> Result<Vec<String>, Error> {
        let rows = self.query_rows(
            &format!("PRAGMA table_info({});", quote_ident(table)),
            &[],
        )?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get("name").and_then(Value::as_str).map(String::from))
            .collect())
    }

    /// Check whether foreign key enforcement is on.
    pub fn foreign_keys_enabled(&mut self) -> Result<bool, Error> {
        let rows = self.query_rows("PRAGMA foreign_keys;", &[])?;
        Ok(rows
            .first()
            .and_then(|row| row.get("foreign_keys"))
            .and_then(Value::as_i64)
            == Some(1))
    }

    fn run<T>(
        &mut self,
        sql: &str,
        op: impl FnOnce(&Connection) -> rusqlite::Result<T>,
        summarize: impl FnOnce(&T) -> LastResult,
    ) -> Result<T, Error> {
        tracing::debug!(statement = %sql, "Executing statement");
        self.last_query = Some(sql.to_string());
        match op(&self.conn) {
            Ok(value) => {
                self.last_result = summarize(&value);
                self.last_error = None;
                Ok(value)
            }
            Err(e) => {
                let message = e.to_string();
                tracing::debug!(statement = %sql, error = %message, "Statement failed");
                self.last_result = LastResult::Failure;
                self.last_error = Some(message.clone());
                Err(Error::statement(sql, message))
            }
        }
    }

    /// Run `f` inside a savepoint, releasing it on success and rolling it
    /// back on failure.
    fn with_savepoint<T>(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut Self) -> Result<T, Error>,
    ) -> Result<T, Error> {
        self.execute(&format!("SAVEPOINT {};", name))?;
        match f(self) {
            Ok(value) => {
                self.execute(&format!("RELEASE {};", name))?;
                Ok(value)
            }
            Err(e) => {
                // Bypasses `run` so the failing statement stays the last error.
                let undo = format!("ROLLBACK TO {0}; RELEASE {0};", name);
                tracing::debug!(statement = %undo, "Executing statement");
                if let Err(rollback) = self.conn.execute_batch(&undo) {
                    tracing::error!(savepoint = %name, error = %rollback, "Failed to roll back savepoint");
                }
                Err(e)
            }
        }
    }

    fn insert_row(&mut self, collection: &str, row: &Row) -> Result<i64, Error> {
        let table = quote_ident(collection);
        let sql = if row.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES;", table)
        } else {
            let columns: Vec<String> = row.keys().map(|c| quote_ident(c)).collect();
            let placeholders: Vec<String> = (1..=row.len()).map(|i| format!("?{}", i)).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({});",
                table,
                columns.join(", "),
                placeholders.join(", ")
            )
        };
        let params: Vec<SqlValue> = row.values().map(to_sql).collect();

        self.run(
            &sql,
            |conn| {
                conn.execute(&sql, params_from_iter(params.iter()))?;
                Ok(conn.last_insert_rowid())
            },
            |_| LastResult::Affected(1),
        )
    }
}

/// Equality conditions joined by `AND`; null values compare with `IS NULL`.
fn where_clause<'a>(
    conditions: impl Iterator<Item = (&'a str, &'a Value)>,
    params: &mut Vec<SqlValue>,
) -> String {
    let terms: Vec<String> = conditions
        .map(|(column, value)| {
            if value.is_null() {
                format!("{} IS NULL", quote_ident(column))
            } else {
                params.push(to_sql(value));
                format!("{} = ?{}", quote_ident(column), params.len())
            }
        })
        .collect();

    if terms.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", terms.join(" AND "))
    }
}

impl Driver for SqliteDriver {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            transactions: true,
            native_drop_column: self.supports_drop_column(),
        }
    }

    fn last_query(&self) -> Option<&str> {
        self.last_query.as_deref()
    }

    fn last_result(&self) -> &LastResult {
        &self.last_result
    }

    fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn create_schema(&mut self, builder: &SchemaBuilder) -> Result<(), Error> {
        builder.validate()?;

        let mut sql = ddl::create_table(builder, &builder.name);
        if let Some(updated) = &builder.updated {
            sql.push('\n');
            sql.push_str(&ddl::create_trigger(&builder.name, &builder.primary_key, updated));
        }

        self.with_savepoint("create_schema", |driver| driver.execute(&sql))?;
        tracing::info!(schema = %builder.name, "Created table");
        Ok(())
    }

    fn alter_schema(&mut self, editor: &SchemaEditor) -> Result<(), Error> {
        if editor.is_empty() {
            tracing::debug!(schema = %editor.name(), "Nothing to alter");
            return Ok(());
        }

        let enabled = self.foreign_keys_enabled()?;
        let foreign_keys = enabled || self.foreign_keys_suspended;
        // The pragma is a no-op inside a transaction; rebuilds then defer
        // enforcement instead.
        let toggle = enabled && self.conn.is_autocommit();
        if toggle {
            self.execute("PRAGMA foreign_keys = OFF;")?;
        }

        let result = self.with_savepoint("alter_schema", |driver| {
            driver.alter_table(editor, foreign_keys)
        });

        if toggle {
            let restored = self.execute("PRAGMA foreign_keys = ON;");
            result.and(restored)?;
        } else {
            result?;
        }
        tracing::info!(schema = %editor.name(), "Altered table");
        Ok(())
    }

    fn drop_schema(&mut self, schema: &Schema) -> Result<(), Error> {
        let name = schema.name();
        let features = schema.features();

        let mut dependents = Vec::new();
        if features.branches {
            let pattern = format!("{}\\_branch\\_%", name.replace('_', "\\_").replace('%', "\\%"));
            let rows = self.query_rows(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE ?1 ESCAPE '\\';",
                &[SqlValue::Text(pattern)],
            )?;
            dependents.extend(
                rows.iter()
                    .filter_map(|row| row.get("name").and_then(Value::as_str).map(String::from)),
            );
        }
        if features.history {
            dependents.push(format!("{}_revisions", name));
        }

        self.with_savepoint("drop_schema", |driver| {
            for table in &dependents {
                driver.execute(&format!("DROP TABLE IF EXISTS {};", quote_ident(table)))?;
            }
            driver.execute(&format!("DROP TABLE {};", quote_ident(name)))
        })?;
        tracing::info!(schema = %name, dependents = dependents.len(), "Dropped table");
        Ok(())
    }

    fn has_table(&mut self, name: &str) -> Result<bool, Error> {
        let rows = self.query_rows(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1;",
            &[SqlValue::Text(name.to_string())],
        )?;
        Ok(!rows.is_empty())
    }

    fn select(&mut self, collection: &str, query: &Query) -> Result<Vec<Row>, Error> {
        let columns = if query.columns.is_empty() {
            "*".to_string()
        } else {
            query
                .columns
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut params = Vec::new();
        let mut sql = format!("SELECT {} FROM {}", columns, quote_ident(collection));
        sql.push_str(&where_clause(
            query.conditions.iter().map(|(c, v)| (c.as_str(), v)),
            &mut params,
        ));
        if !query.order_by.is_empty() {
            let terms: Vec<String> = query
                .order_by
                .iter()
                .map(|(column, direction)| format!("{} {}", quote_ident(column), direction.as_sql()))
                .collect();
            sql.push_str(&format!(" ORDER BY {}", terms.join(", ")));
        }
        match (query.limit, query.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset)),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
            (None, None) => {}
        }
        sql.push(';');

        self.query_rows(&sql, &params)
    }

    fn insert(&mut self, collection: &str, rows: &[Row]) -> Result<usize, Error> {
        self.last_insert_ids.clear();
        if rows.is_empty() {
            return Ok(0);
        }

        let ids = self.with_savepoint("insert_rows", |driver| {
            rows.iter()
                .map(|row| driver.insert_row(collection, row))
                .collect::<Result<Vec<_>, _>>()
        })?;

        self.last_result = LastResult::Affected(ids.len());
        self.last_insert_ids = ids;
        Ok(rows.len())
    }

    fn update(&mut self, collection: &str, values: &Row, conditions: &Row) -> Result<usize, Error> {
        if values.is_empty() {
            return Ok(0);
        }

        let mut params = Vec::with_capacity(values.len() + conditions.len());
        let assignments: Vec<String> = values
            .iter()
            .map(|(column, value)| {
                params.push(to_sql(value));
                format!("{} = ?{}", quote_ident(column), params.len())
            })
            .collect();
        let filter = where_clause(
            conditions.iter().map(|(c, v)| (c.as_str(), v)),
            &mut params,
        );
        let sql = format!(
            "UPDATE {} SET {}{};",
            quote_ident(collection),
            assignments.join(", "),
            filter
        );

        self.execute_params(&sql, &params)
    }

    fn delete(&mut self, collection: &str, conditions: &Row) -> Result<usize, Error> {
        let mut params = Vec::with_capacity(conditions.len());
        let filter = where_clause(
            conditions.iter().map(|(c, v)| (c.as_str(), v)),
            &mut params,
        );
        let sql = format!("DELETE FROM {}{};", quote_ident(collection), filter);

        self.execute_params(&sql, &params)
    }

    fn begin(&mut self) -> Result<(), Error> {
        if self.in_transaction {
            self.rollback()?;
            return Err(Error::TransactionState(
                "multiple transactions on the same connection are not supported".into(),
            ));
        }
        self.execute("BEGIN;")?;
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), Error> {
        if !self.in_transaction {
            return Err(Error::TransactionState("no transaction available to commit".into()));
        }
        self.execute("COMMIT;")?;
        self.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), Error> {
        if !self.in_transaction {
            return Err(Error::TransactionState("no transaction available to roll back".into()));
        }
        self.in_transaction = false;
        if self.conn.is_autocommit() {
            // The engine already rolled back on its own.
            return Ok(());
        }
        self.execute("ROLLBACK;")
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn suspend_foreign_keys(&mut self) -> Result<bool, Error> {
        if self.foreign_keys_suspended || !self.conn.is_autocommit() {
            return Ok(false);
        }
        if !self.foreign_keys_enabled()? {
            return Ok(false);
        }
        self.execute("PRAGMA foreign_keys = OFF;")?;
        self.foreign_keys_suspended = true;
        tracing::debug!("Suspended foreign key enforcement");
        Ok(true)
    }

    fn restore_foreign_keys(&mut self, enabled: bool) -> Result<(), Error> {
        self.foreign_keys_suspended = false;
        if enabled {
            self.execute("PRAGMA foreign_keys = ON;")?;
            tracing::debug!("Restored foreign key enforcement");
        }
        Ok(())
    }
}

impl std::fmt::Debug for SqliteDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDriver")
            .field("path", &self.config.path)
            .field("version", &self.version())
            .field("in_transaction", &self.in_transaction)
            .field("foreign_keys_suspended", &self.foreign_keys_suspended)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::DeclareProperties;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn driver_with_users() -> SqliteDriver {
        let mut driver = SqliteDriver::open_in_memory().unwrap();
        let mut builder = SchemaBuilder::new("users");
        builder.primary_key("id", crate::catalog::PrimaryKeyFormat::Id);
        builder.string("name").unwrap().required();
        builder.integer("age").unwrap();
        builder.boolean("active").unwrap().default(true);
        driver.create_schema(&builder).unwrap();
        driver
    }

    #[test]
    fn test_open_applies_pragmas() {
        let mut driver = SqliteDriver::open_in_memory().unwrap();
        assert!(driver.foreign_keys_enabled().unwrap());
        assert!(!driver.engine_version().is_empty());

        let config = SqliteConfig::in_memory().with_pragma("foreign_keys", false);
        let mut driver = SqliteDriver::open(config).unwrap();
        assert!(!driver.foreign_keys_enabled().unwrap());
    }

    #[test]
    fn test_compat_version_disables_drop_column() {
        let driver =
            SqliteDriver::open(SqliteConfig::in_memory().with_compat_version("3.34.0")).unwrap();
        assert_eq!(driver.version(), "3.34.0");
        assert!(!driver.supports_drop_column());
        assert!(!driver.capabilities().native_drop_column);
    }

    #[test]
    fn test_create_schema_with_trigger() {
        let mut driver = driver_with_users();
        assert!(driver.has_table("users").unwrap());
        assert!(!driver.has_table("posts").unwrap());
        assert_eq!(
            driver.table_columns("users").unwrap(),
            vec!["id", "name", "age", "active", "created_at", "updated_at"]
        );

        let triggers = driver
            .query_rows(
                "SELECT name FROM sqlite_master WHERE type = 'trigger';",
                &[],
            )
            .unwrap();
        assert_eq!(triggers[0]["name"], json!("users_updated_at"));
    }

    #[test]
    fn test_insert_select_update_delete() {
        let mut driver = driver_with_users();

        let inserted = driver
            .insert(
                "users",
                &[
                    row(json!({"name": "ada", "age": 36})),
                    row(json!({"name": "grace", "age": 45, "active": false})),
                ],
            )
            .unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(driver.last_insert_ids(), &[1, 2]);

        let rows = driver
            .select(
                "users",
                &Query::new()
                    .columns(["name", "active"])
                    .order_by("age", OrderDirection::Desc),
            )
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], json!("grace"));
        assert_eq!(rows[0]["active"], json!(0));
        assert_eq!(rows[1]["active"], json!(1));
        assert_eq!(driver.last_result(), &LastResult::Rows(2));

        let updated = driver
            .update("users", &row(json!({"age": 37})), &row(json!({"name": "ada"})))
            .unwrap();
        assert_eq!(updated, 1);

        let rows = driver
            .select("users", &Query::new().where_eq("name", "ada"))
            .unwrap();
        assert_eq!(rows[0]["age"], json!(37));
        assert!(rows[0]["updated_at"].is_string());

        let rows = driver
            .select("users", &Query::new().order_by("id", OrderDirection::Asc).offset(1))
            .unwrap();
        assert_eq!(rows.len(), 1);

        let deleted = driver.delete("users", &row(json!({"name": "grace"}))).unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(driver.select("users", &Query::new()).unwrap().len(), 1);
    }

    #[test]
    fn test_insert_is_all_or_nothing() {
        let mut driver = driver_with_users();
        let err = driver
            .insert(
                "users",
                &[row(json!({"name": "ada"})), row(json!({"age": 3}))],
            )
            .unwrap_err();

        assert!(matches!(err, Error::Statement { .. }));
        assert!(driver.last_error().unwrap().contains("NOT NULL"));
        assert!(driver.last_insert_ids().is_empty());
        assert!(driver.select("users", &Query::new()).unwrap().is_empty());
    }

    #[test]
    fn test_failed_statement_is_recorded() {
        let mut driver = SqliteDriver::open_in_memory().unwrap();
        let err = driver.execute("DROP TABLE missing;").unwrap_err();

        assert_eq!(driver.last_query(), Some("DROP TABLE missing;"));
        assert_eq!(driver.last_result(), &LastResult::Failure);
        assert!(driver.last_error().unwrap().contains("no such table"));
        assert_eq!(err.backend_message(), driver.last_error());
    }

    #[test]
    fn test_transactions() {
        let mut driver = driver_with_users();
        assert!(matches!(driver.commit(), Err(Error::TransactionState(_))));
        assert!(matches!(driver.rollback(), Err(Error::TransactionState(_))));

        driver.begin().unwrap();
        assert!(driver.in_transaction());
        driver.insert("users", &[row(json!({"name": "ada"}))]).unwrap();
        driver.rollback().unwrap();
        assert!(driver.select("users", &Query::new()).unwrap().is_empty());

        driver.begin().unwrap();
        driver.insert("users", &[row(json!({"name": "ada"}))]).unwrap();
        let err = driver.begin().unwrap_err();
        assert!(matches!(err, Error::TransactionState(_)));
        assert!(!driver.in_transaction());
        assert!(driver.select("users", &Query::new()).unwrap().is_empty());

        driver.begin().unwrap();
        driver.insert("users", &[row(json!({"name": "ada"}))]).unwrap();
        driver.commit().unwrap();
        assert_eq!(driver.select("users", &Query::new()).unwrap().len(), 1);
    }

    #[test]
    fn test_suspend_foreign_keys() {
        let mut driver = driver_with_users();
        assert!(driver.suspend_foreign_keys().unwrap());
        assert!(!driver.foreign_keys_enabled().unwrap());
        assert!(!driver.suspend_foreign_keys().unwrap());

        driver.restore_foreign_keys(true).unwrap();
        assert!(driver.foreign_keys_enabled().unwrap());

        driver.begin().unwrap();
        assert!(!driver.suspend_foreign_keys().unwrap());
        assert!(driver.foreign_keys_enabled().unwrap());
        driver.rollback().unwrap();
    }

    #[test]
    fn test_drop_schema_with_dependents() {
        let mut driver = SqliteDriver::open_in_memory().unwrap();
        let mut builder = SchemaBuilder::new("pages");
        builder.features.branches = true;
        builder.features.history = true;
        builder.string("title").unwrap();
        driver.create_schema(&builder).unwrap();
        driver
            .execute("CREATE TABLE pages_branch_draft (x TEXT); CREATE TABLE pages_revisions (x TEXT); CREATE TABLE pagesXbranch_other (x TEXT);")
            .unwrap();

        let schema = Schema::from_json(&builder.to_json(false).unwrap()).unwrap();
        driver.drop_schema(&schema).unwrap();

        assert!(!driver.has_table("pages").unwrap());
        assert!(!driver.has_table("pages_branch_draft").unwrap());
        assert!(!driver.has_table("pages_revisions").unwrap());
        assert!(driver.has_table("pagesXbranch_other").unwrap());
    }
}
