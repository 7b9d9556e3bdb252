//! Row access checked against a schema snapshot.
//!
//! Migration data steps work through a [`Repository`]: every field a query or
//! a write refers to must exist on the current snapshot of the collection.

use crate::catalog::{PropertyKind, Schema};
use crate::driver::{Driver, Query, Row};
use crate::error::Error;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Schema-checked access to the rows of one collection.
pub struct Repository<'a> {
    driver: &'a mut dyn Driver,
    schema: Arc<Schema>,
}

impl<'a> Repository<'a> {
    /// Create a repository for the collection described by `schema`.
    pub fn new(driver: &'a mut dyn Driver, schema: Arc<Schema>) -> Self {
        Self { driver, schema }
    }

    /// The snapshot fields are checked against.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Select rows. Structured and boolean columns are decoded.
    pub fn select(&mut self, query: &Query) -> Result<Vec<Row>, Error> {
        for field in query.fields() {
            self.check_field(field)?;
        }

        let rows = self.driver.select(self.schema.name(), query)?;
        Ok(rows.into_iter().map(|row| self.decode(row)).collect())
    }

    /// Find a row by primary key.
    pub fn find(&mut self, key: impl Into<Value>) -> Result<Option<Row>, Error> {
        let query = Query::new()
            .where_eq(self.schema.primary_key(), key)
            .limit(1);
        Ok(self.select(&query)?.into_iter().next())
    }

    /// Insert rows; returns the number of inserted rows.
    ///
    /// Fields unknown to the schema are collected into the dynamic property
    /// when the schema has one.
    pub fn insert(&mut self, rows: Vec<Row>) -> Result<usize, Error> {
        let rows = rows
            .into_iter()
            .map(|row| self.encode(row))
            .collect::<Result<Vec<_>, _>>()?;
        self.driver.insert(self.schema.name(), &rows)
    }

    /// Update rows matching every condition.
    pub fn update(&mut self, values: Row, conditions: &Row) -> Result<usize, Error> {
        for field in conditions.keys() {
            self.check_field(field)?;
        }
        let values = self.encode(values)?;
        self.driver.update(self.schema.name(), &values, conditions)
    }

    /// Delete rows matching every condition.
    pub fn delete(&mut self, conditions: &Row) -> Result<usize, Error> {
        for field in conditions.keys() {
            self.check_field(field)?;
        }
        self.driver.delete(self.schema.name(), conditions)
    }

    fn check_field(&self, field: &str) -> Result<(), Error> {
        if self.schema.property_exists(field) {
            Ok(())
        } else {
            Err(Error::unknown(self.schema.name(), field))
        }
    }

    fn encode(&self, row: Row) -> Result<Row, Error> {
        let dynamic = self.schema.features().dynamic.as_deref();
        let mut encoded = Row::new();
        let mut extra = Map::new();

        for (field, value) in row {
            if self.schema.property_exists(&field) {
                encoded.insert(field, value);
            } else if dynamic.is_some() {
                extra.insert(field, value);
            } else {
                return Err(Error::unknown(self.schema.name(), field));
            }
        }

        if let (Some(dynamic), false) = (dynamic, extra.is_empty()) {
            let mut merged = match encoded.remove(dynamic) {
                Some(Value::Object(existing)) => existing,
                Some(Value::Null) | None => Map::new(),
                Some(other) => {
                    return Err(Error::InvalidSchema(format!(
                        "dynamic property '{}' holds {} instead of an object",
                        dynamic, other
                    )))
                }
            };
            merged.extend(extra);
            encoded.insert(dynamic.to_string(), Value::Object(merged));
        }
        Ok(encoded)
    }

    fn decode(&self, row: Row) -> Row {
        decode_row(&self.schema, row)
    }
}

/// Turn stored column values back into the values callers wrote: JSON text
/// of arrays and objects is parsed, booleans come back from `0`/`1`.
pub(crate) fn decode_row(schema: &Schema, mut row: Row) -> Row {
    for property in schema.properties() {
        if let Some(value) = row.get_mut(property.name()) {
            decode_value(property.kind(), value);
        }
    }
    row
}

pub(crate) fn decode_value(kind: PropertyKind, value: &mut Value) {
    let decoded = match (kind, &*value) {
        (kind, Value::String(text)) if kind.is_structured() => serde_json::from_str::<Value>(text).ok(),
        (PropertyKind::Boolean, Value::Number(n)) => Some(Value::Bool(n.as_i64() != Some(0))),
        _ => None,
    };
    if let Some(decoded) = decoded {
        *value = decoded;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::SqliteDriver;
    use crate::migration::{DeclareProperties, SchemaBuilder};
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn setup(dynamic: Option<&str>) -> (SqliteDriver, Arc<Schema>) {
        let mut driver = SqliteDriver::open_in_memory().unwrap();
        let mut builder = SchemaBuilder::new("settings");
        builder.primary_key("id", crate::catalog::PrimaryKeyFormat::Id);
        builder.string("key").unwrap().required();
        builder.boolean("enabled").unwrap().default(false);
        builder.array("tags").unwrap();
        if let Some(name) = dynamic {
            builder.object(name).unwrap();
            builder.features.dynamic = Some(name.to_string());
        }
        driver.create_schema(&builder).unwrap();
        let schema = Arc::new(Schema::from_json(&builder.to_json(false).unwrap()).unwrap());
        (driver, schema)
    }

    #[test]
    fn test_insert_and_select_decodes() {
        let (mut driver, schema) = setup(None);
        let mut repo = Repository::new(&mut driver, schema);

        let count = repo
            .insert(vec![row(json!({"key": "a", "enabled": true, "tags": ["x", "y"]}))])
            .unwrap();
        assert_eq!(count, 1);

        let found = repo.find(1).unwrap().unwrap();
        assert_eq!(found["enabled"], json!(true));
        assert_eq!(found["tags"], json!(["x", "y"]));
        assert!(repo.find(2).unwrap().is_none());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let (mut driver, schema) = setup(None);
        let mut repo = Repository::new(&mut driver, schema);

        let err = repo.insert(vec![row(json!({"key": "a", "color": "red"}))]).unwrap_err();
        assert!(matches!(err, Error::UnknownProperty { ref property, .. } if property == "color"));

        let err = repo.select(&Query::new().where_eq("color", "red")).unwrap_err();
        assert!(matches!(err, Error::UnknownProperty { .. }));

        let err = repo.delete(&row(json!({"color": "red"}))).unwrap_err();
        assert!(matches!(err, Error::UnknownProperty { .. }));
    }

    #[test]
    fn test_dynamic_property_collects_unknown_fields() {
        let (mut driver, schema) = setup(Some("document"));
        let mut repo = Repository::new(&mut driver, schema);

        repo.insert(vec![row(json!({"key": "a", "someColumn": "value"}))])
            .unwrap();
        let rows = repo.select(&Query::new().where_eq("key", "a")).unwrap();
        assert_eq!(rows[0]["document"], json!({"someColumn": "value"}));
    }

    #[test]
    fn test_update_and_delete() {
        let (mut driver, schema) = setup(None);
        let mut repo = Repository::new(&mut driver, schema);
        repo.insert(vec![row(json!({"key": "a"})), row(json!({"key": "b"}))])
            .unwrap();

        let changed = repo
            .update(row(json!({"enabled": true})), &row(json!({"key": "b"})))
            .unwrap();
        assert_eq!(changed, 1);
        assert_eq!(repo.delete(&row(json!({"key": "a"}))).unwrap(), 1);

        let rows = repo.select(&Query::new()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["enabled"], json!(true));
    }
}
