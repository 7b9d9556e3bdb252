//! Schema editor - a diff session against an existing schema snapshot.
//!
//! The editor records structural operations (rename, replace, remove) in
//! order, next to a list of newly added properties. The resulting schema is
//! computed by [`SchemaEditor::resolve_final_properties`], independent of how a
//! backend physically reaches it.

use super::builder::{DeclareProperties, SchemaBuilder};
use crate::catalog::{FeatureFlags, PrimaryKeyFormat, Property, Schema, SchemaDocument};
use crate::driver::Row;
use crate::error::Error;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Row-level value converter used by a replace operation.
///
/// Receives the old value and the full original row, returns the new value.
/// Values arrive decoded the way a repository returns them: booleans as
/// booleans, arrays and objects parsed.
pub type Converter = Box<dyn Fn(&Value, &Row) -> Result<Value, String>>;

/// A recorded structural change.
pub enum DiffOp {
    /// Rename a column, keeping its data.
    Rename {
        /// Existing property name.
        from: String,
        /// New property name.
        to: String,
    },
    /// Move data from one property into another, optionally converting each
    /// value. `from == to` marks an in-place redefinition.
    Replace {
        /// Existing property name.
        from: String,
        /// Target property name.
        to: String,
        /// Optional per-row converter.
        converter: Option<Converter>,
    },
    /// Drop a property.
    Remove {
        /// Property name.
        name: String,
    },
}

impl fmt::Debug for DiffOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffOp::Rename { from, to } => f
                .debug_struct("Rename")
                .field("from", from)
                .field("to", to)
                .finish(),
            DiffOp::Replace { from, to, converter } => f
                .debug_struct("Replace")
                .field("from", from)
                .field("to", to)
                .field("converter", &converter.is_some())
                .finish(),
            DiffOp::Remove { name } => f.debug_struct("Remove").field("name", name).finish(),
        }
    }
}

/// A diff session against an existing schema snapshot.
pub struct SchemaEditor {
    original: Arc<Schema>,
    created: Option<String>,
    updated: Option<String>,
    added: Vec<Property>,
    edited: Vec<Property>,
    ops: Vec<DiffOp>,
    /// New unique groups, tagged with the number of ops recorded before them.
    uniques: Vec<(usize, Vec<String>)>,
}

impl SchemaEditor {
    /// Start a diff session against a snapshot.
    pub fn new(original: Arc<Schema>) -> Self {
        Self {
            created: original.created().map(String::from),
            updated: original.updated().map(String::from),
            original,
            added: Vec::new(),
            edited: Vec::new(),
            ops: Vec::new(),
            uniques: Vec::new(),
        }
    }

    /// The snapshot this session edits.
    pub fn original(&self) -> &Schema {
        &self.original
    }

    /// Collection name.
    pub fn name(&self) -> &str {
        self.original.name()
    }

    /// Primary key column name.
    pub fn primary_key(&self) -> &str {
        self.original.primary_key()
    }

    /// Primary key format.
    pub fn primary_key_format(&self) -> PrimaryKeyFormat {
        self.original.primary_key_format()
    }

    /// Feature flags.
    pub fn features(&self) -> &FeatureFlags {
        self.original.features()
    }

    /// Resulting creation timestamp column.
    pub fn created(&self) -> Option<&str> {
        self.created.as_deref()
    }

    /// Resulting update timestamp column.
    pub fn updated(&self) -> Option<&str> {
        self.updated.as_deref()
    }

    /// Newly added properties in declaration order.
    pub fn added(&self) -> &[Property] {
        &self.added
    }

    /// Properties redefined in place.
    pub fn edited(&self) -> &[Property] {
        &self.edited
    }

    /// The redefinition of an existing property, if it was edited.
    pub fn edited_property(&self, name: &str) -> Option<&Property> {
        self.edited.iter().find(|p| p.name() == name)
    }

    /// Recorded operations in order.
    pub fn operations(&self) -> &[DiffOp] {
        &self.ops
    }

    /// Change or clear the creation timestamp column.
    pub fn set_created(&mut self, name: Option<&str>) -> Result<&mut Self, Error> {
        if let Some(name) = name {
            if self.created.as_deref() != Some(name) && self.property_exists(name) {
                return Err(Error::duplicate(self.name(), name));
            }
        }
        self.created = name.map(String::from);
        Ok(self)
    }

    /// Change or clear the update timestamp column.
    pub fn set_updated(&mut self, name: Option<&str>) -> Result<&mut Self, Error> {
        if let Some(name) = name {
            if self.updated.as_deref() != Some(name) && self.property_exists(name) {
                return Err(Error::duplicate(self.name(), name));
            }
        }
        self.updated = name.map(String::from);
        Ok(self)
    }

    /// Redefine an existing property in place.
    ///
    /// Returns a clone of the original definition; the clone replaces the
    /// original once the session is applied.
    pub fn edit_property(&mut self, name: &str) -> Result<&mut Property, Error> {
        if !self.is_original_live(name) {
            return Err(Error::unknown(self.name(), name));
        }

        let index = match self.edited.iter().position(|p| p.name() == name) {
            Some(index) => index,
            None => {
                let property = self
                    .original
                    .property(name)
                    .cloned()
                    .ok_or_else(|| Error::unknown(self.original.name(), name))?;
                self.ops.push(DiffOp::Replace {
                    from: name.to_string(),
                    to: name.to_string(),
                    converter: None,
                });
                self.edited.push(property);
                self.edited.len() - 1
            }
        };
        Ok(&mut self.edited[index])
    }

    /// Rename an existing property.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<&mut Self, Error> {
        if !self.is_original_live(from) {
            return Err(Error::unknown(self.name(), from));
        }
        if self.property_exists(to) {
            return Err(Error::duplicate(self.name(), to));
        }
        self.ops.push(DiffOp::Rename {
            from: from.to_string(),
            to: to.to_string(),
        });
        Ok(self)
    }

    /// Move the data of an existing property into a newly added one.
    pub fn replace(&mut self, from: &str, to: &str) -> Result<&mut Self, Error> {
        self.record_replace(from, to, None)
    }

    /// Move the data of an existing property into a newly added one,
    /// converting every value.
    pub fn replace_with<F>(&mut self, from: &str, to: &str, converter: F) -> Result<&mut Self, Error>
    where
        F: Fn(&Value, &Row) -> Result<Value, String> + 'static,
    {
        self.record_replace(from, to, Some(Box::new(converter)))
    }

    fn record_replace(
        &mut self,
        from: &str,
        to: &str,
        converter: Option<Converter>,
    ) -> Result<&mut Self, Error> {
        if !self.is_original_live(from) {
            return Err(Error::unknown(self.name(), from));
        }
        let live = self.live_names();
        if from == to || !self.added.iter().any(|p| p.name() == to) || !live.iter().any(|n| n == to) {
            return Err(Error::unknown(self.name(), to));
        }
        self.ops.push(DiffOp::Replace {
            from: from.to_string(),
            to: to.to_string(),
            converter,
        });
        Ok(self)
    }

    /// Remove a property. Properties added earlier in the same session may
    /// be removed as well.
    pub fn remove(&mut self, name: &str) -> Result<&mut Self, Error> {
        if !self.live_names().iter().any(|n| n == name) {
            return Err(Error::unknown(self.name(), name));
        }
        self.ops.push(DiffOp::Remove {
            name: name.to_string(),
        });
        Ok(self)
    }

    /// Declare a unique index over properties of the resulting schema.
    pub fn unique_index(&mut self, names: &[&str]) -> Result<&mut Self, Error> {
        let live = self.live_names();
        for name in names {
            if !live.iter().any(|n| n == name) {
                return Err(Error::unknown(self.name(), *name));
            }
        }
        self.uniques
            .push((self.ops.len(), names.iter().map(|n| n.to_string()).collect()));
        Ok(self)
    }

    /// Check whether the session changes nothing.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.ops.is_empty()
            && self.uniques.is_empty()
            && self.created.as_deref() == self.original.created()
            && self.updated.as_deref() == self.original.updated()
    }

    /// Compute the resulting property set: original properties followed by
    /// added ones, with every recorded operation applied in order.
    pub fn resolve_final_properties(&self) -> Vec<Property> {
        let mut properties: Vec<Property> = self
            .original
            .properties()
            .iter()
            .chain(self.added.iter())
            .cloned()
            .collect();

        for op in &self.ops {
            match op {
                DiffOp::Rename { from, to } => {
                    if let Some(property) = properties.iter_mut().find(|p| p.name() == from) {
                        *property = property.renamed(to.as_str());
                    }
                }
                DiffOp::Replace { from, to, .. } if from == to => {
                    if let (Some(slot), Some(edited)) = (
                        properties.iter_mut().find(|p| p.name() == from),
                        self.edited.iter().find(|p| p.name() == from),
                    ) {
                        *slot = edited.clone();
                    }
                }
                DiffOp::Replace { from, .. } | DiffOp::Remove { name: from } => {
                    properties.retain(|p| p.name() != from);
                }
            }
        }

        properties
    }

    /// Unique groups of the resulting schema. Renames are followed; groups
    /// that refer to a replaced or removed property are dropped.
    pub fn resolved_uniques(&self) -> Vec<Vec<String>> {
        self.resolve_uniques().into_iter().map(|(group, _)| group).collect()
    }

    /// Unique groups that did not exist on the original schema.
    pub fn added_uniques(&self) -> Vec<Vec<String>> {
        self.resolve_uniques()
            .into_iter()
            .filter(|(_, added)| *added)
            .map(|(group, _)| group)
            .collect()
    }

    fn resolve_uniques(&self) -> Vec<(Vec<String>, bool)> {
        let mut groups: Vec<(Vec<String>, bool)> = self
            .original
            .uniques()
            .iter()
            .map(|g| (g.clone(), false))
            .collect();
        let mut pending = self.uniques.iter().peekable();

        for (position, op) in self.ops.iter().enumerate() {
            while let Some((_, group)) = pending.next_if(|(at, _)| *at <= position) {
                groups.push((group.clone(), true));
            }
            if let DiffOp::Rename { from, to } = op {
                for (group, _) in groups.iter_mut() {
                    for name in group.iter_mut() {
                        if name == from {
                            *name = to.clone();
                        }
                    }
                }
            }
        }
        groups.extend(pending.map(|(_, group)| (group.clone(), true)));

        let live = self.live_names();
        groups.retain(|(group, _)| group.iter().all(|name| live.contains(name)));
        groups
    }

    /// Materialize the resulting schema as a builder, optionally under a
    /// different collection name.
    pub fn to_builder(&self, name: Option<&str>) -> SchemaBuilder {
        let original = &self.original;
        let mut template = SchemaBuilder::new(name.unwrap_or(original.name()));
        template.driver = original.driver().to_string();
        template.id = Some(original.id().to_string());
        template.title = Some(original.title().to_string());
        template.description = Some(original.description().to_string());
        template.primary_key = original.primary_key().to_string();
        template.primary_key_format = original.primary_key_format();
        template.created = self.created.clone();
        template.updated = self.updated.clone();
        template.features = original.features().clone();

        SchemaBuilder::from_parts(
            template,
            self.resolve_final_properties(),
            self.resolved_uniques(),
        )
    }

    /// Produce the canonical document of the resulting schema.
    pub fn to_document(&self) -> Result<SchemaDocument, Error> {
        self.to_builder(None).to_document()
    }

    fn live_names(&self) -> Vec<String> {
        self.resolve_final_properties()
            .into_iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    fn is_original_live(&self, name: &str) -> bool {
        self.original.property(name).is_some() && self.live_names().iter().any(|n| n == name)
    }
}

impl DeclareProperties for SchemaEditor {
    fn schema_name(&self) -> &str {
        self.original.name()
    }

    fn property_exists(&self, name: &str) -> bool {
        self.original.primary_key() == name
            || self.created.as_deref() == Some(name)
            || self.updated.as_deref() == Some(name)
            || self.original.property(name).is_some()
            || self.added.iter().any(|p| p.name() == name)
            || self.live_names().iter().any(|n| n == name)
    }

    fn insert_property(&mut self, property: Property) -> &mut Property {
        self.added.push(property);
        let last = self.added.len() - 1;
        &mut self.added[last]
    }
}

impl fmt::Debug for SchemaEditor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaEditor")
            .field("name", &self.name())
            .field("created", &self.created)
            .field("updated", &self.updated)
            .field("added", &self.added)
            .field("ops", &self.ops)
            .finish()
    }
}
