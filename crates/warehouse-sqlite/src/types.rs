//! Query and metadata objects of the SQLite backend.
//!
//! Queries are compiled to SQL only when they are executed, so one query object can be
//! reused across collections.

use std::collections::BTreeMap;

use warehouse_core::{Condition, Metadata, MetadataValue, Query};

#[derive(Debug, Clone, Default)]
pub struct SqliteQuery {
    conditions: Vec<Condition>,
}

impl SqliteQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }
}

impl Query for SqliteQuery {
    fn append_condition(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }
}

/// Metadata dictionary; persisted one row per key in `message_metadata`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqliteMetadata {
    fields: BTreeMap<String, MetadataValue>,
}

impl SqliteMetadata {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Metadata for SqliteMetadata {
    fn set_value(&mut self, name: &str, value: MetadataValue) {
        self.fields.insert(name.to_string(), value);
    }

    fn get(&self, name: &str) -> Option<MetadataValue> {
        self.fields.get(name).cloned()
    }

    fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    fn entries(&self) -> Vec<(String, MetadataValue)> {
        self.fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
