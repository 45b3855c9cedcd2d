//! Query and metadata objects of the in-memory backend.

use std::collections::BTreeMap;

use warehouse_core::{Condition, Metadata, MetadataValue, Query};

/// Conjunction of conditions evaluated in process.
#[derive(Debug, Clone, Default)]
pub struct InMemoryQuery {
    conditions: Vec<Condition>,
}

impl InMemoryQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }
}

impl Query for InMemoryQuery {
    fn append_condition(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }
}

/// Metadata dictionary kept as an ordered map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InMemoryMetadata {
    fields: BTreeMap<String, MetadataValue>,
}

impl InMemoryMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn value_ref(&self, name: &str) -> Option<&MetadataValue> {
        self.fields.get(name)
    }
}

impl Metadata for InMemoryMetadata {
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
