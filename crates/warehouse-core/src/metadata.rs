//! # Metadata
//!
//! Backend-constructed key/value dictionaries attached to stored messages.
//!
//! The same type serves two roles:
//! - attributes attached at insert time
//! - a patch for `modify_metadata`, merged into the stored dictionary (keys absent from the
//!   patch are left untouched)

use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::{Result, WarehouseError};
use crate::value::{is_reserved_field, MetadataValue};

/// Key/value dictionary implemented by each backend.
pub trait Metadata: Clone + fmt::Debug + Send + Sync + 'static {
    /// Sets `name` to `value`, replacing any previous value.
    fn set_value(&mut self, name: &str, value: MetadataValue);

    fn get(&self, name: &str) -> Option<MetadataValue>;

    /// All keys, sorted.
    fn field_names(&self) -> Vec<String>;

    /// Builder-style [`Metadata::set_value`].
    fn append(&mut self, name: &str, value: impl Into<MetadataValue>) -> &mut Self {
        self.set_value(name, value.into());
        self
    }

    fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    fn is_empty(&self) -> bool {
        self.field_names().is_empty()
    }

    fn lookup_string(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            MetadataValue::String(s) => Some(s),
            _ => None,
        }
    }

    fn lookup_int(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            MetadataValue::Integer(i) => Some(i),
            _ => None,
        }
    }

    /// Integers widen to `f64`.
    fn lookup_double(&self, name: &str) -> Option<f64> {
        match self.get(name)? {
            MetadataValue::Double(d) => Some(d),
            MetadataValue::Integer(i) => Some(i as f64),
            _ => None,
        }
    }

    fn lookup_bool(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            MetadataValue::Boolean(b) => Some(b),
            _ => None,
        }
    }

    fn lookup_timestamp(&self, name: &str) -> Option<DateTime<Utc>> {
        match self.get(name)? {
            MetadataValue::Timestamp(t) => Some(t),
            _ => None,
        }
    }

    /// Key/value pairs in key order.
    fn entries(&self) -> Vec<(String, MetadataValue)> {
        self.field_names()
            .into_iter()
            .filter_map(|name| self.get(&name).map(|value| (name, value)))
            .collect()
    }

    /// Overwrites the keys present in `patch`, keeping every other key.
    fn merge(&mut self, patch: &Self) {
        for (name, value) in patch.entries() {
            self.set_value(&name, value);
        }
    }
}

/// Rejects metadata that uses a reserved field name or holds a non-finite double.
///
/// `_id` and `creation_time` are generated by the backend and cannot be set by callers.
/// NaN and infinities have no portable stored form and never compare equal to themselves.
pub fn validate_metadata<M: Metadata>(metadata: &M) -> Result<()> {
    for (name, value) in metadata.entries() {
        if is_reserved_field(&name) {
            return Err(WarehouseError::InvalidMetadata(format!(
                "field '{}' is reserved",
                name
            )));
        }
        if let MetadataValue::Double(d) = value {
            if !d.is_finite() {
                return Err(WarehouseError::InvalidMetadata(format!(
                    "field '{}' holds non-finite value {}",
                    name, d
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Debug, Clone, Default)]
    struct MapMetadata(BTreeMap<String, MetadataValue>);

    impl Metadata for MapMetadata {
        fn set_value(&mut self, name: &str, value: MetadataValue) {
            self.0.insert(name.to_string(), value);
        }

        fn get(&self, name: &str) -> Option<MetadataValue> {
            self.0.get(name).cloned()
        }

        fn field_names(&self) -> Vec<String> {
            self.0.keys().cloned().collect()
        }
    }

    #[test]
    fn test_typed_lookups() {
        let mut md = MapMetadata::default();
        md.append("robot", "r2")
            .append("n", 3)
            .append("temp", 21.5)
            .append("active", true);

        assert_eq!(md.lookup_string("robot").as_deref(), Some("r2"));
        assert_eq!(md.lookup_int("n"), Some(3));
        assert_eq!(md.lookup_double("n"), Some(3.0));
        assert_eq!(md.lookup_double("temp"), Some(21.5));
        assert_eq!(md.lookup_bool("active"), Some(true));
        assert_eq!(md.lookup_int("robot"), None);
        assert_eq!(md.lookup_string("missing"), None);
        assert!(md.contains("temp"));
        assert_eq!(md.field_names(), vec!["active", "n", "robot", "temp"]);
    }

    #[test]
    fn test_merge_keeps_untouched_keys() {
        let mut stored = MapMetadata::default();
        stored.append("a", 1).append("b", "x");

        let mut patch = MapMetadata::default();
        patch.append("b", "y").append("c", false);

        stored.merge(&patch);

        assert_eq!(stored.lookup_int("a"), Some(1));
        assert_eq!(stored.lookup_string("b").as_deref(), Some("y"));
        assert_eq!(stored.lookup_bool("c"), Some(false));
    }

    #[test]
    fn test_validate_metadata_rejects_reserved_fields() {
        let mut md = MapMetadata::default();
        md.append("robot", "r2");
        assert!(validate_metadata(&md).is_ok());

        md.append("_id", "forged");
        assert!(matches!(
            validate_metadata(&md),
            Err(WarehouseError::InvalidMetadata(_))
        ));
    }

    #[test]
    fn test_validate_metadata_rejects_non_finite_doubles() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let mut md = MapMetadata::default();
            md.append("x", bad);
            assert!(matches!(
                validate_metadata(&md),
                Err(WarehouseError::InvalidMetadata(_))
            ));
        }

        let mut md = MapMetadata::default();
        md.append("x", 0.0).append("y", -1.5e300);
        assert!(validate_metadata(&md).is_ok());
    }
}
