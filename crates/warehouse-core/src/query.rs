//! # Query
//!
//! Backend-constructed predicate objects. A query is a conjunction of [`Condition`]s; the
//! backend decides how to evaluate it (in process, compiled to SQL, ...).
//!
//! Queries are obtained from [`crate::MessageCollection::create_query`] and can be reused
//! across any number of calls.

use std::fmt;

use crate::value::{Comparison, Condition, MetadataValue};

/// Predicate builder implemented by each backend.
pub trait Query: Clone + fmt::Debug + Send + Sync + 'static {
    /// Adds a condition; all conditions of a query must hold for a record to match.
    fn append_condition(&mut self, condition: Condition);

    /// Requires `field == value`.
    fn append(&mut self, field: &str, value: impl Into<MetadataValue>) -> &mut Self {
        self.append_condition(Condition::new(field, Comparison::Eq, value.into()));
        self
    }

    fn append_lt(&mut self, field: &str, value: impl Into<MetadataValue>) -> &mut Self {
        self.append_condition(Condition::new(field, Comparison::Lt, value.into()));
        self
    }

    fn append_lte(&mut self, field: &str, value: impl Into<MetadataValue>) -> &mut Self {
        self.append_condition(Condition::new(field, Comparison::Lte, value.into()));
        self
    }

    fn append_gt(&mut self, field: &str, value: impl Into<MetadataValue>) -> &mut Self {
        self.append_condition(Condition::new(field, Comparison::Gt, value.into()));
        self
    }

    fn append_gte(&mut self, field: &str, value: impl Into<MetadataValue>) -> &mut Self {
        self.append_condition(Condition::new(field, Comparison::Gte, value.into()));
        self
    }

    /// Requires `lower < field < upper`.
    fn append_range(
        &mut self,
        field: &str,
        lower: impl Into<MetadataValue>,
        upper: impl Into<MetadataValue>,
    ) -> &mut Self {
        self.append_gt(field, lower).append_lt(field, upper)
    }

    /// Requires `lower <= field <= upper`.
    fn append_range_inclusive(
        &mut self,
        field: &str,
        lower: impl Into<MetadataValue>,
        upper: impl Into<MetadataValue>,
    ) -> &mut Self {
        self.append_gte(field, lower).append_lte(field, upper)
    }
}
