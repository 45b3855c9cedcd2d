//! # Metadata Values and Conditions
//!
//! Scalar values stored in metadata dictionaries, and the comparison rules every backend
//! applies when evaluating query conditions.
//!
//! ## Comparison rules
//!
//! - `Integer` and `Double` compare numerically with each other
//! - `String`, `Boolean` and `Timestamp` compare only with their own kind
//! - Values of different kinds are incomparable; a condition over them never matches
//! - A condition on a missing field never matches

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reserved field naming the backend-generated message id.
pub const ID_FIELD: &str = "_id";

/// Reserved field naming the backend-generated creation timestamp.
pub const CREATION_TIME_FIELD: &str = "creation_time";

/// Returns true for field names owned by the backend rather than by user metadata.
pub fn is_reserved_field(name: &str) -> bool {
    name == ID_FIELD || name == CREATION_TIME_FIELD
}

/// A scalar metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MetadataValue {
    String(String),
    Integer(i64),
    Double(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
}

impl MetadataValue {
    /// Stable name of the value kind, as persisted by backends.
    pub fn kind(&self) -> &'static str {
        match self {
            MetadataValue::String(_) => "string",
            MetadataValue::Integer(_) => "integer",
            MetadataValue::Double(_) => "double",
            MetadataValue::Boolean(_) => "boolean",
            MetadataValue::Timestamp(_) => "timestamp",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, MetadataValue::Integer(_) | MetadataValue::Double(_))
    }

    /// Compares two values under the query comparison rules.
    ///
    /// Returns `None` when the values are incomparable (different kinds, or NaN).
    pub fn compare(&self, other: &MetadataValue) -> Option<Ordering> {
        use MetadataValue::*;
        match (self, other) {
            (Integer(a), Integer(b)) => Some(a.cmp(b)),
            (Integer(a), Double(b)) => cmp_int_double(*a, *b),
            (Double(a), Integer(b)) => cmp_int_double(*b, *a).map(Ordering::reverse),
            (Double(a), Double(b)) => a.partial_cmp(b),
            (String(a), String(b)) => Some(a.cmp(b)),
            (Boolean(a), Boolean(b)) => Some(a.cmp(b)),
            (Timestamp(a), Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Total order used when sorting results by a field.
    ///
    /// Missing values sort first, then numbers (booleans and timestamps count as numbers,
    /// timestamps in microseconds), then strings.
    pub fn sort_cmp(a: Option<&MetadataValue>, b: Option<&MetadataValue>) -> Ordering {
        match (a, b) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => match (x.sort_key(), y.sort_key()) {
                (SortKey::Int(x), SortKey::Int(y)) => x.cmp(&y),
                (SortKey::Float(x), SortKey::Float(y)) => x
                    .partial_cmp(&y)
                    .unwrap_or_else(|| x.is_nan().cmp(&y.is_nan())),
                // NaN sorts after every other number.
                (SortKey::Int(x), SortKey::Float(y)) => {
                    cmp_int_double(x, y).unwrap_or(Ordering::Less)
                }
                (SortKey::Float(x), SortKey::Int(y)) => {
                    cmp_int_double(y, x).map_or(Ordering::Greater, Ordering::reverse)
                }
                (SortKey::Text(x), SortKey::Text(y)) => x.cmp(y),
                (SortKey::Text(_), _) => Ordering::Greater,
                (_, SortKey::Text(_)) => Ordering::Less,
            },
        }
    }

    fn sort_key(&self) -> SortKey<'_> {
        match self {
            MetadataValue::Integer(i) => SortKey::Int(*i),
            MetadataValue::Double(d) => SortKey::Float(*d),
            MetadataValue::Boolean(b) => SortKey::Int(i64::from(*b)),
            MetadataValue::Timestamp(t) => SortKey::Int(t.timestamp_micros()),
            MetadataValue::String(s) => SortKey::Text(s),
        }
    }
}

enum SortKey<'a> {
    Int(i64),
    Float(f64),
    Text(&'a str),
}

/// Exact comparison of an integer with a double; `None` only for NaN.
///
/// Casting the integer to `f64` loses precision above 2^53 and breaks transitivity, so the
/// double's integral part is compared first and its fraction decides ties.
fn cmp_int_double(i: i64, d: f64) -> Option<Ordering> {
    const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;
    if d.is_nan() {
        return None;
    }
    if d >= TWO_POW_63 {
        return Some(Ordering::Less);
    }
    if d < -TWO_POW_63 {
        return Some(Ordering::Greater);
    }

    let whole = d.trunc();
    match i.cmp(&(whole as i64)) {
        Ordering::Equal => 0.0_f64.partial_cmp(&(d - whole)),
        ordering => Some(ordering),
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::String(s) => write!(f, "{:?}", s),
            MetadataValue::Integer(i) => write!(f, "{}", i),
            MetadataValue::Double(d) => write!(f, "{}", d),
            MetadataValue::Boolean(b) => write!(f, "{}", b),
            MetadataValue::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::String(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Integer(value)
    }
}

impl From<i32> for MetadataValue {
    fn from(value: i32) -> Self {
        MetadataValue::Integer(value as i64)
    }
}

impl From<u32> for MetadataValue {
    fn from(value: u32) -> Self {
        MetadataValue::Integer(value as i64)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Double(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Boolean(value)
    }
}

impl From<DateTime<Utc>> for MetadataValue {
    fn from(value: DateTime<Utc>) -> Self {
        MetadataValue::Timestamp(value)
    }
}

/// Comparison operator of a query condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Comparison {
    /// Whether `field <op> value` holds given `field.compare(value)`.
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            Comparison::Eq => ordering == Ordering::Equal,
            Comparison::Lt => ordering == Ordering::Less,
            Comparison::Lte => ordering != Ordering::Greater,
            Comparison::Gt => ordering == Ordering::Greater,
            Comparison::Gte => ordering != Ordering::Less,
        }
    }
}

/// A single `field <op> value` predicate. Queries are conjunctions of conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: Comparison,
    pub value: MetadataValue,
}

impl Condition {
    pub fn new(field: impl Into<String>, op: Comparison, value: MetadataValue) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }

    /// Evaluates the condition against the field's value, if the record has one.
    pub fn matches(&self, candidate: Option<&MetadataValue>) -> bool {
        candidate
            .and_then(|v| v.compare(&self.value))
            .is_some_and(|ordering| self.op.holds(ordering))
    }
}
