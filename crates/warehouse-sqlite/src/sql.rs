//! SQL generation and value encoding.
//!
//! Metadata values live in the untyped `message_metadata.value` column next to a `kind`
//! column:
//!
//! | kind | stored as |
//! |------|-----------|
//! | string | TEXT |
//! | integer | INTEGER |
//! | double | REAL |
//! | boolean | INTEGER 0/1 |
//! | timestamp | INTEGER microseconds since the epoch |
//!
//! Every metadata condition is guarded by the kinds it may compare with, so SQLite's
//! cross-type ordering never produces a match the in-process rules would reject.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite};
use warehouse_core::{
    Comparison, Condition, MetadataValue, Result, WarehouseError, CREATION_TIME_FIELD, ID_FIELD,
};

use crate::types::SqliteQuery;

pub(crate) type Statement<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// A bind parameter.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SqlParam {
    Text(String),
    Integer(i64),
    Real(f64),
}

pub(crate) fn bind_param<'q>(statement: Statement<'q>, param: &SqlParam) -> Statement<'q> {
    match param {
        SqlParam::Text(s) => statement.bind(s.clone()),
        SqlParam::Integer(i) => statement.bind(*i),
        SqlParam::Real(r) => statement.bind(*r),
    }
}

pub(crate) fn bind_params<'q>(statement: Statement<'q>, params: &[SqlParam]) -> Statement<'q> {
    params.iter().fold(statement, bind_param)
}

pub(crate) fn encode_value(value: &MetadataValue) -> SqlParam {
    match value {
        MetadataValue::String(s) => SqlParam::Text(s.clone()),
        MetadataValue::Integer(i) => SqlParam::Integer(*i),
        MetadataValue::Double(d) => SqlParam::Real(*d),
        MetadataValue::Boolean(b) => SqlParam::Integer(i64::from(*b)),
        MetadataValue::Timestamp(t) => SqlParam::Integer(t.timestamp_micros()),
    }
}

/// Decodes the `kind` and `value` columns of a `message_metadata` row.
pub(crate) fn decode_value(row: &SqliteRow) -> Result<MetadataValue> {
    let kind: String = row.try_get("kind").map_err(database_error)?;
    let value = match kind.as_str() {
        "string" => MetadataValue::String(stored_value(row, &kind)?),
        "integer" => MetadataValue::Integer(stored_value(row, &kind)?),
        "double" => MetadataValue::Double(stored_value(row, &kind)?),
        "boolean" => MetadataValue::Boolean(stored_value::<i64>(row, &kind)? != 0),
        "timestamp" => {
            let micros: i64 = stored_value(row, &kind)?;
            let time = DateTime::<Utc>::from_timestamp_micros(micros).ok_or_else(|| {
                WarehouseError::InvalidMetadata(format!("timestamp out of range: {}", micros))
            })?;
            MetadataValue::Timestamp(time)
        }
        other => {
            return Err(WarehouseError::InvalidMetadata(format!(
                "unknown metadata kind '{}'",
                other
            )))
        }
    };
    Ok(value)
}

/// The untyped `value` column; NULL is corrupt data, not a zero.
fn stored_value<'r, T>(row: &'r SqliteRow, kind: &str) -> Result<T>
where
    T: sqlx::Decode<'r, Sqlite>,
{
    let value: Option<T> = row.try_get_unchecked("value").map_err(database_error)?;
    value.ok_or_else(|| {
        WarehouseError::InvalidMetadata(format!("stored {} metadata value is NULL", kind))
    })
}

fn operator(op: Comparison) -> &'static str {
    match op {
        Comparison::Eq => "=",
        Comparison::Lt => "<",
        Comparison::Lte => "<=",
        Comparison::Gt => ">",
        Comparison::Gte => ">=",
    }
}

fn kind_guard(value: &MetadataValue) -> &'static str {
    match value {
        MetadataValue::Integer(_) | MetadataValue::Double(_) => "md.kind IN ('integer', 'double')",
        MetadataValue::String(_) => "md.kind = 'string'",
        MetadataValue::Boolean(_) => "md.kind = 'boolean'",
        MetadataValue::Timestamp(_) => "md.kind = 'timestamp'",
    }
}

/// A WHERE clause over `messages m` plus its bind parameters, in order.
#[derive(Debug, Clone)]
pub(crate) struct Filter {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

/// Compiles `query` into a filter over the rows of `collection`.
pub(crate) fn compile_filter(collection: &str, query: &SqliteQuery) -> Filter {
    let mut sql = String::from("m.collection = ?");
    let mut params = vec![SqlParam::Text(collection.to_string())];

    for condition in query.conditions() {
        sql.push_str(" AND ");
        compile_condition(condition, &mut sql, &mut params);
    }

    Filter { sql, params }
}

fn compile_condition(condition: &Condition, sql: &mut String, params: &mut Vec<SqlParam>) {
    let op = operator(condition.op);
    match (condition.field.as_str(), &condition.value) {
        (ID_FIELD, MetadataValue::String(id)) => {
            sql.push_str(&format!("m.id {} ?", op));
            params.push(SqlParam::Text(id.clone()));
        }
        (CREATION_TIME_FIELD, MetadataValue::Timestamp(t)) => {
            sql.push_str(&format!("m.creation_time {} ?", op));
            params.push(SqlParam::Integer(t.timestamp_micros()));
        }
        // Reserved fields only compare with their own kind.
        (ID_FIELD, _) | (CREATION_TIME_FIELD, _) => sql.push('0'),
        (field, value) => {
            sql.push_str(&format!(
                "EXISTS (SELECT 1 FROM message_metadata md WHERE md.seq = m.seq AND md.key = ? AND {} AND md.value {} ?)",
                kind_guard(value),
                op
            ));
            params.push(SqlParam::Text(field.to_string()));
            params.push(encode_value(value));
        }
    }
}

/// ORDER BY clause for `sort_by`; ties always fall back to insertion order.
pub(crate) fn compile_order(sort_by: &str, ascending: bool) -> (String, Vec<SqlParam>) {
    let direction = if ascending { "ASC" } else { "DESC" };
    match sort_by {
        "" => ("ORDER BY m.seq ASC".to_string(), Vec::new()),
        ID_FIELD => (format!("ORDER BY m.id {}, m.seq ASC", direction), Vec::new()),
        CREATION_TIME_FIELD => (
            format!("ORDER BY m.creation_time {}, m.seq ASC", direction),
            Vec::new(),
        ),
        field => (
            format!(
                "ORDER BY (SELECT s.value FROM message_metadata s WHERE s.seq = m.seq AND s.key = ?) {}, m.seq ASC",
                direction
            ),
            vec![SqlParam::Text(field.to_string())],
        ),
    }
}

/// `?, ?, ?` with `n` placeholders.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

pub(crate) fn database_error(e: sqlx::Error) -> WarehouseError {
    WarehouseError::Database(e.to_string())
}

pub(crate) fn write_error(e: sqlx::Error) -> WarehouseError {
    WarehouseError::Write(e.to_string())
}
