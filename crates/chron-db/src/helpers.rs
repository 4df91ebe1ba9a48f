//! Row parsing and SQL building helpers.
//!
//! Every module converts between `chron_core::value::FieldValue` and
//! `libsql::Value` and builds statements over configured table names. These
//! helpers isolate that, plus the dual datetime format issue (`SQLite`'s
//! `datetime('now')` vs Rust's `to_rfc3339()`).

use chrono::{DateTime, Utc};
use chron_core::value::{FieldType, FieldValue};

use crate::error::DatabaseError;

/// Parse a required TEXT column as `DateTime<Utc>`.
///
/// Handles both RFC 3339 (`"2026-02-09T14:30:00+00:00"`) and `SQLite`'s default
/// format (`"2026-02-09 14:30:00"`).
///
/// # Errors
///
/// Returns `DatabaseError::Query` if the string cannot be parsed as either format.
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| DatabaseError::Query(format!("Failed to parse datetime '{s}': {e}")))
}

/// Quote an identifier for interpolation into SQL.
#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote and join a list of identifiers.
#[must_use]
pub fn quote_list<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    names
        .into_iter()
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(", ")
}

/// `"a" = ?{start} AND "b" = ?{start+1} ...`
#[must_use]
pub fn key_predicate<'a>(columns: impl IntoIterator<Item = &'a str>, start: usize) -> String {
    columns
        .into_iter()
        .enumerate()
        .map(|(i, col)| format!("{} = ?{}", quote_ident(col), start + i))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// `?1, ?2, ..., ?n`
#[must_use]
pub fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convert a field value into a libSQL parameter.
#[must_use]
pub fn to_sql_value(value: &FieldValue) -> libsql::Value {
    match value {
        FieldValue::Null => libsql::Value::Null,
        FieldValue::Boolean(b) => libsql::Value::Integer(i64::from(*b)),
        FieldValue::Integer(i) => libsql::Value::Integer(*i),
        FieldValue::Real(r) => libsql::Value::Real(*r),
        FieldValue::Text(s) => libsql::Value::Text(s.clone()),
        FieldValue::Blob(b) => libsql::Value::Blob(b.clone()),
    }
}

/// Read column `idx` and coerce it to the declared field type.
///
/// # Errors
///
/// Returns `DatabaseError` if the column read fails.
pub fn get_field(
    row: &libsql::Row,
    idx: i32,
    field_type: FieldType,
) -> Result<FieldValue, DatabaseError> {
    let raw = match row.get_value(idx)? {
        libsql::Value::Null => FieldValue::Null,
        libsql::Value::Integer(i) => FieldValue::Integer(i),
        libsql::Value::Real(r) => FieldValue::Real(r),
        libsql::Value::Text(s) => FieldValue::Text(s),
        libsql::Value::Blob(b) => FieldValue::Blob(b),
    };
    Ok(field_type.coerce(raw))
}

/// Convert a column count into a statement parameter index.
pub(crate) fn param_index(n: usize) -> Result<i32, DatabaseError> {
    i32::try_from(n).map_err(|_| DatabaseError::InvalidState(format!("too many columns: {n}")))
}
