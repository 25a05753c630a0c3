//! Conversion between record values and SQLite values.

use recordkit_core::Value;
use rusqlite::types::{Value as SqlValue, ValueRef};

/// Converts a record value into an owned SQLite value for binding.
pub(crate) fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Real(r) => SqlValue::Real(*r),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Blob(b) => SqlValue::Blob(b.clone()),
    }
}

/// Converts a borrowed column value from a result row.
///
/// Text that is not valid UTF-8 is decoded lossily.
pub(crate) fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(r) => Value::Real(r),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
    }
}

/// Binds a parameter list.
pub(crate) fn to_sql_params(params: &[Value]) -> Vec<SqlValue> {
    params.iter().map(to_sql).collect()
}
