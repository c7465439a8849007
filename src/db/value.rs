//! Conversions between JSON values and SQLite values.
//!
//! BLOBs surface as arrays of byte values; arrays made only of byte values
//! bind back as BLOBs so exported rows re-import unchanged. Booleans bind as
//! 0/1 and other arrays or objects bind as their JSON text.

use rusqlite::types::{Value as SqlValue, ValueRef};
use serde_json::{Map, Number, Value};

/// One result row: column name to value, in column order.
pub type Row = Map<String, Value>;

pub fn to_sql(value: &Value) -> SqlValue {
  match value {
    Value::Null => SqlValue::Null,
    Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
    Value::Number(n) => match n.as_i64() {
      Some(i) => SqlValue::Integer(i),
      None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
    },
    Value::String(s) => SqlValue::Text(s.clone()),
    Value::Array(items) => match as_bytes(items) {
      Some(bytes) => SqlValue::Blob(bytes),
      None => SqlValue::Text(value.to_string()),
    },
    Value::Object(_) => SqlValue::Text(value.to_string()),
  }
}

fn as_bytes(items: &[Value]) -> Option<Vec<u8>> {
  if items.is_empty() {
    return None;
  }
  items
    .iter()
    .map(|v| v.as_u64().and_then(|n| u8::try_from(n).ok()))
    .collect()
}

pub fn from_sql(value: ValueRef<'_>) -> Value {
  match value {
    ValueRef::Null => Value::Null,
    ValueRef::Integer(i) => Value::from(i),
    ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
    ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
    ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
  }
}
