use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Value as SqlValue, ValueRef};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, StoreError};

pub const ID: &str = "id";
pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

/// Storage class of a column, used to move values between JSON field maps
/// and SQLite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Real,
    /// Stored as 0/1.
    Bool,
    /// Any JSON document, stored as text.
    Json,
    /// UTC instant, stored as fixed-width RFC 3339 text so that string order
    /// matches time order.
    Timestamp,
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
}

impl Column {
    pub const fn new(name: &'static str, kind: ColumnKind) -> Self {
        Self { name, kind }
    }
}

/// A persisted row with identity and audit timestamps.
///
/// `COLUMNS` must contain `id`, `created_at` and `updated_at`, and its names
/// must match the serde field names of the implementing type.
pub trait Entity: Serialize + DeserializeOwned {
    const TABLE: &'static str;
    const COLUMNS: &'static [Column];

    fn id(&self) -> &str;

    fn column(name: &str) -> Option<&'static Column> {
        Self::COLUMNS.iter().find(|c| c.name == name)
    }

    fn to_map(&self) -> Result<Map<String, Value>> {
        into_field_map(self)
    }

    fn from_map(map: Map<String, Value>) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(map))?)
    }
}

/// Serialize any payload into a plain field → value map.
pub fn into_field_map<T: Serialize + ?Sized>(value: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Validation(format!(
            "expected a field map, got {}",
            json_type_name(&other)
        ))),
    }
}

/// Canonical stored form of a timestamp.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Convert a JSON field value into the SQLite value for `column`.
pub fn to_sql(column: &Column, value: &Value) -> Result<SqlValue> {
    if value.is_null() {
        return Ok(SqlValue::Null);
    }
    let converted = match (column.kind, value) {
        (ColumnKind::Text, Value::String(s)) => Some(SqlValue::Text(s.clone())),
        (ColumnKind::Timestamp, Value::String(s)) => {
            let at = DateTime::parse_from_rfc3339(s).map_err(|e| {
                StoreError::Validation(format!("{}: bad timestamp {s:?}: {e}", column.name))
            })?;
            Some(SqlValue::Text(format_timestamp(at.with_timezone(&Utc))))
        }
        (ColumnKind::Integer, Value::Number(n)) => n.as_i64().map(SqlValue::Integer),
        (ColumnKind::Real, Value::Number(n)) => n.as_f64().map(SqlValue::Real),
        (ColumnKind::Bool, Value::Bool(b)) => Some(SqlValue::Integer(i64::from(*b))),
        (ColumnKind::Json, v) => Some(SqlValue::Text(v.to_string())),
        _ => None,
    };
    converted.ok_or_else(|| {
        StoreError::Validation(format!(
            "{}: cannot store {} as {:?}",
            column.name,
            json_type_name(value),
            column.kind
        ))
    })
}

/// Convert a SQLite cell back into the JSON field value for `column`.
pub fn from_sql(column: &Column, cell: ValueRef<'_>) -> Result<Value> {
    let value = match (column.kind, cell) {
        (_, ValueRef::Null) => Value::Null,
        (ColumnKind::Json, ValueRef::Text(bytes)) => serde_json::from_slice(bytes)?,
        (ColumnKind::Bool, ValueRef::Integer(i)) => Value::Bool(i != 0),
        (ColumnKind::Real, ValueRef::Real(f)) => real(f),
        (ColumnKind::Real, ValueRef::Integer(i)) => real(i as f64),
        (ColumnKind::Integer, ValueRef::Integer(i)) => Value::from(i),
        (ColumnKind::Text | ColumnKind::Timestamp, ValueRef::Text(bytes)) => {
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
        (kind, other) => {
            return Err(StoreError::Validation(format!(
                "{}: unexpected {:?} cell for {:?} column",
                column.name,
                other.data_type(),
                kind
            )))
        }
    };
    Ok(value)
}

fn real(f: f64) -> Value {
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FLAG: Column = Column::new("is_used", ColumnKind::Bool);
    const DOC: Column = Column::new("processed", ColumnKind::Json);
    const AT: Column = Column::new("timestamp", ColumnKind::Timestamp);
    const NAME: Column = Column::new("name", ColumnKind::Text);

    #[test]
    fn bool_is_stored_as_integer() {
        assert_eq!(to_sql(&FLAG, &json!(true)).unwrap(), SqlValue::Integer(1));
        assert_eq!(
            from_sql(&FLAG, ValueRef::Integer(0)).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn json_documents_are_stored_as_text() {
        let doc = json!({"age": 31, "tags": ["a", "b"]});
        let SqlValue::Text(text) = to_sql(&DOC, &doc).unwrap() else {
            panic!("expected text");
        };
        assert_eq!(
            from_sql(&DOC, ValueRef::Text(text.as_bytes())).unwrap(),
            doc
        );
    }

    #[test]
    fn timestamps_are_normalised_to_utc() {
        let stored = to_sql(&AT, &json!("2024-03-01T14:00:00+02:00")).unwrap();
        assert_eq!(
            stored,
            SqlValue::Text("2024-03-01T12:00:00.000000000Z".to_string())
        );
    }

    #[test]
    fn mismatched_kinds_are_rejected() {
        let err = to_sql(&NAME, &json!(12)).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILED");
        assert!(to_sql(&AT, &json!("yesterday")).is_err());
    }

    #[test]
    fn null_passes_through_every_kind() {
        for col in [FLAG, DOC, AT, NAME] {
            assert_eq!(to_sql(&col, &Value::Null).unwrap(), SqlValue::Null);
        }
    }
}
