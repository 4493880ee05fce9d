//! Driver-neutral cell values

use std::fmt;

use sqlx::any::{AnyArguments, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, Row, TypeInfo, ValueRef};

/// A single column value held by a rowset
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bytes(Vec<u8>),
    Bool(bool),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(s) => f.write_str(s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Decode every column of a row, in column order
pub(crate) fn decode_row(row: &AnyRow) -> Result<Vec<Value>, sqlx::Error> {
    (0..row.len()).map(|i| decode_column(row, i)).collect()
}

fn decode_column(row: &AnyRow, index: usize) -> Result<Value, sqlx::Error> {
    let type_name = {
        let raw = row.try_get_raw(index)?;
        let type_info = raw.type_info();
        // Any value refs never report NULL themselves; the type info does
        if raw.is_null() || type_info.is_null() {
            return Ok(Value::Null);
        }
        type_info.name().to_string()
    };

    // The Any driver rejects a decode when the column type is incompatible,
    // so the first matching Rust type wins.
    if let Ok(v) = row.try_get::<i64, _>(index) {
        return Ok(Value::Integer(v));
    }
    if let Ok(v) = row.try_get::<bool, _>(index) {
        return Ok(Value::Bool(v));
    }
    if let Ok(v) = row.try_get::<f64, _>(index) {
        return Ok(Value::Real(v));
    }
    if let Ok(v) = row.try_get::<String, _>(index) {
        return Ok(Value::Text(v));
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(index) {
        return Ok(Value::Bytes(v));
    }

    Err(sqlx::Error::ColumnDecode {
        index: index.to_string(),
        source: format!("unsupported column type {}", type_name).into(),
    })
}

/// Bind a value as the next positional parameter
pub(crate) fn bind_value<'q>(
    query: Query<'q, Any, AnyArguments<'q>>,
    value: &Value,
) -> Query<'q, Any, AnyArguments<'q>> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Integer(i) => query.bind(*i),
        Value::Real(r) => query.bind(*r),
        Value::Text(s) => query.bind(s.clone()),
        Value::Bytes(b) => query.bind(b.clone()),
        Value::Bool(b) => query.bind(*b),
    }
}

/// Bind every non-NULL value in order
///
/// Pairs with SQL built by [`Dialect::value_marker`](super::Dialect::value_marker),
/// which writes NULLs as literals instead of placeholders.
pub(crate) fn bind_values<'q, 'v>(
    mut query: Query<'q, Any, AnyArguments<'q>>,
    values: impl IntoIterator<Item = &'v Value>,
) -> Query<'q, Any, AnyArguments<'q>> {
    for value in values {
        if !value.is_null() {
            query = bind_value(query, value);
        }
    }
    query
}
