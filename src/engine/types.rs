//! Result types shared by the query engines.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Metadata about a column in a result set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name as reported by the engine.
    pub name: String,

    /// Engine type name (e.g. `bigint`, `double`, `varchar`).
    pub data_type: String,
}

impl ColumnInfo {
    /// Creates a new column info with the given name and type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// A row of data, aligned to the result columns.
pub type Row = Vec<Value>;

/// A single value from a result row.
///
/// Serializes untagged so that response rows read as plain JSON arrays.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Value {
    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Renders the value for tabular previews. NULL renders as an empty string.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
        }
    }

    /// Converts a JSON value returned by an HTTP engine.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            other => Value::String(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            other => f.write_str(&other.to_display_string()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

/// Identifies a statement submitted to an engine.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryHandle {
    /// Engine-assigned query id (or a local id for engines without one).
    pub id: String,

    /// The statement that was submitted.
    pub sql: String,

    /// Where to continue reading results, for paging engines.
    pub next_uri: Option<String>,

    /// Columns already known at submit time.
    pub columns: Vec<ColumnInfo>,

    /// Rows already returned by the submit call.
    pub prefetched: Vec<Row>,
}

impl QueryHandle {
    pub fn new(id: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sql: sql.into(),
            next_uri: None,
            columns: Vec::new(),
            prefetched: Vec::new(),
        }
    }
}

/// Rows read from an engine, capped at the requested maximum.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineOutput {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Row>,

    /// True if the engine had more rows than the cap.
    pub truncated: bool,

    /// Total rows produced by the query, when the engine knows it.
    pub total_rows: Option<usize>,
}

impl EngineOutput {
    /// Builds an output from a complete row set, applying the cap.
    pub fn capped(columns: Vec<ColumnInfo>, mut rows: Vec<Row>, max_rows: usize) -> Self {
        let total = rows.len();
        let truncated = total > max_rows;
        rows.truncate(max_rows);
        Self {
            columns,
            rows,
            truncated,
            total_rows: Some(total),
        }
    }
}
