//! Core Database Backend Traits
//!
//! The connection capability the mapper issues statements through, and the
//! value/row types that cross it. Pool construction and concurrency control
//! belong to the implementation behind the trait.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value as JsonValue;

use crate::error::OrmResult;

/// Abstract database connection pool trait
#[async_trait]
pub trait DatabasePool: Send + Sync {
    /// Execute a statement with positional parameters and return its outcome
    async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<StatementOutcome>;
}

/// Column metadata reported alongside result rows
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    pub type_name: Option<String>,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: None,
        }
    }
}

/// Everything the driver reports for one statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementOutcome {
    pub rows: Vec<ResultRow>,
    pub columns: Vec<ColumnInfo>,
    pub rows_affected: u64,
    pub last_insert_id: Option<u64>,
}

impl StatementOutcome {
    /// Outcome of a read returning `rows`
    pub fn with_rows(rows: Vec<ResultRow>) -> Self {
        let columns = rows
            .first()
            .map(|row| row.column_names().map(ColumnInfo::new).collect())
            .unwrap_or_default();
        Self {
            rows,
            columns,
            ..Default::default()
        }
    }

    /// Outcome of a write that generated `id`
    pub fn inserted(id: u64) -> Self {
        Self {
            rows_affected: 1,
            last_insert_id: Some(id),
            ..Default::default()
        }
    }

    /// Outcome of a write touching `count` rows
    pub fn affected(count: u64) -> Self {
        Self {
            rows_affected: count,
            ..Default::default()
        }
    }
}

/// Flat result row: column name -> raw stored value, in driver order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultRow {
    columns: Vec<(String, DatabaseValue)>,
}

impl ResultRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column, replacing an earlier one with the same name
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<DatabaseValue>) {
        let name = name.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => self.columns.push((name, value)),
        }
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<DatabaseValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Get a column value by name
    pub fn get(&self, name: &str) -> Option<&DatabaseValue> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    }

    /// Column names in driver order
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DatabaseValue)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Convert row to a JSON object
    pub fn to_json(&self) -> JsonValue {
        let map = self
            .columns
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect();
        JsonValue::Object(map)
    }

    /// Convert row to HashMap
    pub fn to_map(&self) -> HashMap<String, DatabaseValue> {
        self.columns.iter().cloned().collect()
    }
}

impl<K: Into<String>> FromIterator<(K, DatabaseValue)> for ResultRow {
    fn from_iter<I: IntoIterator<Item = (K, DatabaseValue)>>(iter: I) -> Self {
        let mut row = ResultRow::new();
        for (name, value) in iter {
            row.insert(name, value);
        }
        row
    }
}

/// Database value enumeration for type-safe parameter binding
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
    Json(JsonValue),
}

impl DatabaseValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    /// SQL-style truthiness used when reading boolean columns
    pub fn is_truthy(&self) -> bool {
        match self {
            DatabaseValue::Null => false,
            DatabaseValue::Bool(b) => *b,
            DatabaseValue::Int64(i) => *i != 0,
            DatabaseValue::Float64(f) => *f != 0.0 && !f.is_nan(),
            DatabaseValue::String(s) => !s.is_empty(),
            DatabaseValue::Bytes(b) => !b.is_empty(),
            DatabaseValue::DateTime(_) | DatabaseValue::Date(_) | DatabaseValue::Json(_) => true,
        }
    }

    /// Integer view of the value, if it is one
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DatabaseValue::Int64(i) => Some(*i),
            DatabaseValue::Float64(f) if f.fract() == 0.0 => Some(*f as i64),
            DatabaseValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DatabaseValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Stable identity used to compare keys across rows (`7`, `7.0` and `"7"` agree)
    pub fn identity_key(&self) -> Option<String> {
        match self {
            DatabaseValue::Null => None,
            DatabaseValue::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
            DatabaseValue::Int64(i) => Some(i.to_string()),
            DatabaseValue::Float64(f) if f.fract() == 0.0 => Some((*f as i64).to_string()),
            DatabaseValue::String(s) => Some(s.clone()),
            other => Some(other.to_json().to_string()),
        }
    }

    /// Convert to JSON value
    pub fn to_json(&self) -> JsonValue {
        match self {
            DatabaseValue::Null => JsonValue::Null,
            DatabaseValue::Bool(b) => JsonValue::Bool(*b),
            DatabaseValue::Int64(i) => JsonValue::Number(serde_json::Number::from(*i)),
            DatabaseValue::Float64(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            DatabaseValue::String(s) => JsonValue::String(s.clone()),
            DatabaseValue::Bytes(b) => JsonValue::Array(
                b.iter()
                    .map(|&x| JsonValue::Number(serde_json::Number::from(x)))
                    .collect(),
            ),
            DatabaseValue::DateTime(dt) => JsonValue::String(dt.to_rfc3339()),
            DatabaseValue::Date(d) => JsonValue::String(d.to_string()),
            DatabaseValue::Json(j) => j.clone(),
        }
    }

    /// Create DatabaseValue from JSON value
    pub fn from_json(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => DatabaseValue::Null,
            JsonValue::Bool(b) => DatabaseValue::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    DatabaseValue::Int64(i)
                } else if let Some(f) = n.as_f64() {
                    DatabaseValue::Float64(f)
                } else {
                    DatabaseValue::Null
                }
            }
            JsonValue::String(s) => DatabaseValue::String(s),
            other @ (JsonValue::Array(_) | JsonValue::Object(_)) => DatabaseValue::Json(other),
        }
    }
}

impl fmt::Display for DatabaseValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseValue::Null => write!(f, "NULL"),
            DatabaseValue::String(s) => write!(f, "{}", s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<bool> for DatabaseValue {
    fn from(value: bool) -> Self {
        DatabaseValue::Bool(value)
    }
}

impl From<i32> for DatabaseValue {
    fn from(value: i32) -> Self {
        // past i64::MAX the exact digits survive as text
        i64::try_from(value)
            .map(DatabaseValue::Int64)
            .unwrap_or_else(|_| DatabaseValue::String(value.to_string()))
    }
}

impl From<i64> for DatabaseValue {
    fn from(value: i64) -> Self {
        DatabaseValue::Int64(value)
    }
}

impl From<u64> for DatabaseValue {
    fn from(value: u64) -> Self {
        // past i64::MAX the exact digits survive as text
        i64::try_from(value)
            .map(DatabaseValue::Int64)
            .unwrap_or_else(|_| DatabaseValue::String(value.to_string()))
    }
}

impl From<f64> for DatabaseValue {
    fn from(value: f64) -> Self {
        DatabaseValue::Float64(value)
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::String(value)
    }
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::String(value.to_string())
    }
}

impl From<Vec<u8>> for DatabaseValue {
    fn from(value: Vec<u8>) -> Self {
        DatabaseValue::Bytes(value)
    }
}

impl From<DateTime<Utc>> for DatabaseValue {
    fn from(value: DateTime<Utc>) -> Self {
        DatabaseValue::DateTime(value)
    }
}

impl From<NaiveDate> for DatabaseValue {
    fn from(value: NaiveDate) -> Self {
        DatabaseValue::Date(value)
    }
}

impl From<JsonValue> for DatabaseValue {
    fn from(value: JsonValue) -> Self {
        DatabaseValue::from_json(value)
    }
}

impl<T> From<Option<T>> for DatabaseValue
where
    T: Into<DatabaseValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => DatabaseValue::Null,
        }
    }
}

/// Database pool configuration
#[derive(Debug, Clone)]
pub struct DatabasePoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub idle_timeout_seconds: Option<u64>,
    pub max_lifetime_seconds: Option<u64>,
    pub test_before_acquire: bool,
}

impl Default for DatabasePoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_seconds: 30,
            idle_timeout_seconds: Some(600), // 10 minutes
            max_lifetime_seconds: Some(1800), // 30 minutes
            test_before_acquire: true,
        }
    }
}

/// Database connection configuration parsed from URL
#[derive(Debug, Clone)]
pub struct DatabaseConnectionConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub additional_params: HashMap<String, String>,
}
