//! Query Descriptors - the loosely shaped input accepted by mapper operations
//!
//! A descriptor is either shorthand (bare attribute keys meaning equality) or
//! structured (an explicit `where` and/or `*Join` keys). The variant is decided
//! once, when the descriptor is built; the normalizer turns both into one
//! canonical form.

use serde_json::{Map, Value as JsonValue};

use crate::error::{ModelError, ModelResult};

pub type JsonMap = Map<String, JsonValue>;

/// Top-level keys that never become predicates
pub const RESERVED_KEYS: &[&str] = &[
    "columns", "table", "type", "values", "where", "offset", "limit", "sort", "order", "groupBy",
    "include", "page", "pageSize",
];

pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// Whether a key marks a descriptor as already structured
pub fn is_structured_key(key: &str) -> bool {
    key == "where" || key.ends_with("Join")
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryDescriptor {
    /// Non-reserved keys are equality predicates
    Shorthand(JsonMap),
    /// Predicates live under `where`; other keys are left alone
    Structured(JsonMap),
}

impl Default for QueryDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryDescriptor {
    /// Empty structured descriptor
    pub fn new() -> Self {
        QueryDescriptor::Structured(JsonMap::new())
    }

    /// Classify a JSON object; `null` is an empty descriptor
    pub fn from_json(value: JsonValue) -> ModelResult<Self> {
        match value {
            JsonValue::Null => Ok(Self::new()),
            JsonValue::Object(map) => Ok(Self::from_map(map)),
            other => Err(ModelError::Query(format!(
                "Query descriptor must be an object, got {}",
                other
            ))),
        }
    }

    pub fn from_map(map: JsonMap) -> Self {
        if map.keys().any(|key| is_structured_key(key)) {
            QueryDescriptor::Structured(map)
        } else {
            QueryDescriptor::Shorthand(map)
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, QueryDescriptor::Structured(_))
    }

    pub fn as_map(&self) -> &JsonMap {
        match self {
            QueryDescriptor::Shorthand(map) | QueryDescriptor::Structured(map) => map,
        }
    }

    fn map_mut(&mut self) -> &mut JsonMap {
        match self {
            QueryDescriptor::Shorthand(map) | QueryDescriptor::Structured(map) => map,
        }
    }

    pub fn into_map(self) -> JsonMap {
        match self {
            QueryDescriptor::Shorthand(map) | QueryDescriptor::Structured(map) => map,
        }
    }

    /// Add an equality (or operator-object) predicate on `key`
    pub fn filter(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        let key = key.into();
        let value = value.into();
        match &mut self {
            QueryDescriptor::Shorthand(map) => {
                map.insert(key, value);
            }
            QueryDescriptor::Structured(map) => {
                let clause = map
                    .entry("where")
                    .or_insert_with(|| JsonValue::Object(JsonMap::new()));
                match clause {
                    JsonValue::Object(clause) => {
                        clause.insert(key, value);
                    }
                    other => {
                        let mut clause = JsonMap::new();
                        clause.insert(key, value);
                        *other = JsonValue::Object(clause);
                    }
                }
            }
        }
        self
    }

    /// Load the relation under `alias` alongside each result
    pub fn include(mut self, alias: &str) -> Self {
        let map = self.map_mut();
        let merged = match map.get("include").and_then(JsonValue::as_str) {
            Some(existing) if !existing.is_empty() => format!("{},{}", existing, alias),
            _ => alias.to_string(),
        };
        map.insert("include".to_string(), JsonValue::String(merged));
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.map_mut().insert("limit".to_string(), limit.into());
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.map_mut().insert("offset".to_string(), offset.into());
        self
    }

    /// Page number (zero based) of `page_size` results
    pub fn page(mut self, page: i64, page_size: i64) -> Self {
        let map = self.map_mut();
        map.insert("page".to_string(), page.into());
        map.insert("pageSize".to_string(), page_size.into());
        self
    }

    /// Sort by `column`; a leading `-` sorts descending
    pub fn order_by(mut self, column: &str) -> Self {
        let map = self.map_mut();
        let merged = match map.get("order").and_then(JsonValue::as_str) {
            Some(existing) if !existing.is_empty() => format!("{},{}", existing, column),
            _ => column.to_string(),
        };
        map.insert("order".to_string(), JsonValue::String(merged));
        self
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<JsonValue> = columns
            .into_iter()
            .map(|c| JsonValue::String(c.into()))
            .collect();
        self.map_mut()
            .insert("columns".to_string(), JsonValue::Array(columns));
        self
    }
}

impl TryFrom<JsonValue> for QueryDescriptor {
    type Error = ModelError;

    fn try_from(value: JsonValue) -> ModelResult<Self> {
        Self::from_json(value)
    }
}
