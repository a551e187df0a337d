//! Model Definitions - table, primary key and attribute metadata
//!
//! A `ModelDefinition` is built once during setup and shared behind an `Arc`
//! by every query, hydrator and instance of that model.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backends::DatabaseValue;
use crate::relationships::inflection;

/// Semantic type of a model attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeType {
    String,
    Number,
    Boolean,
    Date,
    Json,
}

/// How a date attribute is represented in its column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DateStorage {
    /// ISO-8601 string (`DATETIME` columns written as text)
    Datetime,
    /// `YYYY-MM-DD HH:MM:SS` literal
    Timestamp,
    /// Integer seconds since the Unix epoch
    Epoch,
}

impl FromStr for DateStorage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "datetime" | "iso" => Ok(DateStorage::Datetime),
            "timestamp" => Ok(DateStorage::Timestamp),
            "epoch" | "integer" | "number" => Ok(DateStorage::Epoch),
            other => Err(format!("Unsupported date storage: {}", other)),
        }
    }
}

/// Custom storage formatter: takes precedence over every built-in coercion
pub type ValueFormatter =
    Arc<dyn Fn(&DatabaseValue, &ModelDefinition) -> DatabaseValue + Send + Sync>;

/// A single declared attribute
#[derive(Clone)]
pub struct AttributeDefinition {
    pub name: String,
    pub attribute_type: AttributeType,
    /// Storage column when it differs from the attribute name
    pub column_name: Option<String>,
    /// Date representation for this column (falls back to the mapper default)
    pub date_storage: Option<DateStorage>,
    pub formatter: Option<ValueFormatter>,
}

impl AttributeDefinition {
    pub fn new(name: impl Into<String>, attribute_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attribute_type,
            column_name: None,
            date_storage: None,
            formatter: None,
        }
    }

    /// Store this attribute under a different column name
    pub fn column(mut self, column_name: impl Into<String>) -> Self {
        self.column_name = Some(column_name.into());
        self
    }

    pub fn date_storage(mut self, storage: DateStorage) -> Self {
        self.date_storage = Some(storage);
        self
    }

    pub fn formatter<F>(mut self, formatter: F) -> Self
    where
        F: Fn(&DatabaseValue, &ModelDefinition) -> DatabaseValue + Send + Sync + 'static,
    {
        self.formatter = Some(Arc::new(formatter));
        self
    }

    /// Column this attribute is stored in
    pub fn storage_column(&self) -> &str {
        self.column_name.as_deref().unwrap_or(&self.name)
    }
}

impl fmt::Debug for AttributeDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeDefinition")
            .field("name", &self.name)
            .field("attribute_type", &self.attribute_type)
            .field("column_name", &self.column_name)
            .field("date_storage", &self.date_storage)
            .field("formatter", &self.formatter.is_some())
            .finish()
    }
}

/// Table, primary key and ordered attributes of one model
#[derive(Debug, Clone)]
pub struct ModelDefinition {
    name: String,
    table_name: Option<String>,
    primary_key: String,
    attributes: Vec<AttributeDefinition>,
}

impl ModelDefinition {
    /// New definition with primary key `id` and no attributes
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table_name: None,
            primary_key: "id".to_string(),
            attributes: Vec::new(),
        }
    }

    pub fn table(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    pub fn primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    /// Declare an attribute by name and type
    pub fn attr(self, name: impl Into<String>, attribute_type: AttributeType) -> Self {
        self.attribute(AttributeDefinition::new(name, attribute_type))
    }

    /// Declare a fully configured attribute, replacing one with the same name
    pub fn attribute(mut self, attribute: AttributeDefinition) -> Self {
        self.push_attribute(attribute);
        self
    }

    pub(crate) fn push_attribute(&mut self, attribute: AttributeDefinition) {
        match self.attributes.iter_mut().find(|a| a.name == attribute.name) {
            Some(existing) => *existing = attribute,
            None => self.attributes.push(attribute),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table name, defaulting to the singularized lowercase model name
    pub fn table_name(&self) -> String {
        match &self.table_name {
            Some(table) => table.clone(),
            None => inflection::singularize(&self.name.to_lowercase()),
        }
    }

    pub fn primary_key_name(&self) -> &str {
        &self.primary_key
    }

    pub fn attributes(&self) -> &[AttributeDefinition] {
        &self.attributes
    }

    pub fn attribute_def(&self, name: &str) -> Option<&AttributeDefinition> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute_def(name).is_some()
    }

    /// Storage column for an attribute name; unknown names pass through
    pub fn column_for<'a>(&'a self, attribute: &'a str) -> &'a str {
        self.attribute_def(attribute)
            .map(AttributeDefinition::storage_column)
            .unwrap_or(attribute)
    }

    /// Attribute stored in `column`, preferring an explicit column mapping
    pub fn attribute_for_column(&self, column: &str) -> Option<&AttributeDefinition> {
        self.attributes
            .iter()
            .find(|a| a.column_name.as_deref() == Some(column))
            .or_else(|| {
                self.attributes
                    .iter()
                    .find(|a| a.name == column && a.column_name.is_none())
            })
    }

    /// Storage column of the primary key
    pub fn primary_key_column(&self) -> &str {
        self.column_for(&self.primary_key)
    }
}
