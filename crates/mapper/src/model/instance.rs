//! Model instances - attribute values, change tracking and loaded relations

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use super::coercion::normalize_input;
use super::definition::ModelDefinition;
use crate::backends::DatabaseValue;
use crate::error::{ModelError, ModelResult};

/// A model instance plus any relations loaded alongside it
#[derive(Debug, Clone)]
pub struct ModelInstance {
    definition: Arc<ModelDefinition>,
    attrs: BTreeMap<String, DatabaseValue>,
    changed: BTreeSet<String>,
    relations: BTreeMap<String, Vec<ModelInstance>>,
}

impl ModelInstance {
    /// Construct a new (unsaved) instance. Every supplied attribute counts as changed.
    pub fn new<I, K, V>(definition: Arc<ModelDefinition>, attrs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<DatabaseValue>,
    {
        let mut instance = Self::empty(definition);
        for (name, value) in attrs {
            instance.set(name, value);
        }
        instance
    }

    /// Construct an instance from values that were just read from storage
    pub(crate) fn hydrated(
        definition: Arc<ModelDefinition>,
        attrs: BTreeMap<String, DatabaseValue>,
    ) -> Self {
        let mut instance = Self::empty(definition);
        instance.attrs = attrs;
        instance.initialize();
        instance
    }

    fn empty(definition: Arc<ModelDefinition>) -> Self {
        Self {
            definition,
            attrs: BTreeMap::new(),
            changed: BTreeSet::new(),
            relations: BTreeMap::new(),
        }
    }

    /// Post-construction hook: normalize every declared attribute once
    fn initialize(&mut self) {
        let definition = Arc::clone(&self.definition);
        for attribute in definition.attributes() {
            if let Some(value) = self.attrs.remove(&attribute.name) {
                self.attrs
                    .insert(attribute.name.clone(), normalize_input(attribute, value));
            }
        }
    }

    pub fn definition(&self) -> &Arc<ModelDefinition> {
        &self.definition
    }

    /// Get an attribute value
    pub fn get(&self, name: &str) -> Option<&DatabaseValue> {
        self.attrs.get(name)
    }

    /// Set an attribute value and mark it changed
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<DatabaseValue>) {
        let name = name.into();
        let value = value.into();
        let value = match self.definition.attribute_def(&name) {
            Some(attribute) => normalize_input(attribute, value),
            None => value,
        };
        self.attrs.insert(name.clone(), value);
        self.changed.insert(name);
    }

    /// Remove an attribute entirely (it will be left out of writes)
    pub fn unset(&mut self, name: &str) -> Option<DatabaseValue> {
        self.changed.remove(name);
        self.attrs.remove(name)
    }

    /// Primary key value, if set and not NULL
    pub fn primary_key(&self) -> Option<&DatabaseValue> {
        self.attrs
            .get(self.definition.primary_key_name())
            .filter(|value| !value.is_null())
    }

    pub fn set_primary_key(&mut self, value: impl Into<DatabaseValue>) {
        self.attrs
            .insert(self.definition.primary_key_name().to_string(), value.into());
    }

    /// Whether the instance has never been persisted
    pub fn is_new(&self) -> bool {
        self.primary_key().is_none()
    }

    /// All attributes, ordered by declaration then by name for undeclared ones
    pub fn attributes(&self) -> Vec<(&str, &DatabaseValue)> {
        let declared = self
            .definition
            .attributes()
            .iter()
            .filter_map(|a| self.attrs.get_key_value(&a.name));
        let undeclared = self
            .attrs
            .iter()
            .filter(|(name, _)| !self.definition.has_attribute(name));
        declared
            .chain(undeclared)
            .map(|(name, value)| (name.as_str(), value))
            .collect()
    }

    /// Attributes changed since construction or the last `clear_changes`
    pub fn changed(&self) -> Vec<(&str, &DatabaseValue)> {
        self.attributes()
            .into_iter()
            .filter(|(name, _)| self.changed.contains(*name))
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        !self.changed.is_empty()
    }

    pub fn clear_changes(&mut self) {
        self.changed.clear();
    }

    /// Related instances loaded under `alias`
    pub fn relation(&self, alias: &str) -> Option<&[ModelInstance]> {
        self.relations.get(alias).map(Vec::as_slice)
    }

    pub fn relations(&self) -> &BTreeMap<String, Vec<ModelInstance>> {
        &self.relations
    }

    pub(crate) fn attach_relation(&mut self, alias: &str, related: Vec<ModelInstance>) {
        self.relations.insert(alias.to_string(), related);
    }

    /// JSON object of attributes with loaded relations nested by alias
    pub fn to_json(&self) -> JsonValue {
        let mut map: serde_json::Map<String, JsonValue> = self
            .attributes()
            .into_iter()
            .map(|(name, value)| (name.to_string(), value.to_json()))
            .collect();
        for (alias, related) in &self.relations {
            map.insert(
                alias.clone(),
                JsonValue::Array(related.iter().map(ModelInstance::to_json).collect()),
            );
        }
        JsonValue::Object(map)
    }

    /// Deserialize into a typed model
    pub fn to_model<M: DeserializeOwned>(&self) -> ModelResult<M> {
        serde_json::from_value(self.to_json()).map_err(|e| {
            ModelError::Serialization(format!(
                "Failed to deserialize {} instance: {}",
                self.definition.name(),
                e
            ))
        })
    }
}

impl PartialEq for ModelInstance {
    fn eq(&self, other: &Self) -> bool {
        self.definition.name() == other.definition.name()
            && self.attrs == other.attrs
            && self.relations == other.relations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttributeDefinition, AttributeType};
    use chrono::{TimeZone, Utc};

    fn definition() -> Arc<ModelDefinition> {
        Arc::new(
            ModelDefinition::new("User")
                .table("users")
                .attr("id", AttributeType::Number)
                .attr("name", AttributeType::String)
                .attribute(AttributeDefinition::new("joined", AttributeType::Date)),
        )
    }

    #[test]
    fn test_new_instance_is_new_and_dirty() {
        let user = ModelInstance::new(definition(), [("name", "alex")]);
        assert!(user.is_new());
        assert!(user.is_dirty());
        assert_eq!(user.changed(), vec![("name", &DatabaseValue::from("alex"))]);
    }

    #[test]
    fn test_setting_a_date_from_epoch_seconds() {
        let mut user = ModelInstance::new(definition(), [("name", "alex")]);
        user.set("joined", 1_700_000_000i64);
        assert_eq!(
            user.get("joined"),
            Some(&DatabaseValue::DateTime(Utc.timestamp_opt(1_700_000_000, 0).unwrap()))
        );
    }

    #[test]
    fn test_hydrated_instance_is_clean() {
        let attrs = BTreeMap::from([
            ("id".to_string(), DatabaseValue::Int64(3)),
            ("name".to_string(), DatabaseValue::from("sam")),
        ]);
        let user = ModelInstance::hydrated(definition(), attrs);
        assert!(!user.is_new());
        assert!(!user.is_dirty());
        assert_eq!(user.primary_key(), Some(&DatabaseValue::Int64(3)));
    }

    #[test]
    fn test_attributes_follow_declaration_order() {
        let mut user = ModelInstance::new(definition(), [("nickname", "al")]);
        user.set("name", "alex");
        user.set("id", 1i64);
        let names: Vec<&str> = user.attributes().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["id", "name", "nickname"]);
    }

    #[test]
    fn test_to_model_includes_relations() {
        #[derive(serde::Deserialize)]
        struct Typed {
            id: i64,
            name: String,
            #[serde(default)]
            posts: Vec<serde_json::Value>,
        }

        let mut user = ModelInstance::new(definition(), [("name", "alex")]);
        user.set_primary_key(5i64);
        user.attach_relation("posts", vec![ModelInstance::new(definition(), [("name", "p")])]);

        let typed: Typed = user.to_model().unwrap();
        assert_eq!(typed.id, 5);
        assert_eq!(typed.name, "alex");
        assert_eq!(typed.posts.len(), 1);
    }
}
