//! Core Model Trait - typed structs backed by a `ModelDefinition`
//!
//! The mapper works on `ModelInstance`s; this trait lets a plain serde struct
//! describe its own definition and convert in and out of instances.

use std::fmt::Debug;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;

use super::definition::ModelDefinition;
use super::instance::ModelInstance;
use crate::backends::DatabaseValue;
use crate::error::{ModelError, ModelResult};

/// Core trait for typed models
pub trait Model: Send + Sync + Debug + Serialize + DeserializeOwned {
    /// Definition describing this model's table and attributes
    fn definition() -> ModelDefinition;

    /// Model name used for registration and relation declarations
    fn model_name() -> String {
        Self::definition().name().to_string()
    }

    /// Convert to an unsaved instance; `null` fields are left unset
    fn to_instance(&self, definition: Arc<ModelDefinition>) -> ModelResult<ModelInstance> {
        let json = serde_json::to_value(self)?;
        let JsonValue::Object(fields) = json else {
            return Err(ModelError::Serialization(format!(
                "{} must serialize to an object",
                definition.name()
            )));
        };

        let attrs: Vec<(String, DatabaseValue)> = fields
            .into_iter()
            .filter(|(name, value)| !value.is_null() && definition.has_attribute(name))
            .map(|(name, value)| (name, DatabaseValue::from_json(value)))
            .collect();

        Ok(ModelInstance::new(definition, attrs))
    }

    /// Convert from an instance (relations included)
    fn from_instance(instance: &ModelInstance) -> ModelResult<Self> {
        instance.to_model()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AttributeType;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Post {
        id: Option<i64>,
        title: String,
    }

    impl Model for Post {
        fn definition() -> ModelDefinition {
            ModelDefinition::new("Post")
                .table("posts")
                .attr("id", AttributeType::Number)
                .attr("title", AttributeType::String)
        }
    }

    #[test]
    fn test_round_trip_through_instance() {
        let definition = Arc::new(Post::definition());
        let post = Post { id: None, title: "hello".to_string() };

        let instance = post.to_instance(Arc::clone(&definition)).unwrap();
        assert!(instance.is_new());
        assert_eq!(instance.get("title"), Some(&DatabaseValue::from("hello")));

        let mut saved = instance.clone();
        saved.set_primary_key(4i64);
        let back = Post::from_instance(&saved).unwrap();
        assert_eq!(back, Post { id: Some(4), title: "hello".to_string() });
        assert_eq!(Post::model_name(), "Post");
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Draft {
        id: Option<i64>,
        title: String,
        scratch: bool,
    }

    impl Model for Draft {
        fn definition() -> ModelDefinition {
            Post::definition()
        }
    }

    #[test]
    fn test_to_instance_skips_nulls_and_undeclared_fields() {
        let definition = Arc::new(Draft::definition());
        let draft = Draft { id: None, title: "wip".to_string(), scratch: true };

        let instance = draft.to_instance(Arc::clone(&definition)).unwrap();
        assert_eq!(instance.get("id"), None);
        assert_eq!(instance.get("scratch"), None);
        assert_eq!(instance.get("title"), Some(&DatabaseValue::from("wip")));
        assert!(Arc::ptr_eq(instance.definition(), &definition));
    }
}
