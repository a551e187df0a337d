//! Schema - model definitions plus their relations, assembled once at setup
//!
//! `SchemaBuilder` collects definitions and relation declarations; `build`
//! freezes everything into a `Schema` that is shared read-only behind an
//! `Arc` by every mapper.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::{ModelError, ModelResult};
use crate::model::{Model, ModelDefinition};
use crate::relationships::{
    BelongsToOptions, HasManyOptions, ManyToManyOptions, RelationDefinition, RelationLookup,
    RelationRegistry,
};

#[derive(Debug, Default)]
pub struct SchemaBuilder {
    models: BTreeMap<String, ModelDefinition>,
    relations: RelationRegistry,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model definition; names must be unique
    pub fn register(&mut self, definition: ModelDefinition) -> ModelResult<&mut Self> {
        if self.models.contains_key(definition.name()) {
            return Err(ModelError::Configuration(format!(
                "Model '{}' is already registered",
                definition.name()
            )));
        }
        tracing::debug!(
            model = %definition.name(),
            table = %definition.table_name(),
            "registered model"
        );
        self.models.insert(definition.name().to_string(), definition);
        Ok(self)
    }

    /// Register the definition of a typed model
    pub fn register_model<M: Model>(&mut self) -> ModelResult<&mut Self> {
        self.register(M::definition())
    }

    pub fn has_many(
        &mut self,
        owner: &str,
        target: &str,
        options: HasManyOptions,
    ) -> ModelResult<&mut Self> {
        let owner_def = self.definition(owner)?.clone();
        let target_def = self.definition(target)?.clone();
        let through = match &options.through {
            Some(name) => Some(self.definition(name)?.clone()),
            None => None,
        };
        self.relations
            .declare_has_many(&owner_def, &target_def, through.as_ref(), options)?;
        Ok(self)
    }

    /// `child` belongs to `parent` through the child's foreign key
    pub fn belongs_to(
        &mut self,
        child: &str,
        parent: &str,
        options: BelongsToOptions,
    ) -> ModelResult<&mut Self> {
        let child_def = self.definition(child)?.clone();
        let parent_def = self.definition(parent)?.clone();
        self.relations
            .declare_belongs_to(&child_def, &parent_def, options)?;
        Ok(self)
    }

    pub fn many_to_many(
        &mut self,
        first: &str,
        second: &str,
        options: ManyToManyOptions,
    ) -> ModelResult<&mut Self> {
        let first_def = self.definition(first)?.clone();
        let second_def = self.definition(second)?.clone();
        let through = match &options.through {
            Some(name) => Some(self.definition(name)?.clone()),
            None => None,
        };
        self.relations
            .declare_many_to_many(&first_def, &second_def, through.as_ref(), options)?;
        Ok(self)
    }

    fn definition(&self, name: &str) -> ModelResult<&ModelDefinition> {
        self.models
            .get(name)
            .or_else(|| self.relations.junction(name))
            .ok_or_else(|| ModelError::Configuration(format!("Unknown model '{}'", name)))
    }

    /// Freeze definitions, junction models and relations
    pub fn build(self) -> Schema {
        let mut models: HashMap<String, Arc<ModelDefinition>> = self
            .models
            .into_iter()
            .map(|(name, definition)| (name, Arc::new(definition)))
            .collect();
        for junction in self.relations.junctions() {
            models
                .entry(junction.name().to_string())
                .or_insert_with(|| Arc::new(junction.clone()));
        }
        Schema {
            models,
            relations: self.relations,
        }
    }
}

/// Frozen, read-only set of model definitions and relations
#[derive(Debug, Clone)]
pub struct Schema {
    models: HashMap<String, Arc<ModelDefinition>>,
    relations: RelationRegistry,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    pub fn model(&self, name: &str) -> Option<&Arc<ModelDefinition>> {
        self.models.get(name)
    }

    /// Definition by model name, failing for unknown models
    pub fn definition(&self, name: &str) -> ModelResult<&Arc<ModelDefinition>> {
        self.model(name)
            .ok_or_else(|| ModelError::Relationship(format!("Unknown model '{}'", name)))
    }

    /// Model stored in `table`, if any
    pub fn model_for_table(&self, table: &str) -> Option<&Arc<ModelDefinition>> {
        let mut matches = self.models.values().filter(|m| m.table_name() == table);
        let first = matches.next()?;
        // ambiguous tables map to no model
        match matches.next() {
            Some(_) => None,
            None => Some(first),
        }
    }

    pub fn relations(&self) -> &RelationRegistry {
        &self.relations
    }

    pub fn relation(&self, model: &str, alias: &str) -> Option<&RelationDefinition> {
        self.relations.get(model, alias)
    }

    pub fn lookup(&self, model: &str, key: &str) -> Option<RelationLookup<'_>> {
        self.relations.lookup(model, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AttributeType;

    #[test]
    fn test_build_includes_junction_models() {
        let mut builder = Schema::builder();
        builder
            .register(ModelDefinition::new("Post").attr("id", AttributeType::Number))
            .unwrap()
            .register(ModelDefinition::new("Tag").attr("id", AttributeType::Number))
            .unwrap()
            .many_to_many("Post", "Tag", ManyToManyOptions::new())
            .unwrap();
        let schema = builder.build();

        let junction = schema.definition("PostTag").unwrap();
        assert_eq!(junction.table_name(), "post_tag");
        assert!(schema.relation("Post", "tags").is_some());
        assert!(schema.relation("Tag", "posts").is_some());
    }

    #[test]
    fn test_unknown_model_is_a_configuration_error() {
        let mut builder = Schema::builder();
        builder.register(ModelDefinition::new("User")).unwrap();
        let err = builder
            .has_many("User", "Post", HasManyOptions::new("user_id"))
            .unwrap_err();
        assert!(matches!(err, ModelError::Configuration(_)));
    }

    #[test]
    fn test_duplicate_model_is_rejected() {
        let mut builder = Schema::builder();
        builder.register(ModelDefinition::new("User")).unwrap();
        assert!(builder.register(ModelDefinition::new("User")).is_err());
    }

    #[test]
    fn test_has_many_through_existing_junction() {
        let mut builder = Schema::builder();
        builder
            .register(ModelDefinition::new("User"))
            .unwrap()
            .register(ModelDefinition::new("Group"))
            .unwrap()
            .register(ModelDefinition::new("Membership").table("memberships"))
            .unwrap()
            .has_many(
                "User",
                "Group",
                HasManyOptions::new("user_id").through("Membership"),
            )
            .unwrap();
        let schema = builder.build();

        let groups = schema.relation("User", "groups").unwrap();
        assert_eq!(groups.through_key(), Some("group_id"));
        assert_eq!(groups.through.as_ref().unwrap().table, "memberships");
    }
}
