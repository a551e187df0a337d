//! Relationship Registry - relation metadata keyed by owning model
//!
//! Populated while the schema is assembled, then frozen inside `Schema` and
//! only read afterwards, so lookups need no synchronization.

use std::collections::{BTreeMap, HashMap};

use super::inflection::{foreign_key_for, pluralize, singularize};
use super::metadata::{
    BelongsToOptions, HasManyOptions, ManyToManyOptions, RelationDefinition, RelationKind,
    ThroughConfig,
};
use crate::error::{ModelError, ModelResult};
use crate::model::{AttributeType, ModelDefinition};

/// How a descriptor key resolved against the registry
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RelationLookup<'a> {
    /// Key is an alias of a relation owned by the queried model
    Owned(&'a RelationDefinition),
    /// Key is the foreign key of a relation that targets the queried model
    Inbound(&'a RelationDefinition),
}

impl<'a> RelationLookup<'a> {
    pub fn relation(&self) -> &'a RelationDefinition {
        match self {
            Self::Owned(relation) | Self::Inbound(relation) => relation,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RelationRegistry {
    /// owner model -> relations in declaration order
    owned: HashMap<String, Vec<RelationDefinition>>,
    /// target model -> (foreign key, relation) in declaration order
    inbound: HashMap<String, Vec<(String, RelationDefinition)>>,
    /// junction models created by many-to-many declarations
    junctions: BTreeMap<String, ModelDefinition>,
}

impl RelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `owner` has many `target`; the key lives on `target` or on `through`
    pub fn declare_has_many(
        &mut self,
        owner: &ModelDefinition,
        target: &ModelDefinition,
        through: Option<&ModelDefinition>,
        options: HasManyOptions,
    ) -> ModelResult<()> {
        let foreign_key = options.foreign_key.ok_or_else(|| {
            ModelError::Configuration(format!(
                "hasMany {} -> {} requires a foreign key",
                owner.name(),
                target.name()
            ))
        })?;
        let alias = options
            .alias
            .unwrap_or_else(|| pluralize(&target.name().to_lowercase()));

        let through = match (through, options.through) {
            (Some(junction), _) => Some(ThroughConfig {
                model: junction.name().to_string(),
                table: junction.table_name(),
                through_key: options
                    .through_key
                    .unwrap_or_else(|| foreign_key_for(target.name(), target.primary_key_name())),
            }),
            (None, Some(model)) => {
                return Err(ModelError::Configuration(format!(
                    "hasMany {} -> {} goes through unknown model '{}'",
                    owner.name(),
                    target.name(),
                    model
                )))
            }
            (None, None) => None,
        };

        let relation = RelationDefinition {
            kind: RelationKind::HasMany,
            alias,
            owner: owner.name().to_string(),
            target: target.name().to_string(),
            foreign_key,
            through,
        };
        self.register(relation)
    }

    /// `owner` belongs to `target` through `owner.foreign_key`
    pub fn declare_belongs_to(
        &mut self,
        owner: &ModelDefinition,
        target: &ModelDefinition,
        options: BelongsToOptions,
    ) -> ModelResult<()> {
        let foreign_key = options.foreign_key.ok_or_else(|| {
            ModelError::Configuration(format!(
                "belongsTo {} -> {} requires a foreign key",
                owner.name(),
                target.name()
            ))
        })?;
        let relation = RelationDefinition {
            kind: RelationKind::BelongsTo,
            alias: options
                .alias
                .unwrap_or_else(|| singularize(&target.name().to_lowercase())),
            owner: owner.name().to_string(),
            target: target.name().to_string(),
            foreign_key,
            through: None,
        };
        self.register(relation)
    }

    /// Wire `first` and `second` through a junction in both directions.
    ///
    /// Without an explicit junction one is created, named after both models in
    /// lexicographic order, and reused by every later declaration of the pair.
    pub fn declare_many_to_many(
        &mut self,
        first: &ModelDefinition,
        second: &ModelDefinition,
        through: Option<&ModelDefinition>,
        options: ManyToManyOptions,
    ) -> ModelResult<()> {
        let from_key = options
            .from_key
            .unwrap_or_else(|| foreign_key_for(first.name(), first.primary_key_name()));
        let to_key = options
            .to_key
            .unwrap_or_else(|| foreign_key_for(second.name(), second.primary_key_name()));

        if from_key == to_key {
            return Err(ModelError::Configuration(format!(
                "manyToMany {} <-> {} needs distinct junction keys, both are '{}'",
                first.name(),
                second.name(),
                from_key
            )));
        }

        let junction = match (through, &options.through) {
            (Some(junction), _) => junction.clone(),
            (None, Some(model)) => {
                return Err(ModelError::Configuration(format!(
                    "manyToMany {} <-> {} goes through unknown model '{}'",
                    first.name(),
                    second.name(),
                    model
                )))
            }
            (None, None) => self.ensure_junction(first, second, &from_key, &to_key),
        };

        self.declare_belongs_to(
            &junction,
            first,
            BelongsToOptions::new(from_key.clone())
                .alias(singularize(&first.name().to_lowercase())),
        )?;
        self.declare_belongs_to(
            &junction,
            second,
            BelongsToOptions::new(to_key.clone())
                .alias(singularize(&second.name().to_lowercase())),
        )?;

        let through_config = |through_key: &str| ThroughConfig {
            model: junction.name().to_string(),
            table: junction.table_name(),
            through_key: through_key.to_string(),
        };

        self.register(RelationDefinition {
            kind: RelationKind::ManyToMany,
            alias: options
                .alias
                .unwrap_or_else(|| pluralize(&second.name().to_lowercase())),
            owner: first.name().to_string(),
            target: second.name().to_string(),
            foreign_key: from_key.clone(),
            through: Some(through_config(&to_key)),
        })?;
        self.register(RelationDefinition {
            kind: RelationKind::ManyToMany,
            alias: options
                .inverse_alias
                .unwrap_or_else(|| pluralize(&first.name().to_lowercase())),
            owner: second.name().to_string(),
            target: first.name().to_string(),
            foreign_key: to_key,
            through: Some(through_config(&from_key)),
        })
    }

    fn ensure_junction(
        &mut self,
        first: &ModelDefinition,
        second: &ModelDefinition,
        from_key: &str,
        to_key: &str,
    ) -> ModelDefinition {
        let (low, high) = if first.name() <= second.name() {
            (first.name(), second.name())
        } else {
            (second.name(), first.name())
        };
        let name = format!("{}{}", low, high);
        let table = format!("{}_{}", low, high).to_lowercase();

        let junction = self.junctions.entry(name.clone()).or_insert_with(|| {
            tracing::debug!(junction = %name, table = %table, "creating junction model");
            ModelDefinition::new(name).table(table)
        });
        for key in [from_key, to_key] {
            if !junction.has_attribute(key) {
                junction.push_attribute(crate::model::AttributeDefinition::new(
                    key,
                    AttributeType::Number,
                ));
            }
        }
        junction.clone()
    }

    /// Add a relation; re-registering an identical relation is a no-op
    fn register(&mut self, relation: RelationDefinition) -> ModelResult<()> {
        let relations = self.owned.entry(relation.owner.clone()).or_default();
        if let Some(existing) = relations.iter().find(|r| r.alias == relation.alias) {
            if *existing == relation {
                return Ok(());
            }
            return Err(ModelError::Configuration(format!(
                "Relation alias '{}' is already declared on {}",
                relation.alias, relation.owner
            )));
        }

        tracing::debug!(
            owner = %relation.owner,
            alias = %relation.alias,
            target = %relation.target,
            kind = ?relation.kind,
            "registered relation"
        );

        if relation.kind != RelationKind::BelongsTo {
            let inbound = self.inbound.entry(relation.target.clone()).or_default();
            if !inbound.iter().any(|(key, _)| *key == relation.foreign_key) {
                inbound.push((relation.foreign_key.clone(), relation.clone()));
            }
        }
        relations.push(relation);
        Ok(())
    }

    /// Resolve a descriptor key for `model`: owned aliases first, then inbound keys
    pub fn lookup(&self, model: &str, key: &str) -> Option<RelationLookup<'_>> {
        self.get(model, key).map(RelationLookup::Owned).or_else(|| {
            self.inbound
                .get(model)?
                .iter()
                .find(|(foreign_key, _)| foreign_key == key)
                .map(|(_, relation)| RelationLookup::Inbound(relation))
        })
    }

    /// Relation owned by `model` under `alias`
    pub fn get(&self, model: &str, alias: &str) -> Option<&RelationDefinition> {
        self.owned.get(model)?.iter().find(|r| r.alias == alias)
    }

    /// All relations owned by `model`, in declaration order
    pub fn relations_for(&self, model: &str) -> &[RelationDefinition] {
        self.owned.get(model).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_relation(&self, model: &str, alias: &str) -> bool {
        self.get(model, alias).is_some()
    }

    pub fn junction(&self, name: &str) -> Option<&ModelDefinition> {
        self.junctions.get(name)
    }

    pub fn junctions(&self) -> impl Iterator<Item = &ModelDefinition> {
        self.junctions.values()
    }
}
