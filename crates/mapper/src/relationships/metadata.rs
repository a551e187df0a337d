//! Relationship Metadata - declared edges between model definitions

use serde::{Deserialize, Serialize};

/// Defines the type of relationship between models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    /// One-to-many: the target carries a key pointing at the owner
    HasMany,
    /// Many-to-one: the owner carries a key pointing at the target
    BelongsTo,
    /// Many-to-many through a junction model
    ManyToMany,
}

impl RelationKind {
    /// Returns true if this relationship returns a collection
    pub fn is_collection(self) -> bool {
        matches!(self, Self::HasMany | Self::ManyToMany)
    }
}

/// Junction used by a relation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThroughConfig {
    /// Junction model name
    pub model: String,
    /// Junction table name
    pub table: String,
    /// Junction column referencing the target's primary key
    pub through_key: String,
}

/// One declared relation, seen from its owning model.
///
/// Key placement by kind:
/// - `HasMany` without junction: `target.foreign_key` references `owner.pk`
/// - `HasMany`/`ManyToMany` with junction: `junction.foreign_key` references
///   `owner.pk` and `junction.through_key` references `target.pk`
/// - `BelongsTo`: `owner.foreign_key` references `target.pk`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDefinition {
    pub kind: RelationKind,
    pub alias: String,
    pub owner: String,
    pub target: String,
    pub foreign_key: String,
    pub through: Option<ThroughConfig>,
}

impl RelationDefinition {
    pub fn is_collection(&self) -> bool {
        self.kind.is_collection()
    }

    pub fn through_key(&self) -> Option<&str> {
        self.through.as_ref().map(|t| t.through_key.as_str())
    }
}

/// Parameters for `declare_has_many`
#[derive(Debug, Clone, Default)]
pub struct HasManyOptions {
    pub alias: Option<String>,
    pub foreign_key: Option<String>,
    /// Junction model name
    pub through: Option<String>,
    pub through_key: Option<String>,
}

impl HasManyOptions {
    pub fn new(foreign_key: impl Into<String>) -> Self {
        Self {
            foreign_key: Some(foreign_key.into()),
            ..Default::default()
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn through(mut self, model: impl Into<String>) -> Self {
        self.through = Some(model.into());
        self
    }

    pub fn through_key(mut self, key: impl Into<String>) -> Self {
        self.through_key = Some(key.into());
        self
    }
}

/// Parameters for `declare_belongs_to`
#[derive(Debug, Clone, Default)]
pub struct BelongsToOptions {
    pub alias: Option<String>,
    pub foreign_key: Option<String>,
}

impl BelongsToOptions {
    pub fn new(foreign_key: impl Into<String>) -> Self {
        Self {
            foreign_key: Some(foreign_key.into()),
            ..Default::default()
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

/// Parameters for `declare_many_to_many`
#[derive(Debug, Clone, Default)]
pub struct ManyToManyOptions {
    /// Alias on the first model (defaults to the pluralized second model)
    pub alias: Option<String>,
    /// Alias on the second model (defaults to the pluralized first model)
    pub inverse_alias: Option<String>,
    /// Junction key referencing the first model
    pub from_key: Option<String>,
    /// Junction key referencing the second model
    pub to_key: Option<String>,
    /// Existing junction model name
    pub through: Option<String>,
}

impl ManyToManyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn inverse_alias(mut self, alias: impl Into<String>) -> Self {
        self.inverse_alias = Some(alias.into());
        self
    }

    pub fn from_key(mut self, key: impl Into<String>) -> Self {
        self.from_key = Some(key.into());
        self
    }

    pub fn to_key(mut self, key: impl Into<String>) -> Self {
        self.to_key = Some(key.into());
        self
    }

    pub fn through(mut self, model: impl Into<String>) -> Self {
        self.through = Some(model.into());
        self
    }
}
