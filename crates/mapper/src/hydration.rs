//! Result hydration - flat rows back into model instances
//!
//! Plain rows carry bare storage columns. Rows from include queries carry
//! `{prefix}_{column}` names: the queried table's alias for the model itself,
//! each relation alias for its related model, and `{alias}__fk` for the key
//! that correlates a related row with its parent.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::backends::{DatabaseValue, ResultRow};
use crate::error::{ModelError, ModelResult};
use crate::model::coercion::from_storage;
use crate::model::{ModelDefinition, ModelInstance};
use crate::query::{IncludedRelation, FOREIGN_KEY_MARKER};

/// Related model found on one row
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedRow {
    pub alias: String,
    /// `None` when the outer join found nothing
    pub instance: Option<ModelInstance>,
    pub marker: Option<DatabaseValue>,
}

/// One row: the queried model plus every included relation's columns
#[derive(Debug, Clone, PartialEq)]
pub struct HydratedRow {
    pub instance: ModelInstance,
    pub related: Vec<RelatedRow>,
}

#[derive(Debug, Clone)]
enum ColumnNaming {
    Plain,
    Nested {
        base_prefix: String,
        relations: Vec<(String, Arc<ModelDefinition>)>,
    },
}

#[derive(Debug, Clone)]
enum Group {
    Base,
    Relation(usize),
}

#[derive(Debug, Clone)]
pub struct ResultHydrator {
    definition: Arc<ModelDefinition>,
    naming: ColumnNaming,
}

impl ResultHydrator {
    /// Hydrator for rows whose columns are bare storage names
    pub fn plain(definition: Arc<ModelDefinition>) -> Self {
        Self {
            definition,
            naming: ColumnNaming::Plain,
        }
    }

    /// Hydrator for include queries
    pub fn nested(
        definition: Arc<ModelDefinition>,
        base_prefix: impl Into<String>,
        included: &[IncludedRelation],
    ) -> Self {
        let relations = included
            .iter()
            .map(|inc| (inc.alias.clone(), Arc::clone(&inc.target)))
            .collect();
        Self {
            definition,
            naming: ColumnNaming::Nested {
                base_prefix: base_prefix.into(),
                relations,
            },
        }
    }

    pub fn hydrate(&self, rows: &[ResultRow]) -> ModelResult<Vec<HydratedRow>> {
        rows.iter().map(|row| self.hydrate_row(row)).collect()
    }

    /// Hydrate and keep only the queried model
    pub fn hydrate_instances(&self, rows: &[ResultRow]) -> ModelResult<Vec<ModelInstance>> {
        rows.iter()
            .map(|row| self.hydrate_row(row).map(|hydrated| hydrated.instance))
            .collect()
    }

    pub fn hydrate_row(&self, row: &ResultRow) -> ModelResult<HydratedRow> {
        match &self.naming {
            ColumnNaming::Plain => Ok(HydratedRow {
                instance: build_instance(&self.definition, row.iter()),
                related: Vec::new(),
            }),
            ColumnNaming::Nested {
                base_prefix,
                relations,
            } => self.hydrate_nested(row, base_prefix, relations),
        }
    }

    fn hydrate_nested(
        &self,
        row: &ResultRow,
        base_prefix: &str,
        relations: &[(String, Arc<ModelDefinition>)],
    ) -> ModelResult<HydratedRow> {
        // longest prefix first so `post_` never swallows `post_tags_`
        let mut prefixes: Vec<(&str, Group)> = std::iter::once((base_prefix, Group::Base))
            .chain(
                relations
                    .iter()
                    .enumerate()
                    .map(|(i, (alias, _))| (alias.as_str(), Group::Relation(i))),
            )
            .collect();
        prefixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        let mut base_columns: Vec<(&str, &DatabaseValue)> = Vec::new();
        let mut related_columns: Vec<Vec<(&str, &DatabaseValue)>> =
            vec![Vec::new(); relations.len()];
        let mut markers: Vec<Option<DatabaseValue>> = vec![None; relations.len()];

        for (column, value) in row.iter() {
            let matched = prefixes.iter().find_map(|(prefix, group)| {
                column
                    .strip_prefix(prefix)
                    .and_then(|rest| rest.strip_prefix('_'))
                    .map(|rest| (rest, group))
            });
            match matched {
                Some((rest, Group::Relation(i))) if rest == FOREIGN_KEY_MARKER => {
                    markers[*i] = Some(value.clone()).filter(|v| !v.is_null());
                }
                Some((rest, Group::Relation(i))) => related_columns[*i].push((rest, value)),
                Some((rest, Group::Base)) => base_columns.push((rest, value)),
                None => base_columns.push((column, value)),
            }
        }

        let instance = build_instance(&self.definition, base_columns.into_iter());
        if instance.primary_key().is_none() {
            return Err(ModelError::Hydration(format!(
                "Row for {} has no primary key column '{}_{}'",
                self.definition.name(),
                base_prefix,
                self.definition.primary_key_column()
            )));
        }

        let related = relations
            .iter()
            .zip(related_columns)
            .zip(markers)
            .map(|(((alias, definition), columns), marker)| {
                let related = build_instance(definition, columns.into_iter());
                RelatedRow {
                    alias: alias.clone(),
                    instance: related.primary_key().is_some().then_some(related),
                    marker,
                }
            })
            .collect();

        Ok(HydratedRow { instance, related })
    }
}

/// Map storage columns to attributes, coercing declared ones
fn build_instance<'r>(
    definition: &Arc<ModelDefinition>,
    columns: impl Iterator<Item = (&'r str, &'r DatabaseValue)>,
) -> ModelInstance {
    let attrs: BTreeMap<String, DatabaseValue> = columns
        .map(|(column, value)| match definition.attribute_for_column(column) {
            Some(attribute) => (attribute.name.clone(), from_storage(attribute, value.clone())),
            None => (column.to_string(), value.clone()),
        })
        .collect();
    ModelInstance::hydrated(Arc::clone(definition), attrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttributeDefinition, AttributeType};
    use crate::relationships::{RelationDefinition, RelationKind};
    use chrono::{TimeZone, Utc};

    fn user() -> Arc<ModelDefinition> {
        Arc::new(
            ModelDefinition::new("User")
                .table("user")
                .attr("id", AttributeType::Number)
                .attribute(AttributeDefinition::new("fullname", AttributeType::String).column("name"))
                .attr("admin", AttributeType::Boolean)
                .attr("joined", AttributeType::Date),
        )
    }

    fn post() -> Arc<ModelDefinition> {
        Arc::new(
            ModelDefinition::new("Post")
                .table("post")
                .attr("id", AttributeType::Number)
                .attr("title", AttributeType::String)
                .attr("user_id", AttributeType::Number),
        )
    }

    fn posts_included() -> IncludedRelation {
        IncludedRelation {
            alias: "user_posts".to_string(),
            relation: RelationDefinition {
                kind: RelationKind::HasMany,
                alias: "user_posts".to_string(),
                owner: "User".to_string(),
                target: "Post".to_string(),
                foreign_key: "user_id".to_string(),
                through: None,
            },
            target: post(),
        }
    }

    #[test]
    fn test_plain_rows_map_columns_and_coerce() {
        let row = ResultRow::new()
            .with("id", 1i64)
            .with("name", "alex")
            .with("admin", DatabaseValue::Null)
            .with("joined", 1_700_000_000i64)
            .with("extra", "kept");

        let hydrated = ResultHydrator::plain(user()).hydrate_row(&row).unwrap();
        let instance = hydrated.instance;
        assert_eq!(instance.get("fullname"), Some(&DatabaseValue::from("alex")));
        assert_eq!(instance.get("name"), None);
        assert_eq!(instance.get("admin"), Some(&DatabaseValue::Bool(false)));
        assert_eq!(
            instance.get("joined"),
            Some(&DatabaseValue::DateTime(Utc.timestamp_opt(1_700_000_000, 0).unwrap()))
        );
        assert_eq!(instance.get("extra"), Some(&DatabaseValue::from("kept")));
        assert!(!instance.is_dirty());
    }

    #[test]
    fn test_nested_rows_split_by_longest_prefix() {
        let row = ResultRow::new()
            .with("user_id", 1i64)
            .with("user_name", "alex")
            .with("user_posts_id", 10i64)
            .with("user_posts_title", "hello")
            .with("user_posts_user_id", 1i64)
            .with("user_posts__fk", 1i64);

        let hydrator = ResultHydrator::nested(user(), "user", &[posts_included()]);
        let hydrated = hydrator.hydrate_row(&row).unwrap();

        assert_eq!(hydrated.instance.get("fullname"), Some(&DatabaseValue::from("alex")));
        assert_eq!(hydrated.instance.get("posts_id"), None);
        let related = &hydrated.related[0];
        assert_eq!(related.alias, "user_posts");
        assert_eq!(related.marker, Some(DatabaseValue::Int64(1)));
        let post = related.instance.as_ref().unwrap();
        assert_eq!(post.get("title"), Some(&DatabaseValue::from("hello")));
        assert_eq!(post.get("user_id"), Some(&DatabaseValue::Int64(1)));
    }

    #[test]
    fn test_unmatched_outer_join_yields_no_related_instance() {
        let row = ResultRow::new()
            .with("user_id", 2i64)
            .with("user_posts_id", DatabaseValue::Null)
            .with("user_posts_title", DatabaseValue::Null)
            .with("user_posts__fk", DatabaseValue::Null);

        let hydrator = ResultHydrator::nested(user(), "user", &[posts_included()]);
        let hydrated = hydrator.hydrate_row(&row).unwrap();
        assert!(hydrated.related[0].instance.is_none());
        assert!(hydrated.related[0].marker.is_none());
    }

    #[test]
    fn test_nested_row_without_primary_key_is_an_error() {
        let row = ResultRow::new().with("user_name", "alex");
        let hydrator = ResultHydrator::nested(user(), "user", &[]);
        assert!(matches!(hydrator.hydrate_row(&row), Err(ModelError::Hydration(_))));
    }

    #[test]
    fn test_hydration_is_idempotent() {
        let rows = vec![
            ResultRow::new().with("id", 1i64).with("name", "a").with("admin", 1i64),
            ResultRow::new().with("id", 2i64).with("name", "b").with("admin", 0i64),
        ];
        let hydrator = ResultHydrator::plain(user());
        assert_eq!(hydrator.hydrate(&rows).unwrap(), hydrator.hydrate(&rows).unwrap());
    }
}
