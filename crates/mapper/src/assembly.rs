//! Relation assembly - undo outer-join fan-out
//!
//! Include queries repeat the parent once per related row. Parents are
//! collapsed by primary key in first-seen order and related rows are grouped
//! under each parent by alias, each related row at most once.

use std::collections::{HashMap, HashSet};

use crate::hydration::HydratedRow;
use crate::model::ModelInstance;
use crate::query::IncludedRelation;
use crate::relationships::RelationKind;

#[derive(Debug, Default)]
struct RelationGroup {
    instances: Vec<ModelInstance>,
    seen: HashSet<String>,
}

impl RelationGroup {
    fn add(&mut self, instance: ModelInstance) {
        let Some(key) = instance.primary_key().and_then(|pk| pk.identity_key()) else {
            return;
        };
        if self.seen.insert(key) {
            self.instances.push(instance);
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RelationAssembler;

impl RelationAssembler {
    pub fn new() -> Self {
        Self
    }

    pub fn assemble(
        &self,
        rows: Vec<HydratedRow>,
        included: &[IncludedRelation],
    ) -> Vec<ModelInstance> {
        let mut parents: Vec<ModelInstance> = Vec::new();
        let mut groups: Vec<Vec<RelationGroup>> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for row in rows {
            let key = row.instance.primary_key().and_then(|pk| pk.identity_key());
            let position = match key.as_ref().and_then(|k| index.get(k)) {
                Some(&position) => position,
                None => {
                    parents.push(row.instance);
                    groups.push(included.iter().map(|_| RelationGroup::default()).collect());
                    if let Some(key) = key {
                        index.insert(key, parents.len() - 1);
                    }
                    parents.len() - 1
                }
            };

            for related in row.related {
                let Some(slot) = included.iter().position(|inc| inc.alias == related.alias) else {
                    continue;
                };
                let Some(instance) = related.instance else {
                    continue;
                };
                let Some(marker) = related.marker.as_ref().and_then(|m| m.identity_key()) else {
                    tracing::debug!(alias = %related.alias, "related row without correlating key");
                    continue;
                };

                let relation = &included[slot].relation;
                let owner = if relation.kind == RelationKind::BelongsTo {
                    let parent_key = parents[position]
                        .get(&relation.foreign_key)
                        .and_then(|value| value.identity_key());
                    (parent_key.as_deref() == Some(marker.as_str())).then_some(position)
                } else {
                    index.get(&marker).copied()
                };

                if let Some(owner) = owner {
                    groups[owner][slot].add(instance);
                }
            }
        }

        parents
            .into_iter()
            .zip(groups)
            .map(|(mut parent, relation_groups)| {
                for (inc, group) in included.iter().zip(relation_groups) {
                    parent.attach_relation(&inc.alias, group.instances);
                }
                parent
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::DatabaseValue;
    use crate::hydration::RelatedRow;
    use crate::model::{AttributeType, ModelDefinition};
    use crate::relationships::RelationDefinition;
    use std::sync::Arc;

    fn user_def() -> Arc<ModelDefinition> {
        Arc::new(ModelDefinition::new("User").attr("id", AttributeType::Number))
    }

    fn post_def() -> Arc<ModelDefinition> {
        Arc::new(
            ModelDefinition::new("Post")
                .attr("id", AttributeType::Number)
                .attr("user_id", AttributeType::Number),
        )
    }

    fn relation(kind: RelationKind, alias: &str, target: Arc<ModelDefinition>) -> IncludedRelation {
        IncludedRelation {
            alias: alias.to_string(),
            relation: RelationDefinition {
                kind,
                alias: alias.to_string(),
                owner: "User".to_string(),
                target: target.name().to_string(),
                foreign_key: "user_id".to_string(),
                through: None,
            },
            target,
        }
    }

    fn instance(definition: &Arc<ModelDefinition>, attrs: &[(&str, i64)]) -> ModelInstance {
        let attrs = attrs
            .iter()
            .map(|(name, value)| (name.to_string(), DatabaseValue::Int64(*value)))
            .collect();
        ModelInstance::hydrated(Arc::clone(definition), attrs)
    }

    fn row(user_id: i64, post_id: Option<i64>) -> HydratedRow {
        let post = post_id.map(|id| instance(&post_def(), &[("id", id), ("user_id", user_id)]));
        HydratedRow {
            instance: instance(&user_def(), &[("id", user_id)]),
            related: vec![RelatedRow {
                alias: "posts".to_string(),
                marker: post_id.map(|_| DatabaseValue::Int64(user_id)),
                instance: post,
            }],
        }
    }

    fn post_ids(parent: &ModelInstance) -> Vec<i64> {
        parent
            .relation("posts")
            .unwrap()
            .iter()
            .filter_map(|p| p.get("id").and_then(DatabaseValue::as_i64))
            .collect()
    }

    #[test]
    fn test_fan_out_collapses_to_one_parent_per_key() {
        let included = [relation(RelationKind::HasMany, "posts", post_def())];
        let rows = vec![row(1, Some(10)), row(2, Some(20)), row(1, Some(11)), row(1, Some(12))];

        let parents = RelationAssembler.assemble(rows, &included);
        assert_eq!(parents.len(), 2);
        assert_eq!(parents[0].get("id"), Some(&DatabaseValue::Int64(1)));
        assert_eq!(post_ids(&parents[0]), vec![10, 11, 12]);
        assert_eq!(post_ids(&parents[1]), vec![20]);
    }

    #[test]
    fn test_child_count_does_not_depend_on_row_order() {
        let included = [relation(RelationKind::HasMany, "posts", post_def())];
        let forward = vec![row(1, Some(10)), row(1, Some(11)), row(1, Some(12))];
        let shuffled = vec![row(1, Some(12)), row(1, Some(10)), row(1, Some(11))];

        for rows in [forward, shuffled] {
            let parents = RelationAssembler.assemble(rows, &included);
            assert_eq!(parents.len(), 1);
            assert_eq!(parents[0].relation("posts").unwrap().len(), 3);
        }
    }

    #[test]
    fn test_duplicate_related_rows_are_kept_once() {
        let included = [relation(RelationKind::HasMany, "posts", post_def())];
        let rows = vec![row(1, Some(10)), row(1, Some(10))];
        let parents = RelationAssembler.assemble(rows, &included);
        assert_eq!(post_ids(&parents[0]), vec![10]);
    }

    #[test]
    fn test_parent_without_matches_gets_empty_list() {
        let included = [relation(RelationKind::HasMany, "posts", post_def())];
        let parents = RelationAssembler.assemble(vec![row(3, None)], &included);
        assert_eq!(parents[0].relation("posts"), Some(&[][..]));
    }

    #[test]
    fn test_belongs_to_correlates_on_the_parent_foreign_key() {
        let included = [relation(RelationKind::BelongsTo, "author", user_def())];
        let post = instance(&post_def(), &[("id", 10), ("user_id", 1)]);
        let rows = vec![HydratedRow {
            instance: post,
            related: vec![RelatedRow {
                alias: "author".to_string(),
                marker: Some(DatabaseValue::Int64(1)),
                instance: Some(instance(&user_def(), &[("id", 1)])),
            }],
        }];

        let posts = RelationAssembler.assemble(rows, &included);
        assert_eq!(posts[0].relation("author").unwrap().len(), 1);
    }
}
