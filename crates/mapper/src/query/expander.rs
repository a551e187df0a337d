//! Relation Expander - resolves relation keys and includes into joins
//!
//! Works on a `NormalizedQuery` for one model and produces the statement AST
//! (still in attribute names), the matching count statement for selects, and
//! the list of relations the assembler has to regroup.

use std::sync::Arc;

use super::ast::{
    ColumnRef, DeleteAst, InsertAst, JoinClause, JoinOperand, OrderClause, OutputName, Predicate,
    QueryAst, SelectAst, SelectItem, TableRef, UpdateAst, FOREIGN_KEY_MARKER,
};
use super::normalizer::{JoinSpec, JoinTarget, NormalizedQuery};
use super::types::{JoinType, QueryType, WhereCondition};
use crate::backends::DatabaseValue;
use crate::error::{ModelError, ModelResult};
use crate::model::coercion::to_storage;
use crate::model::{DateStorage, ModelDefinition};
use crate::relationships::{RelationDefinition, RelationKind, RelationLookup};
use crate::schema::Schema;

/// A relation requested through `include`
#[derive(Debug, Clone)]
pub struct IncludedRelation {
    pub alias: String,
    pub relation: RelationDefinition,
    pub target: Arc<ModelDefinition>,
}

impl IncludedRelation {
    /// Output name of the correlating key column
    pub fn marker_column(&self) -> String {
        format!("{}_{}", self.alias, FOREIGN_KEY_MARKER)
    }
}

#[derive(Debug, Clone)]
pub struct ExpandedQuery {
    pub ast: QueryAst,
    /// `COUNT(DISTINCT pk)` over the same filters, for selects
    pub count: Option<SelectAst>,
    pub included: Vec<IncludedRelation>,
    /// Alias (and column prefix) of the queried model's table
    pub base_alias: String,
}

pub struct RelationExpander<'a> {
    schema: &'a Schema,
    date_storage: DateStorage,
}

impl<'a> RelationExpander<'a> {
    pub fn new(schema: &'a Schema, date_storage: DateStorage) -> Self {
        Self {
            schema,
            date_storage,
        }
    }

    pub fn expand(
        &self,
        model: &ModelDefinition,
        query: NormalizedQuery,
    ) -> ModelResult<ExpandedQuery> {
        let table = query.table.clone().unwrap_or_else(|| model.table_name());
        let base = TableRef::new(table, Some(model.name()));
        let base_alias = base.alias.clone();

        let mut joins = Vec::new();
        let predicates = self.resolve_conditions(model, &base, &query.conditions, &mut joins)?;
        for spec in &query.joins {
            joins.push(self.explicit_join(&base, spec));
        }

        let ast = match query.query_type {
            QueryType::Select => {
                return self.expand_select(model, base, query, joins, predicates);
            }
            QueryType::Insert => {
                QueryAst::Insert(InsertAst {
                    values: self.storage_values(model, query.values),
                    table: base,
                })
            }
            QueryType::Update => {
                reject_joins(&joins, "update")?;
                QueryAst::Update(UpdateAst {
                    values: self.storage_values(model, query.values),
                    table: base,
                    predicates,
                })
            }
            QueryType::Delete => {
                reject_joins(&joins, "delete")?;
                QueryAst::Delete(DeleteAst {
                    table: base,
                    predicates,
                })
            }
        };

        Ok(ExpandedQuery {
            ast,
            count: None,
            included: Vec::new(),
            base_alias,
        })
    }

    fn expand_select(
        &self,
        model: &ModelDefinition,
        base: TableRef,
        query: NormalizedQuery,
        joins: Vec<JoinClause>,
        predicates: Vec<Predicate>,
    ) -> ModelResult<ExpandedQuery> {
        let mut count = SelectAst::new(base.clone());
        count.joins = joins.clone();
        count.predicates = predicates.clone();
        count.columns = vec![SelectItem::CountDistinct {
            column: ColumnRef::new(&base.alias, model.primary_key_name()),
            output: "total".to_string(),
        }];

        let mut select = SelectAst::new(base.clone());
        select.joins = joins;
        select.predicates = predicates;
        select.group_by = query
            .group_by
            .iter()
            .map(|name| qualify(&base.alias, name))
            .collect();
        select.order = query
            .order
            .iter()
            .map(|(name, direction)| OrderClause {
                column: qualify(&base.alias, name),
                direction: *direction,
            })
            .collect();
        select.limit = query.limit;
        select.offset = query.offset;

        let filter_joins = std::mem::take(&mut select.joins);
        let included = self.expand_includes(model, &base, &query.include, &mut select)?;
        if included.is_empty() {
            select.joins = filter_joins;
        } else {
            page_parent_keys(model, &base, &mut select, filter_joins, &included)?;
        }

        select.columns = if included.is_empty() {
            if query.columns.is_empty() {
                vec![SelectItem::AllColumns(base.alias.clone())]
            } else {
                query
                    .columns
                    .iter()
                    .map(|name| SelectItem::Column {
                        column: qualify(&base.alias, name),
                        output: OutputName::Bare,
                    })
                    .collect()
            }
        } else {
            let mut columns = prefixed_columns(model, &base.alias, &query.columns);
            columns.append(&mut select.columns);
            columns
        };

        Ok(ExpandedQuery {
            base_alias: base.alias.clone(),
            ast: QueryAst::Select(select),
            count: Some(count),
            included,
        })
    }

    /// Left joins plus prefixed columns for every known alias in `include`
    fn expand_includes(
        &self,
        model: &ModelDefinition,
        base: &TableRef,
        aliases: &[String],
        select: &mut SelectAst,
    ) -> ModelResult<Vec<IncludedRelation>> {
        let mut included: Vec<IncludedRelation> = Vec::new();

        for alias in aliases {
            if included.iter().any(|inc| &inc.alias == alias) {
                continue;
            }
            let Some(relation) = self.schema.relation(model.name(), alias) else {
                tracing::warn!(
                    model = %model.name(),
                    alias = %alias,
                    "skipping unknown relation in include"
                );
                continue;
            };
            if *alias == base.alias || select.has_join(alias) {
                return Err(ModelError::Relationship(format!(
                    "Include alias '{}' collides with a table already in the query",
                    alias
                )));
            }
            let target = Arc::clone(self.schema.definition(&relation.target)?);
            let target_table =
                TableRef::aliased(target.table_name(), alias.as_str(), Some(target.name()));
            let base_pk = ColumnRef::new(&base.alias, model.primary_key_name());

            let marker = match (&relation.kind, &relation.through) {
                (RelationKind::BelongsTo, _) => {
                    select.joins.push(JoinClause {
                        join_type: JoinType::Left,
                        table: target_table,
                        subquery: None,
                        on: vec![(
                            ColumnRef::new(alias, target.primary_key_name()),
                            JoinOperand::Column(ColumnRef::new(&base.alias, &relation.foreign_key)),
                        )],
                    });
                    ColumnRef::new(alias, target.primary_key_name())
                }
                (_, Some(through)) => {
                    let junction_alias = format!("{}_through", alias);
                    select.joins.push(JoinClause {
                        join_type: JoinType::Left,
                        table: TableRef::aliased(
                            &through.table,
                            &junction_alias,
                            Some(through.model.as_str()),
                        ),
                        subquery: None,
                        on: vec![(
                            ColumnRef::new(&junction_alias, &relation.foreign_key),
                            JoinOperand::Column(base_pk),
                        )],
                    });
                    select.joins.push(JoinClause {
                        join_type: JoinType::Left,
                        table: target_table,
                        subquery: None,
                        on: vec![(
                            ColumnRef::new(alias, target.primary_key_name()),
                            JoinOperand::Column(ColumnRef::new(
                                &junction_alias,
                                &through.through_key,
                            )),
                        )],
                    });
                    ColumnRef::new(&junction_alias, &relation.foreign_key)
                }
                (_, None) => {
                    select.joins.push(JoinClause {
                        join_type: JoinType::Left,
                        table: target_table,
                        subquery: None,
                        on: vec![(
                            ColumnRef::new(alias, &relation.foreign_key),
                            JoinOperand::Column(base_pk),
                        )],
                    });
                    ColumnRef::new(alias, &relation.foreign_key)
                }
            };

            let include = IncludedRelation {
                alias: alias.clone(),
                relation: relation.clone(),
                target: Arc::clone(&target),
            };
            select.columns.extend(prefixed_columns(&target, alias, &[]));
            select.columns.push(SelectItem::Column {
                column: marker,
                output: OutputName::Exact(include.marker_column()),
            });
            included.push(include);
        }

        Ok(included)
    }

    /// Turn conditions into predicates, adding the joins relation keys need
    fn resolve_conditions(
        &self,
        model: &ModelDefinition,
        base: &TableRef,
        conditions: &[WhereCondition],
        joins: &mut Vec<JoinClause>,
    ) -> ModelResult<Vec<Predicate>> {
        let base_pk = || ColumnRef::new(&base.alias, model.primary_key_name());
        let mut predicates = Vec::with_capacity(conditions.len());

        for condition in conditions {
            let column = if let Some((table, column)) = condition.column.split_once('.') {
                ColumnRef::new(table, column)
            } else {
                match self.schema.lookup(model.name(), &condition.column) {
                    Some(RelationLookup::Owned(relation)) => match (&relation.kind, &relation.through) {
                        (RelationKind::BelongsTo, _) => {
                            ColumnRef::new(&base.alias, &relation.foreign_key)
                        }
                        (_, Some(through)) => {
                            add_join(
                                joins,
                                TableRef::new(&through.table, Some(through.model.as_str())),
                                ColumnRef::new(&through.table, &relation.foreign_key),
                                base_pk(),
                            );
                            ColumnRef::new(&through.table, &through.through_key)
                        }
                        (_, None) => {
                            let target = self.schema.definition(&relation.target)?;
                            add_join(
                                joins,
                                TableRef::aliased(
                                    target.table_name(),
                                    &relation.alias,
                                    Some(target.name()),
                                ),
                                ColumnRef::new(&relation.alias, &relation.foreign_key),
                                base_pk(),
                            );
                            ColumnRef::new(&relation.alias, target.primary_key_name())
                        }
                    },
                    Some(RelationLookup::Inbound(relation)) if relation.through.is_some() => {
                        let through = relation.through.as_ref().ok_or_else(|| {
                            ModelError::Relationship(format!(
                                "'{}' has no junction",
                                relation.alias
                            ))
                        })?;
                        add_join(
                            joins,
                            TableRef::new(&through.table, Some(through.model.as_str())),
                            ColumnRef::new(&through.table, &through.through_key),
                            base_pk(),
                        );
                        ColumnRef::new(&through.table, &relation.foreign_key)
                    }
                    _ => ColumnRef::new(&base.alias, &condition.column),
                }
            };

            let mut predicate = Predicate {
                operator: condition.operator,
                value: condition.value.clone(),
                values: condition.values.clone(),
                column,
            };
            if predicate.column.table == base.alias {
                self.coerce_predicate(model, &mut predicate);
            }
            predicates.push(predicate);
        }

        Ok(predicates)
    }

    /// Store predicate values on declared attributes the way they are written
    fn coerce_predicate(&self, model: &ModelDefinition, predicate: &mut Predicate) {
        let Some(attribute) = model.attribute_def(&predicate.column.column) else {
            return;
        };
        let coerce = |value: DatabaseValue| {
            to_storage(model, Some(attribute), Some(value), self.date_storage)
                .unwrap_or(DatabaseValue::Null)
        };
        predicate.value = predicate.value.take().map(coerce);
        predicate.values = std::mem::take(&mut predicate.values)
            .into_iter()
            .map(coerce)
            .collect();
    }

    fn explicit_join(&self, base: &TableRef, spec: &JoinSpec) -> JoinClause {
        let model = self.schema.model_for_table(&spec.table).map(|m| m.name().to_string());
        JoinClause {
            join_type: spec.join_type,
            table: TableRef::new(&spec.table, model.as_deref()),
            subquery: None,
            on: spec
                .on
                .iter()
                .map(|(column, target)| {
                    let operand = match target {
                        JoinTarget::Column(reference) => {
                            JoinOperand::Column(qualify(&base.alias, reference))
                        }
                        JoinTarget::Value(value) => JoinOperand::Value(value.clone()),
                    };
                    (ColumnRef::new(&spec.table, column), operand)
                })
                .collect(),
        }
    }

    /// Write values in storage form; `None` values are dropped
    fn storage_values(
        &self,
        model: &ModelDefinition,
        values: Vec<(String, Option<DatabaseValue>)>,
    ) -> Vec<(String, DatabaseValue)> {
        values
            .into_iter()
            .filter_map(|(name, value)| {
                to_storage(model, model.attribute_def(&name), value, self.date_storage)
                    .map(|stored| (name, stored))
            })
            .collect()
    }
}

/// Move filtering and paging into a derived table of parent keys.
///
/// Applied to the joined rows, `LIMIT` would count children instead of
/// parents. The key query gets the filter joins, predicates, grouping, order
/// and paging; the outer query joins it and keeps only the include joins.
fn page_parent_keys(
    model: &ModelDefinition,
    base: &TableRef,
    select: &mut SelectAst,
    filter_joins: Vec<JoinClause>,
    included: &[IncludedRelation],
) -> ModelResult<()> {
    let page_alias = format!("{}_page", base.alias);
    if included.iter().any(|inc| inc.alias == page_alias) {
        return Err(ModelError::Relationship(format!(
            "Include alias '{}' collides with the paging table",
            page_alias
        )));
    }
    let pk = model.primary_key_name();
    let include_joins = std::mem::take(&mut select.joins);

    let mut keys = SelectAst::new(base.clone());
    keys.distinct = true;
    keys.columns.push(SelectItem::Column {
        column: ColumnRef::new(&base.alias, pk),
        output: OutputName::Bare,
    });
    // DISTINCT needs every ORDER BY column in the select list
    keys.columns.extend(select.order.iter().enumerate().map(|(i, order)| SelectItem::Column {
        column: order.column.clone(),
        output: OutputName::Exact(format!("order_{}", i)),
    }));
    keys.joins = filter_joins;
    keys.predicates = std::mem::take(&mut select.predicates);
    keys.group_by = std::mem::take(&mut select.group_by);
    keys.order = select.order.clone();
    keys.limit = select.limit.take();
    keys.offset = select.offset.take();

    select.joins.push(JoinClause {
        join_type: JoinType::Inner,
        table: TableRef::aliased(&base.table, &page_alias, base.model.as_deref()),
        subquery: Some(Box::new(keys)),
        on: vec![(
            ColumnRef::new(&page_alias, pk),
            JoinOperand::Column(ColumnRef::new(&base.alias, pk)),
        )],
    });
    select.joins.extend(include_joins);
    Ok(())
}

fn add_join(joins: &mut Vec<JoinClause>, table: TableRef, column: ColumnRef, target: ColumnRef) {
    if joins.iter().any(|join| join.table.alias == table.alias) {
        return;
    }
    joins.push(JoinClause {
        join_type: JoinType::Inner,
        table,
        subquery: None,
        on: vec![(column, JoinOperand::Column(target))],
    });
}

fn reject_joins(joins: &[JoinClause], kind: &str) -> ModelResult<()> {
    if joins.is_empty() {
        Ok(())
    } else {
        Err(ModelError::Query(format!(
            "Relation predicates and joins are not supported in {} queries",
            kind
        )))
    }
}

/// `table.column` stays qualified; bare names belong to `default_table`
fn qualify(default_table: &str, name: &str) -> ColumnRef {
    match name.split_once('.') {
        Some((table, column)) => ColumnRef::new(table, column),
        None => ColumnRef::new(default_table, name),
    }
}

/// Requested (or declared) attributes plus the primary key, `{prefix}_`-named
fn prefixed_columns(
    model: &ModelDefinition,
    prefix: &str,
    requested: &[String],
) -> Vec<SelectItem> {
    let mut names: Vec<&str> = if requested.is_empty() {
        model.attributes().iter().map(|a| a.name.as_str()).collect()
    } else {
        requested.iter().map(String::as_str).collect()
    };
    if !names.contains(&model.primary_key_name()) {
        names.insert(0, model.primary_key_name());
    }
    names
        .into_iter()
        .map(|name| SelectItem::Column {
            column: ColumnRef::new(prefix, name),
            output: OutputName::Prefixed(prefix.to_string()),
        })
        .collect()
}
