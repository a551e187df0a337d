//! Column mapping - attribute names to storage columns, on the AST
//!
//! Every column reference is resolved through the model bound to its table
//! alias, so renamed attributes never depend on rewriting SQL text.

use std::collections::HashMap;

use super::ast::{ColumnRef, JoinOperand, Predicate, QueryAst, SelectAst, SelectItem, TableRef};
use crate::model::ModelDefinition;
use crate::schema::Schema;

fn alias_models<'s, 't>(
    tables: impl Iterator<Item = &'t TableRef>,
    schema: &'s Schema,
) -> HashMap<String, &'s ModelDefinition> {
    tables
        .filter_map(|table| {
            let model = schema.model(table.model.as_deref()?)?;
            Some((table.alias.clone(), model.as_ref()))
        })
        .collect()
}

fn map_ref(column: &mut ColumnRef, models: &HashMap<String, &ModelDefinition>) {
    if let Some(model) = models.get(&column.table) {
        column.column = model.column_for(&column.column).to_string();
    }
}

fn map_predicates(predicates: &mut [Predicate], models: &HashMap<String, &ModelDefinition>) {
    for predicate in predicates {
        map_ref(&mut predicate.column, models);
    }
}

fn map_values(
    values: &mut [(String, crate::backends::DatabaseValue)],
    model: Option<&ModelDefinition>,
) {
    if let Some(model) = model {
        for (name, _) in values.iter_mut() {
            *name = model.column_for(name).to_string();
        }
    }
}

/// Rewrite every column of a select to its storage name
pub fn map_select_columns(select: &mut SelectAst, schema: &Schema) {
    let models = alias_models(select.tables(), schema);

    for item in &mut select.columns {
        match item {
            SelectItem::AllColumns(_) => {}
            SelectItem::Column { column, .. } | SelectItem::CountDistinct { column, .. } => {
                map_ref(column, &models)
            }
        }
    }
    for join in &mut select.joins {
        if let Some(subquery) = join.subquery.as_deref_mut() {
            map_select_columns(subquery, schema);
        }
        for (column, operand) in &mut join.on {
            map_ref(column, &models);
            if let JoinOperand::Column(other) = operand {
                map_ref(other, &models);
            }
        }
    }
    map_predicates(&mut select.predicates, &models);
    for column in &mut select.group_by {
        map_ref(column, &models);
    }
    for order in &mut select.order {
        map_ref(&mut order.column, &models);
    }
}

/// Rewrite every attribute reference in `ast` to its storage column
pub fn map_columns(ast: &mut QueryAst, schema: &Schema) {
    match ast {
        QueryAst::Select(select) => map_select_columns(select, schema),
        QueryAst::Insert(insert) => {
            let models = alias_models(std::iter::once(&insert.table), schema);
            map_values(&mut insert.values, models.get(&insert.table.alias).copied());
        }
        QueryAst::Update(update) => {
            let models = alias_models(std::iter::once(&update.table), schema);
            map_values(&mut update.values, models.get(&update.table.alias).copied());
            map_predicates(&mut update.predicates, &models);
        }
        QueryAst::Delete(delete) => {
            let models = alias_models(std::iter::once(&delete.table), schema);
            map_predicates(&mut delete.predicates, &models);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::DatabaseValue;
    use crate::model::{AttributeDefinition, AttributeType};
    use crate::query::ast::{InsertAst, OutputName};
    use crate::query::types::QueryOperator;

    fn schema() -> Schema {
        let mut builder = Schema::builder();
        builder
            .register(
                ModelDefinition::new("User")
                    .table("users")
                    .attr("id", AttributeType::Number)
                    .attribute(AttributeDefinition::new("fullname", AttributeType::String).column("name")),
            )
            .unwrap();
        builder.build()
    }

    #[test]
    fn test_select_columns_and_predicates_are_mapped() {
        let schema = schema();
        let mut select = SelectAst::new(TableRef::new("users", Some("User")));
        select.columns.push(SelectItem::Column {
            column: ColumnRef::new("users", "fullname"),
            output: OutputName::Bare,
        });
        select.predicates.push(Predicate {
            column: ColumnRef::new("users", "fullname"),
            operator: QueryOperator::Like,
            value: Some(DatabaseValue::from("fullname%")),
            values: Vec::new(),
        });
        select.predicates.push(Predicate {
            column: ColumnRef::new("elsewhere", "fullname"),
            operator: QueryOperator::Equal,
            value: Some(DatabaseValue::from("x")),
            values: Vec::new(),
        });

        map_select_columns(&mut select, &schema);

        assert_eq!(
            select.columns[0],
            SelectItem::Column {
                column: ColumnRef::new("users", "name"),
                output: OutputName::Bare
            }
        );
        assert_eq!(select.predicates[0].column.column, "name");
        // values are never touched
        assert_eq!(select.predicates[0].value, Some(DatabaseValue::from("fullname%")));
        // unknown tables keep their column names
        assert_eq!(select.predicates[1].column.column, "fullname");
    }

    #[test]
    fn test_derived_table_columns_are_mapped() {
        let schema = schema();
        let mut keys = SelectAst::new(TableRef::new("users", Some("User")));
        keys.order.push(crate::query::ast::OrderClause {
            column: ColumnRef::new("users", "fullname"),
            direction: crate::query::types::OrderDirection::Asc,
        });
        let mut select = SelectAst::new(TableRef::new("users", Some("User")));
        select.joins.push(crate::query::ast::JoinClause {
            join_type: crate::query::types::JoinType::Inner,
            table: TableRef::aliased("users", "users_page", Some("User")),
            subquery: Some(Box::new(keys)),
            on: vec![(
                ColumnRef::new("users_page", "fullname"),
                JoinOperand::Column(ColumnRef::new("users", "fullname")),
            )],
        });

        map_select_columns(&mut select, &schema);

        let join = &select.joins[0];
        assert_eq!(join.subquery.as_ref().unwrap().order[0].column.column, "name");
        assert_eq!(join.on[0].0.column, "name");
    }

    #[test]
    fn test_insert_values_are_mapped() {
        let schema = schema();
        let mut ast = QueryAst::Insert(InsertAst {
            table: TableRef::new("users", Some("User")),
            values: vec![("fullname".to_string(), DatabaseValue::from("alex"))],
        });
        map_columns(&mut ast, &schema);
        let QueryAst::Insert(insert) = ast else {
            panic!("expected insert");
        };
        assert_eq!(insert.values[0].0, "name");
    }
}
