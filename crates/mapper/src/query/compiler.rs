//! SQL Compiler - renders a mapped `QueryAst` as parametrized SQL text
//!
//! Compilation is a pure function of the AST: the same tree always yields the
//! same text and the same parameter order.

use std::fmt::Debug;

use super::ast::{
    ColumnRef, DeleteAst, InsertAst, JoinClause, JoinOperand, OutputName, Predicate, QueryAst,
    SelectAst, SelectItem, TableRef, UpdateAst,
};
use super::types::QueryOperator;
use crate::backends::DatabaseValue;
use crate::error::{ModelError, ModelResult};

/// SQL text with positional placeholders plus its ordered parameters
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    pub sql: String,
    pub params: Vec<DatabaseValue>,
}

impl CompiledStatement {
    pub fn new(sql: impl Into<String>, params: Vec<DatabaseValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Turns a statement tree into dialect-specific SQL
pub trait SqlCompiler: Send + Sync + Debug {
    fn compile(&self, ast: &QueryAst) -> ModelResult<CompiledStatement>;
}

/// MySQL dialect: backtick identifiers, `?` placeholders
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlCompiler;

impl MySqlCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl SqlCompiler for MySqlCompiler {
    fn compile(&self, ast: &QueryAst) -> ModelResult<CompiledStatement> {
        let mut writer = SqlWriter::default();
        match ast {
            QueryAst::Select(select) => writer.select(select)?,
            QueryAst::Insert(insert) => writer.insert(insert),
            QueryAst::Update(update) => writer.update(update)?,
            QueryAst::Delete(delete) => writer.delete(delete)?,
        }
        Ok(CompiledStatement::new(writer.sql, writer.params))
    }
}

/// Quote an identifier, doubling embedded backticks
pub fn quote_identifier(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}

#[derive(Default)]
struct SqlWriter {
    sql: String,
    params: Vec<DatabaseValue>,
}

impl SqlWriter {
    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    fn bind(&mut self, value: &DatabaseValue) {
        self.sql.push('?');
        self.params.push(value.clone());
    }

    fn column(&mut self, column: &ColumnRef) {
        let text = format!(
            "{}.{}",
            quote_identifier(&column.table),
            quote_identifier(&column.column)
        );
        self.push(&text);
    }

    fn table(&mut self, table: &TableRef) {
        let mut text = quote_identifier(&table.table);
        if table.alias != table.table {
            text.push_str(" AS ");
            text.push_str(&quote_identifier(&table.alias));
        }
        self.push(&text);
    }

    fn select(&mut self, select: &SelectAst) -> ModelResult<()> {
        self.push(if select.distinct { "SELECT DISTINCT " } else { "SELECT " });
        if select.columns.is_empty() {
            self.push(&format!("{}.*", quote_identifier(&select.from.alias)));
        }
        for (i, item) in select.columns.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.select_item(item);
        }

        self.push(" FROM ");
        self.table(&select.from);

        for join in &select.joins {
            self.join(join)?;
        }

        self.where_clause(&select.predicates)?;

        if !select.group_by.is_empty() {
            self.push(" GROUP BY ");
            for (i, column) in select.group_by.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.column(column);
            }
        }

        if !select.order.is_empty() {
            self.push(" ORDER BY ");
            for (i, order) in select.order.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.column(&order.column);
                self.push(&format!(" {}", order.direction));
            }
        }

        if let Some(limit) = select.limit {
            self.push(&format!(" LIMIT {}", limit));
            if let Some(offset) = select.offset {
                self.push(&format!(" OFFSET {}", offset));
            }
        }
        Ok(())
    }

    fn select_item(&mut self, item: &SelectItem) {
        match item {
            SelectItem::AllColumns(alias) => self.push(&format!("{}.*", quote_identifier(alias))),
            SelectItem::Column { column, output } => {
                self.column(column);
                let alias = match output {
                    OutputName::Bare => None,
                    OutputName::Prefixed(prefix) => Some(format!("{}_{}", prefix, column.column)),
                    OutputName::Exact(name) => Some(name.clone()),
                };
                if let Some(alias) = alias {
                    self.push(&format!(" AS {}", quote_identifier(&alias)));
                }
            }
            SelectItem::CountDistinct { column, output } => {
                self.push("COUNT(DISTINCT ");
                self.column(column);
                self.push(&format!(") AS {}", quote_identifier(output)));
            }
        }
    }

    fn join(&mut self, join: &JoinClause) -> ModelResult<()> {
        self.push(&format!(" {} ", join.join_type));
        match &join.subquery {
            Some(subquery) => {
                self.push("(");
                self.select(subquery)?;
                self.push(&format!(") AS {}", quote_identifier(&join.table.alias)));
            }
            None => self.table(&join.table),
        }
        self.push(" ON ");
        for (i, (column, operand)) in join.on.iter().enumerate() {
            if i > 0 {
                self.push(" AND ");
            }
            self.column(column);
            self.push(" = ");
            match operand {
                JoinOperand::Column(other) => self.column(other),
                JoinOperand::Value(value) => self.bind(value),
            }
        }
        Ok(())
    }

    fn where_clause(&mut self, predicates: &[Predicate]) -> ModelResult<()> {
        if predicates.is_empty() {
            return Ok(());
        }
        self.push(" WHERE ");
        for (i, predicate) in predicates.iter().enumerate() {
            if i > 0 {
                self.push(" AND ");
            }
            self.predicate(predicate)?;
        }
        Ok(())
    }

    fn predicate(&mut self, predicate: &Predicate) -> ModelResult<()> {
        let operator = predicate.operator;
        let is_null_value = predicate.value.as_ref().map_or(true, DatabaseValue::is_null);

        match operator {
            QueryOperator::IsNull | QueryOperator::IsNotNull => {
                self.column(&predicate.column);
                self.push(&format!(" {}", operator));
            }
            QueryOperator::Equal | QueryOperator::NotEqual if is_null_value => {
                self.column(&predicate.column);
                self.push(if operator == QueryOperator::Equal {
                    " IS NULL"
                } else {
                    " IS NOT NULL"
                });
            }
            QueryOperator::In | QueryOperator::NotIn => {
                if predicate.values.is_empty() {
                    // nothing is in an empty set
                    self.push(if operator == QueryOperator::In { "1 = 0" } else { "1 = 1" });
                    return Ok(());
                }
                self.column(&predicate.column);
                self.push(&format!(" {} (", operator));
                for (i, value) in predicate.values.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.bind(value);
                }
                self.push(")");
            }
            _ => {
                let value = predicate.value.as_ref().ok_or_else(|| {
                    ModelError::Query(format!(
                        "Operator {} on '{}' requires a value",
                        operator, predicate.column.column
                    ))
                })?;
                self.column(&predicate.column);
                self.push(&format!(" {} ", operator));
                self.bind(value);
            }
        }
        Ok(())
    }

    fn insert(&mut self, insert: &InsertAst) {
        self.push("INSERT INTO ");
        self.push(&quote_identifier(&insert.table.table));
        let columns: Vec<String> = insert
            .values
            .iter()
            .map(|(column, _)| quote_identifier(column))
            .collect();
        self.push(&format!(" ({}) VALUES (", columns.join(", ")));
        for (i, (_, value)) in insert.values.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.bind(value);
        }
        self.push(")");
    }

    fn update(&mut self, update: &UpdateAst) -> ModelResult<()> {
        if update.values.is_empty() {
            return Err(ModelError::Query(format!(
                "Update of '{}' has no values to set",
                update.table.table
            )));
        }
        self.push("UPDATE ");
        self.push(&quote_identifier(&update.table.table));
        self.push(" SET ");
        for (i, (column, value)) in update.values.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.push(&format!("{} = ", quote_identifier(column)));
            self.bind(value);
        }
        self.where_clause(&update.predicates)
    }

    fn delete(&mut self, delete: &DeleteAst) -> ModelResult<()> {
        self.push("DELETE FROM ");
        self.push(&quote_identifier(&delete.table.table));
        self.where_clause(&delete.predicates)
    }
}
