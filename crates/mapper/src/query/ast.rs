//! Query AST - the canonical statement tree handed to the SQL compiler
//!
//! Column references start out as attribute names; `columns::map_columns`
//! rewrites them to storage columns before compilation.

use super::types::{JoinType, OrderDirection, QueryOperator};
use crate::backends::DatabaseValue;

/// Suffix of the per-relation column carrying the correlating key
pub const FOREIGN_KEY_MARKER: &str = "_fk";

/// A table as it appears in a statement
#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub table: String,
    pub alias: String,
    /// Model whose attributes the table's columns correspond to
    pub model: Option<String>,
}

impl TableRef {
    pub fn new(table: impl Into<String>, model: Option<&str>) -> Self {
        let table = table.into();
        Self {
            alias: table.clone(),
            table,
            model: model.map(str::to_string),
        }
    }

    pub fn aliased(
        table: impl Into<String>,
        alias: impl Into<String>,
        model: Option<&str>,
    ) -> Self {
        Self {
            table: table.into(),
            alias: alias.into(),
            model: model.map(str::to_string),
        }
    }
}

/// `alias.column`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

/// Name a selected column is returned under
#[derive(Debug, Clone, PartialEq)]
pub enum OutputName {
    /// The column's own name
    Bare,
    /// `{prefix}_{column}`, resolved after column mapping
    Prefixed(String),
    Exact(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// `alias.*`
    AllColumns(String),
    Column { column: ColumnRef, output: OutputName },
    CountDistinct { column: ColumnRef, output: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinOperand {
    Column(ColumnRef),
    Value(DatabaseValue),
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub join_type: JoinType,
    /// Joined table, or the alias a derived table is exposed under
    pub table: TableRef,
    /// Derived table: `(SELECT ...) AS alias`
    pub subquery: Option<Box<SelectAst>>,
    pub on: Vec<(ColumnRef, JoinOperand)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: ColumnRef,
    pub operator: QueryOperator,
    pub value: Option<DatabaseValue>,
    pub values: Vec<DatabaseValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderClause {
    pub column: ColumnRef,
    pub direction: OrderDirection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectAst {
    pub distinct: bool,
    pub from: TableRef,
    pub columns: Vec<SelectItem>,
    pub joins: Vec<JoinClause>,
    pub predicates: Vec<Predicate>,
    pub group_by: Vec<ColumnRef>,
    pub order: Vec<OrderClause>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl SelectAst {
    pub fn new(from: TableRef) -> Self {
        Self {
            distinct: false,
            from,
            columns: Vec::new(),
            joins: Vec::new(),
            predicates: Vec::new(),
            group_by: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Every table reachable in the statement, base table first
    pub fn tables(&self) -> impl Iterator<Item = &TableRef> {
        std::iter::once(&self.from).chain(self.joins.iter().map(|join| &join.table))
    }

    pub fn has_join(&self, alias: &str) -> bool {
        self.joins.iter().any(|join| join.table.alias == alias)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertAst {
    pub table: TableRef,
    pub values: Vec<(String, DatabaseValue)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateAst {
    pub table: TableRef,
    pub values: Vec<(String, DatabaseValue)>,
    pub predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteAst {
    pub table: TableRef,
    pub predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryAst {
    Select(SelectAst),
    Insert(InsertAst),
    Update(UpdateAst),
    Delete(DeleteAst),
}
