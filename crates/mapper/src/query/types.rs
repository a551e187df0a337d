//! Query Types - Core enums shared by descriptors, the AST and the compiler

use std::fmt;

use crate::backends::DatabaseValue;

/// Query operator types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Like,
    NotLike,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl QueryOperator {
    /// Operator for a `$`-prefixed descriptor token such as `$gte`
    pub fn from_token(token: &str) -> Option<Self> {
        let operator = match token {
            "$eq" => Self::Equal,
            "$ne" => Self::NotEqual,
            "$gt" => Self::GreaterThan,
            "$gte" => Self::GreaterThanOrEqual,
            "$lt" => Self::LessThan,
            "$lte" => Self::LessThanOrEqual,
            "$like" => Self::Like,
            "$nlike" => Self::NotLike,
            "$in" => Self::In,
            "$nin" => Self::NotIn,
            "$null" => Self::IsNull,
            "$notNull" => Self::IsNotNull,
            _ => return None,
        };
        Some(operator)
    }

    /// Whether the operator compares against a list of values
    pub fn takes_list(self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }

    /// Whether the operator takes no value at all
    pub fn is_unary(self) -> bool {
        matches!(self, Self::IsNull | Self::IsNotNull)
    }
}

impl fmt::Display for QueryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryOperator::Equal => write!(f, "="),
            QueryOperator::NotEqual => write!(f, "!="),
            QueryOperator::GreaterThan => write!(f, ">"),
            QueryOperator::GreaterThanOrEqual => write!(f, ">="),
            QueryOperator::LessThan => write!(f, "<"),
            QueryOperator::LessThanOrEqual => write!(f, "<="),
            QueryOperator::Like => write!(f, "LIKE"),
            QueryOperator::NotLike => write!(f, "NOT LIKE"),
            QueryOperator::In => write!(f, "IN"),
            QueryOperator::NotIn => write!(f, "NOT IN"),
            QueryOperator::IsNull => write!(f, "IS NULL"),
            QueryOperator::IsNotNull => write!(f, "IS NOT NULL"),
        }
    }
}

/// Where clause condition, keyed by attribute (optionally `table.attribute`)
#[derive(Debug, Clone, PartialEq)]
pub struct WhereCondition {
    pub column: String,
    pub operator: QueryOperator,
    pub value: Option<DatabaseValue>,
    pub values: Vec<DatabaseValue>, // For IN, NOT IN
}

impl WhereCondition {
    pub fn new(column: impl Into<String>, operator: QueryOperator, value: DatabaseValue) -> Self {
        Self {
            column: column.into(),
            operator,
            value: Some(value),
            values: Vec::new(),
        }
    }

    pub fn equal(column: impl Into<String>, value: impl Into<DatabaseValue>) -> Self {
        Self::new(column, QueryOperator::Equal, value.into())
    }

    pub fn list(
        column: impl Into<String>,
        operator: QueryOperator,
        values: Vec<DatabaseValue>,
    ) -> Self {
        Self {
            column: column.into(),
            operator,
            value: None,
            values,
        }
    }

    pub fn unary(column: impl Into<String>, operator: QueryOperator) -> Self {
        Self {
            column: column.into(),
            operator,
            value: None,
            values: Vec::new(),
        }
    }
}

/// Join types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
}

impl JoinType {
    /// Join type named by a descriptor key such as `innerJoin` or `leftOuterJoin`
    pub fn from_descriptor_key(key: &str) -> Option<Self> {
        let prefix = key.strip_suffix("Join")?;
        match prefix.to_lowercase().as_str() {
            "" | "inner" => Some(JoinType::Inner),
            "left" | "leftouter" => Some(JoinType::Left),
            "right" | "rightouter" => Some(JoinType::Right),
            _ => None,
        }
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER JOIN"),
            JoinType::Left => write!(f, "LEFT JOIN"),
            JoinType::Right => write!(f, "RIGHT JOIN"),
        }
    }
}

/// Order by direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDirection::Asc => write!(f, "ASC"),
            OrderDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// Statement kinds a descriptor can describe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Select,
    Insert,
    Update,
    Delete,
}

impl QueryType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "select" => Some(QueryType::Select),
            "insert" => Some(QueryType::Insert),
            "update" => Some(QueryType::Update),
            "delete" | "remove" => Some(QueryType::Delete),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_tokens() {
        assert_eq!(QueryOperator::from_token("$gte"), Some(QueryOperator::GreaterThanOrEqual));
        assert_eq!(QueryOperator::from_token("$nin"), Some(QueryOperator::NotIn));
        assert_eq!(QueryOperator::from_token("$between"), None);
        assert!(QueryOperator::In.takes_list());
        assert!(QueryOperator::IsNull.is_unary());
    }

    #[test]
    fn test_join_type_from_descriptor_key() {
        assert_eq!(JoinType::from_descriptor_key("innerJoin"), Some(JoinType::Inner));
        assert_eq!(JoinType::from_descriptor_key("leftOuterJoin"), Some(JoinType::Left));
        assert_eq!(JoinType::from_descriptor_key("rightJoin"), Some(JoinType::Right));
        assert_eq!(JoinType::from_descriptor_key("crossJoin"), None);
        assert_eq!(JoinType::from_descriptor_key("where"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(JoinType::Left.to_string(), "LEFT JOIN");
        assert_eq!(QueryOperator::NotLike.to_string(), "NOT LIKE");
        assert_eq!(OrderDirection::Desc.to_string(), "DESC");
    }
}
