//! Query Normalizer - turns a descriptor into one canonical query shape
//!
//! Shorthand keys are hoisted under `where`, numeric strings become numbers,
//! `sort` becomes `order`, and pagination defaults and bounds are applied.

use serde_json::Value as JsonValue;

use super::descriptor::{is_reserved_key, is_structured_key, JsonMap, QueryDescriptor};
use super::types::{JoinType, OrderDirection, QueryOperator, QueryType, WhereCondition};
use crate::backends::DatabaseValue;
use crate::config::MapperConfig;
use crate::error::{ModelError, ModelResult};

/// Right-hand side of a join condition in a descriptor
#[derive(Debug, Clone, PartialEq)]
pub enum JoinTarget {
    /// `table.column` reference, written `$table.column$` in descriptors
    Column(String),
    Value(DatabaseValue),
}

/// Explicit join from a `*Join` descriptor key
#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    pub join_type: JoinType,
    pub table: String,
    /// (column of the joined table, operand)
    pub on: Vec<(String, JoinTarget)>,
}

/// Canonical query: every descriptor, shorthand or structured, ends up here
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedQuery {
    pub query_type: QueryType,
    pub table: Option<String>,
    pub columns: Vec<String>,
    pub conditions: Vec<WhereCondition>,
    pub joins: Vec<JoinSpec>,
    /// `None` values are left out of the statement entirely
    pub values: Vec<(String, Option<DatabaseValue>)>,
    pub order: Vec<(String, OrderDirection)>,
    pub group_by: Vec<String>,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
    pub include: Vec<String>,
}

impl NormalizedQuery {
    pub fn new(query_type: QueryType) -> Self {
        Self {
            query_type,
            table: None,
            columns: Vec::new(),
            conditions: Vec::new(),
            joins: Vec::new(),
            values: Vec::new(),
            order: Vec::new(),
            group_by: Vec::new(),
            offset: None,
            limit: None,
            include: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryNormalizer {
    default_limit: i64,
    max_limit: i64,
}

impl QueryNormalizer {
    pub fn new(config: &MapperConfig) -> Self {
        Self {
            default_limit: config.default_limit,
            max_limit: config.max_limit,
        }
    }

    pub fn normalize(&self, descriptor: QueryDescriptor) -> ModelResult<NormalizedQuery> {
        let structured = descriptor.is_structured();
        let mut map = descriptor.into_map();

        if !structured {
            hoist_shorthand(&mut map);
        }

        if let Some(sort) = map.remove("sort") {
            map.entry("order").or_insert(sort);
        }

        let query_type = match map.get("type") {
            None | Some(JsonValue::Null) => QueryType::Select,
            Some(JsonValue::String(name)) => QueryType::from_name(name)
                .ok_or_else(|| ModelError::Query(format!("Unknown query type '{}'", name)))?,
            Some(other) => {
                return Err(ModelError::Query(format!("Invalid query type {}", other)));
            }
        };

        let mut query = NormalizedQuery::new(query_type);
        query.table = map.get("table").and_then(JsonValue::as_str).map(str::to_string);
        query.columns = parse_name_list(map.get("columns"), "columns")?;
        query.group_by = parse_name_list(map.get("groupBy"), "groupBy")?;
        query.include = parse_name_list(map.get("include"), "include")?;
        query.order = parse_order(map.get("order"))?;

        if let Some(clause) = map.get("where") {
            query.conditions = parse_where(clause)?;
        }

        for (key, value) in &map {
            if key.ends_with("Join") {
                query.joins.extend(parse_join(key, value)?);
            } else if !is_reserved_key(key) {
                tracing::debug!(key = %key, "ignoring unrecognized key in structured query");
            }
        }

        if let Some(values) = map.get("values") {
            query.values = parse_values(values)?;
        }

        if query_type == QueryType::Select {
            self.apply_pagination(&map, &mut query)?;
        }

        Ok(query)
    }

    fn apply_pagination(&self, map: &JsonMap, query: &mut NormalizedQuery) -> ModelResult<()> {
        let requested = match parse_integer(map.get("pageSize"), "pageSize")? {
            Some(size) => Some(size),
            None => parse_integer(map.get("limit"), "limit")?,
        };
        let limit = match requested {
            Some(limit) if limit > 0 => limit.min(self.max_limit),
            _ => self.default_limit.min(self.max_limit),
        };

        let offset = match parse_integer(map.get("page"), "page")? {
            Some(page) => page.max(0).checked_mul(limit).ok_or_else(|| {
                ModelError::Query(format!("page {} with page size {} is out of range", page, limit))
            })?,
            None => parse_integer(map.get("offset"), "offset")?
                .unwrap_or(0)
                .max(0),
        };

        query.limit = Some(limit);
        query.offset = Some(offset);
        Ok(())
    }
}

/// Move every non-reserved top-level key under `where`
fn hoist_shorthand(map: &mut JsonMap) {
    let keys: Vec<String> = map
        .keys()
        .filter(|key| !is_reserved_key(key) && !is_structured_key(key))
        .cloned()
        .collect();
    if keys.is_empty() {
        return;
    }

    let mut clause = JsonMap::new();
    for key in keys {
        if let Some(value) = map.remove(&key) {
            clause.insert(key, value);
        }
    }
    map.insert("where".to_string(), JsonValue::Object(clause));
}

/// Exact numeric parsing: the whole string must be a finite number
pub fn parse_numeric(text: &str) -> Option<DatabaseValue> {
    if text.is_empty()
        || !text.chars().any(|c| c.is_ascii_digit())
        || !text
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
    {
        return None;
    }
    if let Ok(int) = text.parse::<i64>() {
        return Some(DatabaseValue::Int64(int));
    }
    text.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(DatabaseValue::Float64)
}

/// Scalar JSON value with numeric strings coerced to numbers
fn coerce_scalar(value: &JsonValue) -> DatabaseValue {
    match value {
        JsonValue::String(text) => {
            parse_numeric(text).unwrap_or_else(|| DatabaseValue::String(text.clone()))
        }
        other => DatabaseValue::from_json(other.clone()),
    }
}

fn parse_where(clause: &JsonValue) -> ModelResult<Vec<WhereCondition>> {
    let JsonValue::Object(clause) = clause else {
        return Err(ModelError::Query(format!(
            "'where' must be an object, got {}",
            clause
        )));
    };

    let mut conditions = Vec::new();
    for (key, value) in clause {
        parse_criteria(key, value, &mut conditions)?;
    }
    Ok(conditions)
}

fn parse_criteria(key: &str, value: &JsonValue, out: &mut Vec<WhereCondition>) -> ModelResult<()> {
    match value {
        JsonValue::Object(operators)
            if !operators.is_empty() && operators.keys().all(|k| k.starts_with('$')) =>
        {
            for (token, operand) in operators {
                let operator = QueryOperator::from_token(token).ok_or_else(|| {
                    ModelError::Query(format!("Unknown operator '{}' on '{}'", token, key))
                })?;
                out.push(operator_condition(key, operator, operand)?);
            }
        }
        JsonValue::Array(items) => {
            out.push(WhereCondition::list(
                key,
                QueryOperator::In,
                items.iter().map(coerce_scalar).collect(),
            ));
        }
        other => out.push(WhereCondition::new(key, QueryOperator::Equal, coerce_scalar(other))),
    }
    Ok(())
}

fn operator_condition(
    key: &str,
    operator: QueryOperator,
    operand: &JsonValue,
) -> ModelResult<WhereCondition> {
    if operator.is_unary() {
        // `{$null: false}` flips to the opposite test
        let negate = matches!(operand, JsonValue::Bool(false));
        let operator = match (operator, negate) {
            (QueryOperator::IsNull, true) => QueryOperator::IsNotNull,
            (QueryOperator::IsNotNull, true) => QueryOperator::IsNull,
            (operator, _) => operator,
        };
        return Ok(WhereCondition::unary(key, operator));
    }

    if operator.takes_list() {
        let JsonValue::Array(items) = operand else {
            return Err(ModelError::Query(format!(
                "Operator {} on '{}' expects an array",
                operator, key
            )));
        };
        return Ok(WhereCondition::list(
            key,
            operator,
            items.iter().map(coerce_scalar).collect(),
        ));
    }

    Ok(WhereCondition::new(key, operator, coerce_scalar(operand)))
}

fn parse_join(key: &str, value: &JsonValue) -> ModelResult<Vec<JoinSpec>> {
    let join_type = JoinType::from_descriptor_key(key)
        .ok_or_else(|| ModelError::Query(format!("Unsupported join '{}'", key)))?;
    let JsonValue::Object(tables) = value else {
        return Err(ModelError::Query(format!("'{}' must be an object", key)));
    };

    tables
        .iter()
        .map(|(table, conditions)| {
            let JsonValue::Object(conditions) = conditions else {
                return Err(ModelError::Query(format!(
                    "Join conditions for '{}' must be an object",
                    table
                )));
            };
            let on = conditions
                .iter()
                .map(|(column, operand)| (column.clone(), parse_join_operand(operand)))
                .collect();
            Ok(JoinSpec {
                join_type,
                table: table.clone(),
                on,
            })
        })
        .collect()
}

fn parse_join_operand(operand: &JsonValue) -> JoinTarget {
    if let JsonValue::String(text) = operand {
        if let Some(reference) = text
            .strip_prefix('$')
            .and_then(|rest| rest.strip_suffix('$'))
            .filter(|reference| !reference.is_empty())
        {
            return JoinTarget::Column(reference.to_string());
        }
    }
    JoinTarget::Value(coerce_scalar(operand))
}

fn parse_values(values: &JsonValue) -> ModelResult<Vec<(String, Option<DatabaseValue>)>> {
    let JsonValue::Object(values) = values else {
        return Err(ModelError::Query(format!("'values' must be an object, got {}", values)));
    };
    Ok(values
        .iter()
        .map(|(name, value)| (name.clone(), Some(DatabaseValue::from_json(value.clone()))))
        .collect())
}

/// Comma-delimited string or array of strings
fn parse_name_list(value: Option<&JsonValue>, field: &str) -> ModelResult<Vec<String>> {
    match value {
        None | Some(JsonValue::Null) => Ok(Vec::new()),
        Some(JsonValue::String(text)) => Ok(split_names(text)),
        Some(JsonValue::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(|s| s.trim().to_string()).ok_or_else(|| {
                    ModelError::Query(format!("'{}' entries must be strings", field))
                })
            })
            .filter(|name| !matches!(name, Ok(n) if n.is_empty()))
            .collect(),
        Some(other) => Err(ModelError::Query(format!(
            "'{}' must be a string or array, got {}",
            field, other
        ))),
    }
}

fn split_names(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_order(value: Option<&JsonValue>) -> ModelResult<Vec<(String, OrderDirection)>> {
    match value {
        Some(JsonValue::Object(columns)) => columns
            .iter()
            .map(|(column, direction)| {
                let direction = match direction {
                    JsonValue::String(d) if d.eq_ignore_ascii_case("desc") => OrderDirection::Desc,
                    JsonValue::String(d) if d.eq_ignore_ascii_case("asc") => OrderDirection::Asc,
                    JsonValue::Number(n) if n.as_i64() == Some(-1) => OrderDirection::Desc,
                    JsonValue::Number(n) if n.as_i64() == Some(1) => OrderDirection::Asc,
                    other => {
                        return Err(ModelError::Query(format!(
                            "Invalid direction {} for '{}'",
                            other, column
                        )))
                    }
                };
                Ok((column.clone(), direction))
            })
            .collect(),
        other => Ok(parse_name_list(other, "order")?
            .iter()
            .map(|entry| parse_order_entry(entry))
            .collect()),
    }
}

/// `name`, `-name`, `name desc` or `name asc`
fn parse_order_entry(entry: &str) -> (String, OrderDirection) {
    if let Some(column) = entry.strip_prefix('-') {
        return (column.trim().to_string(), OrderDirection::Desc);
    }
    let mut parts = entry.split_whitespace();
    let column = parts.next().unwrap_or_default().to_string();
    match parts.next() {
        Some(direction) if direction.eq_ignore_ascii_case("desc") => (column, OrderDirection::Desc),
        _ => (column, OrderDirection::Asc),
    }
}

fn parse_integer(value: Option<&JsonValue>, field: &str) -> ModelResult<Option<i64>> {
    match value {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(float_to_i64))
            .map(Some)
            .ok_or_else(|| ModelError::Query(format!("'{}' is out of range", field))),
        Some(JsonValue::String(text)) => match parse_numeric(text.trim()) {
            Some(DatabaseValue::Int64(i)) => Ok(Some(i)),
            Some(DatabaseValue::Float64(f)) => float_to_i64(f)
                .map(Some)
                .ok_or_else(|| ModelError::Query(format!("'{}' is out of range", field))),
            _ => Err(ModelError::Query(format!("'{}' must be numeric, got '{}'", field, text))),
        },
        Some(other) => Err(ModelError::Query(format!(
            "'{}' must be numeric, got {}",
            field, other
        ))),
    }
}

/// Truncate toward zero; `None` for NaN or values outside `i64`
fn float_to_i64(f: f64) -> Option<i64> {
    // 2^63 is exact in f64; i64::MAX is not
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if f.is_finite() && f >= -LIMIT && f < LIMIT {
        Some(f.trunc() as i64)
    } else {
        None
    }
}
