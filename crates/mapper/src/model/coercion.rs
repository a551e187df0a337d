//! Value coercion between domain values and stored representations

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};

use super::definition::{AttributeDefinition, AttributeType, DateStorage, ModelDefinition};
use crate::backends::DatabaseValue;

/// Parse a textual date: RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) or `YYYY-MM-DD`
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn from_epoch_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1_000_000_000.0) as u32;
    Utc.timestamp_opt(whole as i64, nanos).single()
}

/// Interpret a value as a date: numbers are epoch seconds, text is parsed
pub fn to_datetime(value: &DatabaseValue) -> Option<DateTime<Utc>> {
    match value {
        DatabaseValue::DateTime(dt) => Some(*dt),
        DatabaseValue::Date(d) => d.and_hms_opt(0, 0, 0).map(|n| Utc.from_utc_datetime(&n)),
        DatabaseValue::Int64(secs) => from_epoch_seconds(*secs as f64),
        DatabaseValue::Float64(secs) => from_epoch_seconds(*secs),
        DatabaseValue::String(s) => match s.trim().parse::<f64>() {
            Ok(secs) if secs.is_finite() => from_epoch_seconds(secs),
            _ => parse_date(s),
        },
        _ => None,
    }
}

/// Normalize a value being set on an attribute (construction and assignment)
pub fn normalize_input(attribute: &AttributeDefinition, value: DatabaseValue) -> DatabaseValue {
    if attribute.attribute_type != AttributeType::Date {
        return value;
    }
    match value {
        DatabaseValue::DateTime(_) | DatabaseValue::Null => value,
        other => to_datetime(&other).map(DatabaseValue::DateTime).unwrap_or(other),
    }
}

/// Render a date according to a column representation
pub fn render_date(dt: &DateTime<Utc>, storage: DateStorage) -> DatabaseValue {
    match storage {
        DateStorage::Datetime => {
            DatabaseValue::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        }
        DateStorage::Timestamp => DatabaseValue::String(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        DateStorage::Epoch => DatabaseValue::Int64(dt.timestamp()),
    }
}

/// Coerce a write value to its stored representation.
///
/// `None` stands for an unset value and is dropped from the statement, which
/// is different from `Some(DatabaseValue::Null)`.
pub fn to_storage(
    model: &ModelDefinition,
    attribute: Option<&AttributeDefinition>,
    value: Option<DatabaseValue>,
    default_storage: DateStorage,
) -> Option<DatabaseValue> {
    let value = value?;

    if let Some(attribute) = attribute {
        if let Some(formatter) = &attribute.formatter {
            return Some(formatter(&value, model));
        }
        if attribute.attribute_type == AttributeType::Date {
            let storage = attribute.date_storage.unwrap_or(default_storage);
            return Some(match to_datetime(&value) {
                Some(dt) => render_date(&dt, storage),
                None => value,
            });
        }
    }

    Some(match value {
        DatabaseValue::Json(json) => DatabaseValue::String(json.to_string()),
        DatabaseValue::Bool(true) => DatabaseValue::Int64(1),
        DatabaseValue::Bool(false) => DatabaseValue::Null,
        other => other,
    })
}

/// Coerce a stored value back to the attribute's domain type
pub fn from_storage(attribute: &AttributeDefinition, value: DatabaseValue) -> DatabaseValue {
    match attribute.attribute_type {
        AttributeType::Boolean => DatabaseValue::Bool(value.is_truthy()),
        AttributeType::Date => match value {
            DatabaseValue::Null => DatabaseValue::Null,
            other => to_datetime(&other).map(DatabaseValue::DateTime).unwrap_or(other),
        },
        AttributeType::Json => match value {
            DatabaseValue::String(text) => match serde_json::from_str(&text) {
                Ok(json) => DatabaseValue::Json(json),
                Err(_) => DatabaseValue::String(text),
            },
            other => other,
        },
        AttributeType::String | AttributeType::Number => value,
    }
}
