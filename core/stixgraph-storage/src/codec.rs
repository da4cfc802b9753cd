//! Column encodings shared by the stores.

use crate::{StorageError, StorageResult};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Fixed-width RFC 3339 so lexical order is chronological order.
pub(crate) fn ts(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_ts(raw: &str) -> StorageResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

pub(crate) fn parse_opt_ts(raw: Option<String>) -> StorageResult<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_ts).transpose()
}

/// Serde name of a unit enum variant (`"pending"`, `"application/json"`).
pub(crate) fn enum_text<T: Serialize>(value: &T) -> StorageResult<String> {
    match serde_json::to_value(value)? {
        serde_json::Value::String(s) => Ok(s),
        other => Err(StorageError::InvalidData(format!(
            "expected a unit variant, got {other}"
        ))),
    }
}

pub(crate) fn parse_enum<T: DeserializeOwned>(raw: &str) -> StorageResult<T> {
    Ok(serde_json::from_value(serde_json::Value::String(raw.to_string()))?)
}

/// Field names are spliced into SQL, so only identifiers are accepted.
pub(crate) fn checked_field(field: &str) -> StorageResult<&str> {
    let valid = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(field)
    } else {
        Err(StorageError::InvalidData(format!("invalid field name: {field}")))
    }
}
