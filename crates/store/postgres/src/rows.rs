//! Row structs and enum conversion helpers shared by the repositories.
//!
//! Status-like enums are stored as their snake_case serde names in TEXT
//! columns; structured fields (auth, filter rules, conditions) are JSONB.

use serde::Serialize;
use serde::de::DeserializeOwned;

use metahub_store::StoreError;

/// Serialize a serde string-enum to its wire name.
pub(crate) fn enum_str<T: Serialize>(value: &T) -> Result<String, StoreError> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => Ok(s),
        Ok(other) => Err(StoreError::Backend(format!(
            "expected string-encoded enum, got {other}"
        ))),
        Err(e) => Err(StoreError::Backend(e.to_string())),
    }
}

/// Parse a serde string-enum from its wire name.
pub(crate) fn parse_enum<T: DeserializeOwned>(s: &str) -> Result<T, StoreError> {
    serde_json::from_value(serde_json::Value::String(s.to_owned()))
        .map_err(|e| StoreError::Backend(format!("unknown enum value '{s}': {e}")))
}

/// Deserialize a JSONB column into a typed value.
pub(crate) fn from_json<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|e| StoreError::Backend(format!("bad stored json: {e}")))
}

/// Serialize a typed value into a JSONB column.
pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Backend(e.to_string()))
}

/// Map any sqlx error onto the store taxonomy.
pub(crate) fn db_err(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => StoreError::Connection(e.to_string()),
        other => StoreError::Backend(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use metahub_core::{EventStatus, SourceType};

    use super::*;

    #[test]
    fn enum_roundtrip() {
        assert_eq!(enum_str(&EventStatus::Dlq).unwrap(), "dlq");
        assert_eq!(parse_enum::<EventStatus>("dlq").unwrap(), EventStatus::Dlq);
        assert_eq!(enum_str(&SourceType::Whatsapp).unwrap(), "whatsapp");
        assert!(parse_enum::<EventStatus>("nope").is_err());
    }
}
