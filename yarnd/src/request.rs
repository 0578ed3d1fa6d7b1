//! Typed accessors for the `args` object of a request.
//!
//! Every accessor reports a missing argument and a wrongly typed argument
//! with the exact message the caller hands in, so each scope keeps its own
//! canonical wording. Unsigned accessors reject negatives and fractions.

use serde_json::Value;

use crate::error::{Error, Result};

// Messages shared by every scope that addresses a game.
pub const MISSING_GAME_ID: &str = "missing required game id";
pub const INVALID_GAME_ID: &str = "invalid game id";

/// Parses a required unsigned integer argument.
pub fn required_u64(args: &Value, key: &str, missing: &str, invalid: &str) -> Result<u64> {
    match args.get(key) {
        None => Err(Error::Invalid(missing.to_string())),
        Some(value) => value
            .as_u64()
            .ok_or_else(|| Error::Invalid(invalid.to_string())),
    }
}

/// Parses an optional unsigned integer argument.
pub fn optional_u64(args: &Value, key: &str, invalid: &str) -> Result<Option<u64>> {
    match args.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_u64()
            .map(Some)
            .ok_or_else(|| Error::Invalid(invalid.to_string())),
    }
}

/// Parses a required string argument.
pub fn required_str<'a>(args: &'a Value, key: &str, missing: &str, invalid: &str) -> Result<&'a str> {
    match args.get(key) {
        None => Err(Error::Invalid(missing.to_string())),
        Some(value) => value
            .as_str()
            .ok_or_else(|| Error::Invalid(invalid.to_string())),
    }
}

/// Parses an optional string argument.
pub fn optional_str<'a>(args: &'a Value, key: &str, invalid: &str) -> Result<Option<&'a str>> {
    match args.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_str()
            .map(Some)
            .ok_or_else(|| Error::Invalid(invalid.to_string())),
    }
}

/// Parses an optional boolean argument.
pub fn optional_bool(args: &Value, key: &str, invalid: &str) -> Result<Option<bool>> {
    match args.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_bool()
            .map(Some)
            .ok_or_else(|| Error::Invalid(invalid.to_string())),
    }
}

/// The game id argument used all over the game and entity scopes.
pub fn game_id(args: &Value, key: &str) -> Result<u64> {
    required_u64(args, key, MISSING_GAME_ID, INVALID_GAME_ID)
}

/// Renders a scalar JSON value to a string. Objects, arrays and null are not
/// scalars and yield `None`.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unsigned_accessor_rejects_negatives_and_fractions() {
        let args = json!({"id": -1});
        assert!(matches!(
            game_id(&args, "id"),
            Err(Error::Invalid(message)) if message == INVALID_GAME_ID
        ));

        let args = json!({"id": 1.5});
        assert!(game_id(&args, "id").is_err());

        let args = json!({});
        assert!(matches!(
            game_id(&args, "id"),
            Err(Error::Invalid(message)) if message == MISSING_GAME_ID
        ));

        let args = json!({"id": 3});
        assert_eq!(game_id(&args, "id").unwrap(), 3);
    }

    #[test]
    fn scalars_stringify_and_containers_do_not() {
        assert_eq!(scalar_to_string(&json!("hi")), Some("hi".to_string()));
        assert_eq!(scalar_to_string(&json!(4)), Some("4".to_string()));
        assert_eq!(scalar_to_string(&json!(true)), Some("true".to_string()));
        assert_eq!(scalar_to_string(&json!({"a": 1})), None);
        assert_eq!(scalar_to_string(&json!([1])), None);
        assert_eq!(scalar_to_string(&Value::Null), None);
    }
}
