//! JSON <-> BSON conversion for fixtures and command-line output.

use crate::errors::QueryError;
use crate::types::Entity;
use bson::Bson;

/// Convert a serde_json::Value that must be an object into a bson::Document.
///
/// # Errors
/// `Validation` for non-object input or values BSON cannot represent.
pub fn json_value_to_bson_document(val: &serde_json::Value) -> Result<bson::Document, QueryError> {
    let obj = val
        .as_object()
        .ok_or_else(|| QueryError::validation("expected JSON object"))?;
    bson::Document::try_from(obj.clone()).map_err(|e| QueryError::validation(e.to_string()))
}

/// Parse a JSON string into a bson::Document. The JSON must be a top-level object.
///
/// # Errors
/// Malformed JSON and non-object input.
pub fn parse_json_to_bson_document(json: &str) -> Result<bson::Document, QueryError> {
    let val: serde_json::Value = serde_json::from_str(json)?;
    json_value_to_bson_document(&val)
}

/// Parse a JSON scalar (or array) into a BSON value, e.g. a unique-lookup operand.
///
/// # Errors
/// Malformed JSON.
pub fn parse_json_value(json: &str) -> Result<Bson, QueryError> {
    let val: serde_json::Value = serde_json::from_str(json)?;
    Bson::try_from(val).map_err(|e| QueryError::validation(e.to_string()))
}

/// Relaxed extended JSON, so plain numbers and strings print as themselves.
#[must_use]
pub fn bson_to_json(value: Bson) -> serde_json::Value {
    value.into_relaxed_extjson()
}

/// An entity's document as one JSON object.
#[must_use]
pub fn entity_to_json(entity: &Entity) -> serde_json::Value {
    bson_to_json(Bson::Document(entity.data.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn json_to_bson_success() {
        let d = parse_json_to_bson_document("{\"a\":1,\"b\":\"x\"}").unwrap();
        assert_eq!(d.get_i32("a").unwrap(), 1);
        assert_eq!(d.get_str("b").unwrap(), "x");
    }

    #[test]
    fn json_to_bson_rejects_array() {
        let e = parse_json_to_bson_document("[1,2,3]").unwrap_err();
        assert!(matches!(e, QueryError::Validation(_)));
    }

    #[test]
    fn entity_json_is_relaxed() {
        let e = Entity::new(1, doc! {"id": 1, "name": "Ann", "tags": ["a"]});
        assert_eq!(entity_to_json(&e), serde_json::json!({"id": 1, "name": "Ann", "tags": ["a"]}));
        assert_eq!(parse_json_value("\"x\"").unwrap(), Bson::String("x".into()));
    }
}
