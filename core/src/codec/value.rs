use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, StorageError};

/// Converts a state object into the internal representation.
pub fn to_internal<T: Serialize + ?Sized>(component: &str, state: &T) -> Result<Value> {
    serde_json::to_value(state).map_err(|e| StorageError::schema_with_source(component, e))
}

/// Materializes a state object from the internal representation.
pub fn from_internal<T: DeserializeOwned>(component: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| StorageError::schema_with_source(component, e))
}

/// Deep merge where `overlay` (the stored data) wins and `base` survives
/// wherever the overlay is silent. Non-object values are replaced wholesale.
pub fn merge_into(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(&key) {
                    Some(existing) => merge_into(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, overlay) => overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Window {
        width: u32,
        height: u32,
    }

    #[test]
    fn test_merge_keeps_base_where_overlay_silent() {
        let base = json!({"width": 800, "theme": {"name": "dark", "size": 12}});
        let overlay = json!({"width": 1024, "theme": {"size": 14}});

        assert_eq!(
            merge_into(base, overlay),
            json!({"width": 1024, "theme": {"name": "dark", "size": 14}})
        );
    }

    #[test]
    fn test_merge_replaces_non_objects() {
        assert_eq!(merge_into(json!([1, 2]), json!([3])), json!([3]));
        assert_eq!(merge_into(json!({"a": 1}), json!(5)), json!(5));
    }

    #[test]
    fn test_from_internal_schema_violation() {
        let err = from_internal::<Window>("Window", json!({"width": "wide"})).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::SchemaViolation);
        assert!(err.to_string().contains("Window"));
    }

    #[test]
    fn test_to_internal_rejects_non_string_map_keys() {
        let mut map = std::collections::HashMap::new();
        map.insert((1, 2), "pair");
        assert!(to_internal("Pairs", &map).is_err());
    }
}
