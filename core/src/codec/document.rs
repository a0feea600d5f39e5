use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, StorageError};

pub const DOCUMENT_VERSION: u32 = 1;

/// On-disk encoding of a storage unit, picked from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitFormat {
    Json,
    Toml,
}

impl UnitFormat {
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|s| s.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::Toml,
            _ => Self::Json,
        }
    }

    /// Checks that `value` can be stored in a unit of this format, so the
    /// failure surfaces at `set_state` under the component's name rather
    /// than at `save`.
    pub fn check_encodable(self, component: &str, value: &Value) -> Result<()> {
        match self {
            Self::Json => Ok(()),
            Self::Toml => {
                let mut table = serde_json::Map::new();
                table.insert(component.to_string(), value.clone());
                let mut wrapped = Value::Object(table);
                strip_nulls(&mut wrapped);
                toml::to_string(&wrapped)
                    .map(drop)
                    .map_err(|e| StorageError::schema_with_source(component, e))
            }
        }
    }
}

/// Removes `null` object members, recursing through objects and arrays.
/// TOML has no null; a missing member reads back as `None`.
fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(strip_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}

/// Contents of one storage unit: every component state it holds, keyed by
/// component name. `BTreeMap` keeps the encoding deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitDocument {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub components: BTreeMap<String, Value>,
}

fn default_version() -> u32 {
    DOCUMENT_VERSION
}

impl UnitDocument {
    pub fn new(components: BTreeMap<String, Value>) -> Self {
        Self {
            version: DOCUMENT_VERSION,
            components,
        }
    }

    pub fn encode(&self, format: UnitFormat, unit: &Path) -> Result<Vec<u8>> {
        let unit_name = unit.to_string_lossy();
        match format {
            UnitFormat::Json => {
                let mut out = serde_json::to_vec_pretty(self)
                    .map_err(|e| StorageError::schema_with_source(unit_name, e))?;
                out.push(b'\n');
                Ok(out)
            }
            UnitFormat::Toml => {
                let mut components = Value::Object(self.components.clone().into_iter().collect());
                strip_nulls(&mut components);
                let doc = serde_json::json!({"version": self.version, "components": components});
                toml::to_string_pretty(&doc)
                    .map(String::into_bytes)
                    .map_err(|e| StorageError::schema_with_source(unit_name, e))
            }
        }
    }

    pub fn decode(format: UnitFormat, unit: &Path, bytes: &[u8]) -> Result<Self> {
        let unit_name = unit.to_string_lossy();
        let doc: Self = match format {
            UnitFormat::Json => serde_json::from_slice(bytes)
                .map_err(|e| StorageError::schema_with_source(unit_name.clone(), e))?,
            UnitFormat::Toml => {
                let text = std::str::from_utf8(bytes)
                    .map_err(|e| StorageError::schema_with_source(unit_name.clone(), e))?;
                toml::from_str(text)
                    .map_err(|e| StorageError::schema_with_source(unit_name.clone(), e))?
            }
        };
        if doc.version > DOCUMENT_VERSION {
            return Err(StorageError::schema(
                unit_name,
                format!(
                    "unit document version {} is newer than supported {}",
                    doc.version, DOCUMENT_VERSION
                ),
            ));
        }
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn doc() -> UnitDocument {
        let mut components = BTreeMap::new();
        components.insert("Zeta".to_string(), json!({"enabled": true}));
        components.insert("Alpha".to_string(), json!({"x": 1, "tags": ["a", "b"]}));
        UnitDocument::new(components)
    }

    #[test]
    fn test_format_for_path() {
        assert_eq!(UnitFormat::for_path(Path::new("a/ui.toml")), UnitFormat::Toml);
        assert_eq!(UnitFormat::for_path(Path::new("a/ui.TOML")), UnitFormat::Toml);
        assert_eq!(UnitFormat::for_path(Path::new("a/ui.json")), UnitFormat::Json);
        assert_eq!(UnitFormat::for_path(Path::new("a/ui")), UnitFormat::Json);
    }

    #[test]
    fn test_json_encoding_is_sorted_and_deterministic() {
        let path = Path::new("state.json");
        let bytes = doc().encode(UnitFormat::Json, path).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.find("Alpha").unwrap() < text.find("Zeta").unwrap());
        assert_eq!(bytes, doc().encode(UnitFormat::Json, path).unwrap());
    }

    #[test]
    fn test_toml_document_decodes() {
        let path = Path::new("ui.toml");
        let bytes = doc().encode(UnitFormat::Toml, path).unwrap();
        assert_eq!(UnitDocument::decode(UnitFormat::Toml, path, &bytes).unwrap(), doc());
    }

    #[test]
    fn test_decode_rejects_garbage_and_future_versions() {
        let path = Path::new("state.json");
        assert!(UnitDocument::decode(UnitFormat::Json, path, b"not json").is_err());

        let future = br#"{"version": 99, "components": {}}"#;
        let err = UnitDocument::decode(UnitFormat::Json, path, future).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::SchemaViolation);
    }

    #[test]
    fn test_toml_drops_null_members() {
        let path = Path::new("ui.toml");
        let mut components = BTreeMap::new();
        components.insert("Window".to_string(), json!({"name": "main", "alias": null}));
        components.insert("Unset".to_string(), Value::Null);
        let bytes = UnitDocument::new(components).encode(UnitFormat::Toml, path).unwrap();

        let decoded = UnitDocument::decode(UnitFormat::Toml, path, &bytes).unwrap();
        assert_eq!(decoded.components.get("Window"), Some(&json!({"name": "main"})));
        assert!(!decoded.components.contains_key("Unset"));
    }

    #[test]
    fn test_check_encodable_names_component() {
        let ok = json!({"name": "main", "alias": null, "panes": [{"id": null}]});
        assert!(UnitFormat::Toml.check_encodable("Window", &ok).is_ok());

        let bad = json!({"slots": [1, null]});
        assert!(UnitFormat::Json.check_encodable("Window", &bad).is_ok());
        match UnitFormat::Toml.check_encodable("Window", &bad).unwrap_err() {
            StorageError::Schema { component, .. } => assert_eq!(component, "Window"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_decode_defaults_missing_fields() {
        let doc = UnitDocument::decode(UnitFormat::Json, Path::new("s.json"), b"{}").unwrap();
        assert_eq!(doc.version, DOCUMENT_VERSION);
        assert!(doc.components.is_empty());
    }
}
