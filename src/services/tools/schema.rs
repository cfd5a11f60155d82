//! Tool Schema Sanitization
//!
//! Cleans tool JSON schemas for model compatibility. Tool servers may
//! advertise JSON Schema features that model providers cannot process;
//! this module reduces schemas to the subset providers understand.

use serde_json::Value;

use crate::utils::error::{AppError, AppResult};

/// Keys stripped from every schema level.
const UNSUPPORTED_KEYS: &[&str] = &[
    "$schema",
    "$ref",
    "$id",
    "$defs",
    "definitions",
    "$comment",
    "examples",
    "readOnly",
    "writeOnly",
    "deprecated",
    "contentMediaType",
    "contentEncoding",
    "if",
    "then",
    "else",
];

/// Check that a tool input schema is structurally usable: it must be a
/// JSON object, and its `type` (when present) must be "object".
pub fn validate_schema(schema: &Value) -> AppResult<()> {
    let obj = match schema.as_object() {
        Some(obj) => obj,
        None => return Err(AppError::schema("input schema is not a JSON object")),
    };

    match obj.get("type") {
        None => Ok(()),
        Some(Value::String(t)) if t == "object" => Ok(()),
        Some(other) => Err(AppError::schema(format!(
            "input schema type must be \"object\", got {}",
            other
        ))),
    }
}

/// Remove unsupported JSON Schema features for model compatibility.
///
/// - Strips `$schema`, `$ref`, `$defs` and similar keywords
/// - Flattens `allOf`/`anyOf`/`oneOf` with a single entry into the parent
/// - Summarizes multi-variant `anyOf`/`oneOf` as a description
/// - Recurses into `properties`, `items` and `additionalProperties`
pub fn sanitize_schema(schema: &mut Value) {
    let obj = match schema.as_object_mut() {
        Some(obj) => obj,
        None => return,
    };

    for key in UNSUPPORTED_KEYS {
        obj.remove(*key);
    }

    // allOf: single entry merges into the parent; multiple entries merge
    // their properties and required lists.
    if let Some(Value::Array(entries)) = obj.remove("allOf") {
        for entry in &entries {
            if let Some(inner) = entry.as_object() {
                for (k, v) in inner {
                    if k == "required" {
                        let mut merged: Vec<Value> = obj
                            .get("required")
                            .and_then(|r| r.as_array())
                            .cloned()
                            .unwrap_or_default();
                        if let Some(extra) = v.as_array() {
                            for r in extra {
                                if !merged.contains(r) {
                                    merged.push(r.clone());
                                }
                            }
                        }
                        obj.insert("required".to_string(), Value::Array(merged));
                    } else if k == "properties" {
                        let merged = obj
                            .entry("properties")
                            .or_insert_with(|| Value::Object(serde_json::Map::new()));
                        if let (Some(target), Some(extra)) = (merged.as_object_mut(), v.as_object())
                        {
                            for (pk, pv) in extra {
                                target.insert(pk.clone(), pv.clone());
                            }
                        }
                    } else if !obj.contains_key(k) {
                        obj.insert(k.clone(), v.clone());
                    }
                }
            }
        }
    }

    // anyOf/oneOf: single variant merges into the parent; multiple
    // variants collapse to a description plus a string fallback type.
    for keyword in &["anyOf", "oneOf"] {
        if let Some(Value::Array(variants)) = obj.remove(*keyword) {
            if variants.len() == 1 {
                if let Some(inner) = variants[0].as_object() {
                    for (k, v) in inner {
                        if !obj.contains_key(k) {
                            obj.insert(k.clone(), v.clone());
                        }
                    }
                }
            } else if !variants.is_empty() {
                let types: Vec<String> = variants
                    .iter()
                    .filter_map(|v| {
                        v.get("type")
                            .and_then(|t| t.as_str())
                            .map(|s| s.to_string())
                    })
                    .collect();
                if !types.is_empty() && !obj.contains_key("description") {
                    obj.insert(
                        "description".to_string(),
                        Value::String(format!("One of: {}", types.join(", "))),
                    );
                }
                if !obj.contains_key("type") {
                    obj.insert("type".to_string(), Value::String("string".to_string()));
                }
            }
        }
    }

    if let Some(properties) = obj.get_mut("properties") {
        if let Some(props) = properties.as_object_mut() {
            for (_key, prop_schema) in props.iter_mut() {
                sanitize_schema(prop_schema);
            }
        }
    }

    if let Some(items) = obj.get_mut("items") {
        sanitize_schema(items);
    }

    if let Some(additional) = obj.get_mut("additionalProperties") {
        if additional.is_object() {
            sanitize_schema(additional);
        }
    }
}
