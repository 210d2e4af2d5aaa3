//! JSON Schema subset used to check tool arguments before execution.
//!
//! Supported keywords: `type` (single or list), `properties`, `required`,
//! `additionalProperties` (boolean or schema), `enum`, `items`, `minimum`,
//! `maximum`, `minLength`, `maxLength`, `minItems`, `maxItems`. Unknown
//! keywords are ignored.

use serde_json::{Map, Value};

/// First argument that does not satisfy the declared schema
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{path}: {message}")]
pub struct SchemaViolation {
    /// Location of the offending value, `$` being the argument object
    pub path: String,
    pub message: String,
}

impl SchemaViolation {
    fn new(path: &str, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

/// Validates `value` against `schema`
pub fn validate(schema: &Value, value: &Value) -> Result<(), SchemaViolation> {
    validate_at(schema, value, "$")
}

fn validate_at(schema: &Value, value: &Value, path: &str) -> Result<(), SchemaViolation> {
    let Some(schema) = schema.as_object() else {
        // `true`, `{}` and non-object schemas accept anything
        return Ok(());
    };

    if let Some(expected) = schema.get("type") {
        check_type(expected, value, path)?;
    }

    if let Some(allowed) = schema.get("enum").and_then(|e| e.as_array()) {
        if !allowed.contains(value) {
            let options: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
            return Err(SchemaViolation::new(
                path,
                format!("{} is not one of [{}]", value, options.join(", ")),
            ));
        }
    }

    match value {
        Value::Object(object) => validate_object(schema, object, path)?,
        Value::Array(items) => validate_array(schema, items, path)?,
        Value::Number(number) => {
            if let Some(n) = number.as_f64() {
                if let Some(min) = schema.get("minimum").and_then(|m| m.as_f64()) {
                    if n < min {
                        return Err(SchemaViolation::new(path, format!("{} is below minimum {}", n, min)));
                    }
                }
                if let Some(max) = schema.get("maximum").and_then(|m| m.as_f64()) {
                    if n > max {
                        return Err(SchemaViolation::new(path, format!("{} is above maximum {}", n, max)));
                    }
                }
            }
        }
        Value::String(text) => {
            let len = text.chars().count() as u64;
            if let Some(min) = schema.get("minLength").and_then(|m| m.as_u64()) {
                if len < min {
                    return Err(SchemaViolation::new(path, format!("shorter than {} characters", min)));
                }
            }
            if let Some(max) = schema.get("maxLength").and_then(|m| m.as_u64()) {
                if len > max {
                    return Err(SchemaViolation::new(path, format!("longer than {} characters", max)));
                }
            }
        }
        Value::Bool(_) | Value::Null => {}
    }

    Ok(())
}

fn validate_object(
    schema: &Map<String, Value>,
    object: &Map<String, Value>,
    path: &str,
) -> Result<(), SchemaViolation> {
    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for name in required.iter().filter_map(|r| r.as_str()) {
            if !object.contains_key(name) {
                return Err(SchemaViolation::new(
                    path,
                    format!("missing required property '{}'", name),
                ));
            }
        }
    }

    let properties = schema.get("properties").and_then(|p| p.as_object());
    let additional = schema.get("additionalProperties");

    for (name, item) in object {
        let item_path = format!("{}.{}", path, name);
        match properties.and_then(|p| p.get(name)) {
            Some(property_schema) => validate_at(property_schema, item, &item_path)?,
            None => match additional {
                Some(Value::Bool(false)) => {
                    return Err(SchemaViolation::new(
                        path,
                        format!("unexpected property '{}'", name),
                    ))
                }
                Some(extra_schema @ Value::Object(_)) => {
                    validate_at(extra_schema, item, &item_path)?
                }
                _ => {}
            },
        }
    }

    Ok(())
}

fn validate_array(
    schema: &Map<String, Value>,
    items: &[Value],
    path: &str,
) -> Result<(), SchemaViolation> {
    let len = items.len() as u64;
    if let Some(min) = schema.get("minItems").and_then(|m| m.as_u64()) {
        if len < min {
            return Err(SchemaViolation::new(path, format!("fewer than {} items", min)));
        }
    }
    if let Some(max) = schema.get("maxItems").and_then(|m| m.as_u64()) {
        if len > max {
            return Err(SchemaViolation::new(path, format!("more than {} items", max)));
        }
    }
    if let Some(item_schema) = schema.get("items") {
        for (index, item) in items.iter().enumerate() {
            validate_at(item_schema, item, &format!("{}[{}]", path, index))?;
        }
    }
    Ok(())
}

fn check_type(expected: &Value, value: &Value, path: &str) -> Result<(), SchemaViolation> {
    let names: Vec<&str> = match expected {
        Value::String(name) => vec![name.as_str()],
        Value::Array(names) => names.iter().filter_map(|n| n.as_str()).collect(),
        _ => return Ok(()),
    };

    if names.iter().any(|name| matches_type(name, value)) {
        Ok(())
    } else {
        Err(SchemaViolation::new(
            path,
            format!("expected {}, got {}", names.join(" or "), type_name(value)),
        ))
    }
}

fn matches_type(name: &str, value: &Value) -> bool {
    match name {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => {
            value.is_i64()
                || value.is_u64()
                || value.as_f64().map(|n| n.fract() == 0.0).unwrap_or(false)
        }
        // Unknown type names are not ours to reject
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
