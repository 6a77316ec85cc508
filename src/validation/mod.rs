// src/validation/mod.rs
// Parameter Validator: coerces loosely-typed MCP tool arguments (JSON
// values arriving from an LLM, where everything tends to show up as a
// string) into the typed values each tool handler expects, and reports
// every failure found in one pass rather than stopping at the first.

use serde_json::Value;
use std::fmt;

const TRUE_STRINGS: &[&str] = &["true", "True", "TRUE", "1", "yes", "on"];
const FALSE_STRINGS: &[&str] = &["false", "False", "FALSE", "0", "no", "off", ""];

#[derive(Debug, Clone)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    pub received_type: &'static str,
    pub received_repr: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} (received {}: {})",
            self.field, self.message, self.received_type, self.received_repr
        )
    }
}

/// Accumulates field errors for one validation pass and renders them in
/// the aggregated format every tool handler returns to the caller.
#[derive(Debug, Default)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>, received: &Value) {
        self.errors.push(FieldError {
            field: field.into(),
            message: message.into(),
            received_type: json_type_name(received),
            received_repr: value_repr(received),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result<T>(self, value: T) -> Result<T, String> {
        if self.errors.is_empty() {
            Ok(value)
        } else {
            Err(self.render("request"))
        }
    }

    /// Format as `"Invalid <context> - N errors:\n • field: msg (received ...)"`,
    /// collapsing to a single-line form when there is exactly one error.
    pub fn render(&self, context: &str) -> String {
        if self.errors.len() == 1 {
            return format!("Invalid {context}: {}", self.errors[0]);
        }
        let mut out = format!("Invalid {context} - {} errors:\n", self.errors.len());
        for e in &self.errors {
            out.push_str(&format!(" \u{2022} {e}\n"));
        }
        out.pop();
        out
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn value_repr(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Coerce a value expected to be a JSON object. Accepts either a native
/// object or a string that itself parses as a JSON object; arrays and
/// other primitives are rejected outright.
pub fn coerce_object(
    field: &str,
    value: &Value,
    errors: &mut ValidationErrors,
) -> Option<serde_json::Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map.clone()),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => Some(map),
            _ => {
                errors.push(field, "must be a JSON object", value);
                None
            }
        },
        _ => {
            errors.push(field, "must be a JSON object", value);
            None
        }
    }
}

/// Coerce a value expected to be a string-to-string map: accepts a native
/// object or its JSON-encoded-string form, flattening non-string values to
/// their JSON text (the shape an LLM sends for headers/cookies/query params).
pub fn coerce_string_map(
    field: &str,
    value: &Value,
    errors: &mut ValidationErrors,
) -> Option<std::collections::HashMap<String, String>> {
    let map = coerce_object(field, value, errors)?;
    Some(
        map.into_iter()
            .map(|(k, v)| {
                let s = match v {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, s)
            })
            .collect(),
    )
}

/// Coerce a value expected to be a boolean, accepting the common string
/// spellings an LLM tends to emit in place of a native JSON bool.
pub fn coerce_bool(field: &str, value: &Value, errors: &mut ValidationErrors) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) if TRUE_STRINGS.contains(&s.as_str()) => Some(true),
        Value::String(s) if FALSE_STRINGS.contains(&s.as_str()) => Some(false),
        _ => {
            errors.push(field, "must be a boolean", value);
            None
        }
    }
}

/// Coerce a value expected to be an integer, accepting a numeric string.
pub fn coerce_i64(field: &str, value: &Value, errors: &mut ValidationErrors) -> Option<i64> {
    match value {
        Value::Number(n) if n.is_i64() => n.as_i64(),
        Value::Number(n) if n.is_u64() => n.as_u64().map(|v| v as i64),
        Value::String(s) => s.trim().parse::<i64>().ok().or_else(|| {
            errors.push(field, "must be an integer", value);
            None
        }),
        _ => {
            errors.push(field, "must be an integer", value);
            None
        }
    }
}

/// Coerce a value expected to be a float, accepting a numeric string.
pub fn coerce_f64(field: &str, value: &Value, errors: &mut ValidationErrors) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().or_else(|| {
            errors.push(field, "must be a number", value);
            None
        }),
        _ => {
            errors.push(field, "must be a number", value);
            None
        }
    }
}

/// Coerce a value expected to be a string.
pub fn coerce_string(field: &str, value: &Value, errors: &mut ValidationErrors) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        _ => {
            errors.push(field, "must be a string", value);
            None
        }
    }
}

/// Validate that a string is a UUID in canonical 8-4-4-4-12 form.
pub fn validate_uuid(field: &str, value: &Value, errors: &mut ValidationErrors) -> Option<uuid::Uuid> {
    let s = coerce_string(field, value, errors)?;
    let parts: Vec<&str> = s.split('-').collect();
    let shape_ok = parts.len() == 5
        && parts[0].len() == 8
        && parts[1].len() == 4
        && parts[2].len() == 4
        && parts[3].len() == 4
        && parts[4].len() == 12
        && parts.iter().all(|p| p.chars().all(|c| c.is_ascii_hexdigit()));

    if !shape_ok {
        errors.push(field, "must be a canonical UUID (8-4-4-4-12)", value);
        return None;
    }

    match uuid::Uuid::parse_str(&s) {
        Ok(u) => Some(u),
        Err(_) => {
            errors.push(field, "must be a canonical UUID (8-4-4-4-12)", value);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_error_collapses_to_one_line() {
        let mut errors = ValidationErrors::new();
        let v = json!(123);
        coerce_string("name", &v, &mut errors);
        let rendered = errors.render("mission");
        assert!(rendered.starts_with("Invalid mission: name:"));
        assert!(!rendered.contains('\n'));
    }

    #[test]
    fn multiple_errors_render_bulleted_list() {
        let mut errors = ValidationErrors::new();
        coerce_string("name", &json!(1), &mut errors);
        coerce_bool("active", &json!("maybe"), &mut errors);
        let rendered = errors.render("target update");
        assert!(rendered.starts_with("Invalid target update - 2 errors:\n"));
        assert_eq!(rendered.lines().count(), 3);
    }

    #[test]
    fn object_accepts_json_encoded_string() {
        let mut errors = ValidationErrors::new();
        let v = json!(r#"{"a": 1}"#);
        let obj = coerce_object("scope", &v, &mut errors).unwrap();
        assert!(errors.is_empty());
        assert_eq!(obj.get("a"), Some(&json!(1)));
    }

    #[test]
    fn string_map_flattens_non_string_values_and_accepts_json_strings() {
        let mut errors = ValidationErrors::new();
        let v = json!(r#"{"page": 1, "tag": "dark"}"#);
        let map = coerce_string_map("params", &v, &mut errors).unwrap();
        assert!(errors.is_empty());
        assert_eq!(map.get("page"), Some(&"1".to_string()));
        assert_eq!(map.get("tag"), Some(&"dark".to_string()));
    }

    #[test]
    fn object_rejects_array() {
        let mut errors = ValidationErrors::new();
        let v = json!([1, 2]);
        assert!(coerce_object("scope", &v, &mut errors).is_none());
        assert!(!errors.is_empty());
    }

    #[test]
    fn bool_accepts_common_string_spellings() {
        let mut errors = ValidationErrors::new();
        assert_eq!(coerce_bool("x", &json!("yes"), &mut errors), Some(true));
        assert_eq!(coerce_bool("x", &json!("OFF"), &mut errors), None);
        assert_eq!(coerce_bool("x", &json!("off"), &mut errors), Some(false));
        assert_eq!(coerce_bool("x", &json!(""), &mut errors), Some(false));
    }

    #[test]
    fn numeric_strings_coerce() {
        let mut errors = ValidationErrors::new();
        assert_eq!(coerce_i64("port", &json!("80"), &mut errors), Some(80));
        assert_eq!(coerce_f64("score", &json!("12.5"), &mut errors), Some(12.5));
        assert!(errors.is_empty());
    }

    #[test]
    fn uuid_requires_canonical_form() {
        let mut errors = ValidationErrors::new();
        let ok = json!("550e8400-e29b-41d4-a716-446655440000");
        assert!(validate_uuid("id", &ok, &mut errors).is_some());
        assert!(errors.is_empty());

        let bad = json!("550e8400e29b41d4a716446655440000");
        assert!(validate_uuid("id", &bad, &mut errors).is_none());
        assert!(!errors.is_empty());
    }
}
