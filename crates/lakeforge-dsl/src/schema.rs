// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shape validation for property bags.
//!
//! Every configuration entity and every resource descriptor is checked against
//! a schema before it is constructed. A schema is a list of
//! `(field, FieldType)` pairs; a field name ending in [`OPTIONAL_MARKER`] is
//! optional. Optional fields may be absent or `null`. Any present field with
//! the wrong type, or any missing required field, fails immediately.
//! Fields not named in the schema are ignored.

use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Free-form property bag.
pub type Properties = serde_json::Map<String, Value>;

/// Suffix that marks a schema field as optional.
pub const OPTIONAL_MARKER: char = '?';

/// Required type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    /// Any number, integral or not.
    Float,
    Boolean,
    List,
    Map,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::List => "list",
            FieldType::Map => "map",
        }
    }

    /// Whether `value` has this type.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Float => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::List => value.is_array(),
            FieldType::Map => value.is_object(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type name of a JSON value, in [`FieldType`] vocabulary.
pub fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

/// A property bag did not have the declared shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A required field is absent.
    #[error("missing required field '{field}', expected {expected}")]
    MissingField { field: String, expected: FieldType },

    /// A present field has the wrong type.
    #[error("invalid type for '{field}': {actual}, expected {expected}")]
    TypeMismatch {
        field: String,
        actual: &'static str,
        expected: FieldType,
    },

    /// A field has the right type but an unacceptable value.
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl SchemaError {
    /// Name of the offending field.
    pub fn field(&self) -> &str {
        match self {
            SchemaError::MissingField { field, .. }
            | SchemaError::TypeMismatch { field, .. }
            | SchemaError::InvalidValue { field, .. } => field,
        }
    }

    /// Qualify the field with the path of its parent (`parent.field`).
    pub fn within(self, parent: &str) -> Self {
        let qualify = |field: String| format!("{}.{}", parent, field);
        match self {
            SchemaError::MissingField { field, expected } => SchemaError::MissingField {
                field: qualify(field),
                expected,
            },
            SchemaError::TypeMismatch {
                field,
                actual,
                expected,
            } => SchemaError::TypeMismatch {
                field: qualify(field),
                actual,
                expected,
            },
            SchemaError::InvalidValue { field, reason } => SchemaError::InvalidValue {
                field: qualify(field),
                reason,
            },
        }
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        SchemaError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Check `props` against `schema`, stopping at the first violation.
pub fn validate_properties(
    schema: &[(&str, FieldType)],
    props: &Properties,
) -> Result<(), SchemaError> {
    for &(key, expected) in schema {
        let (field, optional) = match key.strip_suffix(OPTIONAL_MARKER) {
            Some(field) => (field, true),
            None => (key, false),
        };

        match props.get(field) {
            None if optional => {}
            Some(Value::Null) if optional => {}
            None => {
                return Err(SchemaError::MissingField {
                    field: field.to_string(),
                    expected,
                });
            }
            Some(value) if !expected.matches(value) => {
                return Err(SchemaError::TypeMismatch {
                    field: field.to_string(),
                    actual: value_type_name(value),
                    expected,
                });
            }
            Some(_) => {}
        }
    }

    Ok(())
}

/// Borrow `value` as a property bag or report it as a mistyped `field`.
pub fn as_properties<'a>(field: &str, value: &'a Value) -> Result<&'a Properties, SchemaError> {
    value.as_object().ok_or_else(|| SchemaError::TypeMismatch {
        field: field.to_string(),
        actual: value_type_name(value),
        expected: FieldType::Map,
    })
}

/// Read a required string field, reporting it the same way validation would.
pub fn required_str(props: &Properties, field: &str) -> Result<String, SchemaError> {
    match props.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(SchemaError::TypeMismatch {
            field: field.to_string(),
            actual: value_type_name(other),
            expected: FieldType::String,
        }),
        None => Err(SchemaError::MissingField {
            field: field.to_string(),
            expected: FieldType::String,
        }),
    }
}

/// Read a string that may also be written as a list of strings.
pub fn string_or_list(field: &str, value: &Value) -> Result<Vec<String>, SchemaError> {
    match value {
        Value::String(s) => Ok(vec![s.clone()]),
        _ => string_list(field, value),
    }
}

/// Read a list of strings; every element must be a string.
pub fn string_list(field: &str, value: &Value) -> Result<Vec<String>, SchemaError> {
    let items = value.as_array().ok_or_else(|| SchemaError::TypeMismatch {
        field: field.to_string(),
        actual: value_type_name(value),
        expected: FieldType::List,
    })?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| SchemaError::TypeMismatch {
                    field: format!("{}[{}]", field, i),
                    actual: value_type_name(item),
                    expected: FieldType::String,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> Properties {
        value.as_object().cloned().unwrap()
    }

    const SCHEMA: &[(&str, FieldType)] = &[
        ("name", FieldType::String),
        ("size?", FieldType::Integer),
        ("ratio?", FieldType::Float),
    ];

    #[test]
    fn test_valid_bag_passes() {
        let bag = props(json!({"name": "x", "size": 3, "ratio": 0.5, "extra": [1]}));
        assert!(validate_properties(SCHEMA, &bag).is_ok());
    }

    #[test]
    fn test_optional_may_be_absent_or_null() {
        assert!(validate_properties(SCHEMA, &props(json!({"name": "x"}))).is_ok());
        assert!(validate_properties(SCHEMA, &props(json!({"name": "x", "size": null}))).is_ok());
    }

    #[test]
    fn test_missing_required_field() {
        let err = validate_properties(SCHEMA, &props(json!({"size": 1}))).unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingField {
                field: "name".to_string(),
                expected: FieldType::String
            }
        );
    }

    #[test]
    fn test_required_null_is_a_mismatch() {
        let err = validate_properties(SCHEMA, &props(json!({"name": null}))).unwrap_err();
        assert!(matches!(err, SchemaError::TypeMismatch { actual: "null", .. }));
    }

    #[test]
    fn test_mistyped_optional_field() {
        let err =
            validate_properties(SCHEMA, &props(json!({"name": "x", "size": "big"}))).unwrap_err();
        assert_eq!(err.field(), "size");
        assert_eq!(
            err.to_string(),
            "invalid type for 'size': string, expected integer"
        );
    }

    #[test]
    fn test_float_accepts_integers_but_integer_rejects_floats() {
        assert!(validate_properties(SCHEMA, &props(json!({"name": "x", "ratio": 1}))).is_ok());
        let err =
            validate_properties(SCHEMA, &props(json!({"name": "x", "size": 1.5}))).unwrap_err();
        assert!(matches!(err, SchemaError::TypeMismatch { actual: "float", .. }));
    }

    #[test]
    fn test_first_violation_wins() {
        let err = validate_properties(SCHEMA, &props(json!({"size": "a", "ratio": "b"}))).unwrap_err();
        assert_eq!(err.field(), "name");
    }

    #[test]
    fn test_within_qualifies_field() {
        let err = SchemaError::invalid("origin", "bad").within("layers");
        assert_eq!(err.field(), "layers.origin");
    }

    #[test]
    fn test_string_list_reports_element() {
        let err = string_list("source", &json!(["a", 1])).unwrap_err();
        assert_eq!(err.field(), "source[1]");
    }
}
