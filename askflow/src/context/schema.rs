//! Declared input schemas for pipelines.

use super::fields::{type_name, Context};
use crate::errors::{ContractErrorInfo, PipelineValidationError, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The JSON type a field must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// A string.
    String,
    /// A whole number.
    Integer,
    /// A number.
    Number,
    /// A boolean.
    Boolean,
    /// An array.
    Array,
    /// An object.
    Object,
    /// Any value, only presence is checked.
    Any,
}

impl FieldKind {
    /// Returns true if `value` has this kind.
    #[must_use]
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any => true,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Any => "any",
        };
        write!(f, "{name}")
    }
}

/// One declared input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name.
    pub name: String,
    /// Required JSON type.
    pub kind: FieldKind,
}

/// The set of fields a pipeline requires from its caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSchema {
    fields: Vec<FieldSpec>,
}

impl InputSchema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a required field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        let name = name.into();
        if let Some(existing) = self.fields.iter_mut().find(|f| f.name == name) {
            existing.kind = kind;
        } else {
            self.fields.push(FieldSpec { name, kind });
        }
        self
    }

    /// Returns the declared fields.
    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Returns true if `name` is declared.
    #[must_use]
    pub fn declares(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// Checks that every declared field is present with the right kind.
    pub fn validate(&self, input: &Context) -> Result<(), ValidationError> {
        for spec in &self.fields {
            match input.get(&spec.name) {
                None => {
                    return Err(ValidationError::for_field(
                        &spec.name,
                        format!("missing required field '{}'", spec.name),
                    ))
                }
                Some(value) if !spec.kind.matches(value) => {
                    return Err(ValidationError::for_field(
                        &spec.name,
                        format!(
                            "field '{}' must be {}, got {}",
                            spec.name,
                            spec.kind,
                            type_name(value)
                        ),
                    ))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Combines two schemas, rejecting fields declared with different kinds.
    pub fn union(&self, other: &Self) -> Result<Self, PipelineValidationError> {
        let mut merged = self.clone();
        for spec in &other.fields {
            let existing = merged.fields.iter().find(|f| f.name == spec.name).map(|f| f.kind);
            match existing {
                None => merged.fields.push(spec.clone()),
                Some(FieldKind::Any) => merged = merged.field(spec.name.clone(), spec.kind),
                Some(kind) if kind != spec.kind && spec.kind != FieldKind::Any => {
                    return Err(PipelineValidationError::new(format!(
                        "input field '{}' is declared as both {} and {}",
                        spec.name, kind, spec.kind
                    ))
                    .with_error_info(
                        ContractErrorInfo::new(
                            "CONTRACT-INPUT-CONFLICT",
                            format!("Merged pipelines disagree on the type of '{}'", spec.name),
                        )
                        .with_context_entry("field", spec.name.clone()),
                    ));
                }
                Some(_) => {}
            }
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn question_schema() -> InputSchema {
        InputSchema::new().field("question", FieldKind::String)
    }

    #[test]
    fn test_validate_missing_field() {
        let err = question_schema().validate(&Context::new()).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("question"));
        assert!(err.message.contains("missing required field"));
    }

    #[test]
    fn test_validate_wrong_kind() {
        let input = Context::new().with("question", 42).unwrap();
        let err = question_schema().validate(&input).unwrap_err();
        assert_eq!(err.message, "field 'question' must be string, got number");
    }

    #[test]
    fn test_integer_kind() {
        assert!(FieldKind::Integer.matches(&json!(3)));
        assert!(!FieldKind::Integer.matches(&json!(3.5)));
        assert!(FieldKind::Number.matches(&json!(3)));
        assert_eq!(FieldKind::Integer.to_string(), "integer");
    }

    #[test]
    fn test_validate_ok_with_extra_fields() {
        let input = Context::from_question("q").with("extra", json!([1])).unwrap();
        assert!(question_schema().validate(&input).is_ok());
    }

    #[test]
    fn test_union() {
        let a = question_schema();
        let b = InputSchema::new()
            .field("question", FieldKind::Any)
            .field("topic", FieldKind::String);
        let merged = a.union(&b).unwrap();
        assert_eq!(merged.fields().len(), 2);
        assert_eq!(merged.fields()[0].kind, FieldKind::String);

        let conflicting = InputSchema::new().field("question", FieldKind::Number);
        let err = a.union(&conflicting).unwrap_err();
        assert_eq!(err.code(), Some("CONTRACT-INPUT-CONFLICT"));
    }

    #[test]
    fn test_union_upgrades_any() {
        let a = InputSchema::new().field("question", FieldKind::Any);
        let merged = a.union(&question_schema()).unwrap();
        assert_eq!(merged.fields()[0].kind, FieldKind::String);
    }
}
