//! The field map threaded through a pipeline run.

use crate::errors::{AskflowError, DataConflictError, ValidationError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A mapping from field name to JSON value.
///
/// Fields are write-once: inserting a key that already exists fails with
/// a [`DataConflictError`]. Each stage receives a snapshot and its single
/// output is added by the runner, so concurrent branches never share a
/// mutable map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    fields: BTreeMap<String, Value>,
}

impl Context {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context holding a single `question` field.
    #[must_use]
    pub fn from_question(question: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("question".to_string(), Value::String(question.into()));
        Self { fields }
    }

    /// Builder-style insert.
    ///
    /// # Errors
    ///
    /// Returns `DataConflictError` if the key already exists.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<Self, DataConflictError> {
        self.insert(key, value)?;
        Ok(self)
    }

    /// Adds a field.
    ///
    /// # Errors
    ///
    /// Returns `DataConflictError` if the key already exists.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<(), DataConflictError> {
        let key = key.into();
        if self.fields.contains_key(&key) {
            return Err(DataConflictError::new(key));
        }
        self.fields.insert(key, value.into());
        Ok(())
    }

    /// Gets a field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Gets a string field.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Gets a string field, failing if it is missing or not a string.
    pub fn require_str(&self, key: &str) -> Result<&str, AskflowError> {
        match self.fields.get(key) {
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(ValidationError::for_field(
                key,
                format!("field '{key}' must be a string, got {}", type_name(other)),
            )
            .into()),
            None => Err(ValidationError::for_field(key, format!("missing required field '{key}'")).into()),
        }
    }

    /// Deserializes a field into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T, AskflowError> {
        let value = self
            .fields
            .get(key)
            .ok_or_else(|| ValidationError::for_field(key, format!("missing required field '{key}'")))?;
        serde_json::from_value(value.clone()).map_err(|e| {
            ValidationError::for_field(key, format!("field '{key}' has the wrong shape: {e}")).into()
        })
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Returns the field names in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if there are no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Converts the context into a JSON object.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone().into_iter().collect())
    }
}

impl TryFrom<Value> for Context {
    type Error = ValidationError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self {
                fields: map.into_iter().collect(),
            }),
            other => Err(ValidationError::new(format!(
                "pipeline input must be an object, got {}",
                type_name(&other)
            ))),
        }
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
