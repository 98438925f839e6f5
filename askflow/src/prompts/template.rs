//! `{placeholder}` string templates.

use crate::errors::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An immutable template with named `{placeholder}` slots.
///
/// `{{` and `}}` produce literal braces. Formatting is a pure function of
/// the template and the supplied values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptTemplate {
    template: String,
}

enum Piece<'a> {
    Text(&'a str),
    Brace(char),
    Slot(&'a str),
}

impl PromptTemplate {
    /// Creates a template. Syntax errors surface when it is formatted.
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Returns the raw template text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Returns the placeholder names in order of first appearance.
    pub fn variables(&self) -> Result<Vec<String>, ValidationError> {
        let mut names: Vec<String> = Vec::new();
        for piece in self.pieces()? {
            if let Piece::Slot(name) = piece {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }

    /// Fills every placeholder from `values`.
    ///
    /// Values not referenced by the template are ignored. A placeholder with
    /// no value is a validation error.
    pub fn format(&self, values: &[(&str, &str)]) -> Result<String, ValidationError> {
        let mut out = String::with_capacity(self.template.len());
        for piece in self.pieces()? {
            match piece {
                Piece::Text(text) => out.push_str(text),
                Piece::Brace(c) => out.push(c),
                Piece::Slot(name) => {
                    let value = values
                        .iter()
                        .find(|(key, _)| *key == name)
                        .map(|(_, value)| *value)
                        .ok_or_else(|| {
                            ValidationError::for_field(name, format!("missing prompt variable '{name}'"))
                        })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }

    fn pieces(&self) -> Result<Vec<Piece<'_>>, ValidationError> {
        let source = self.template.as_str();
        let bytes = source.as_bytes();
        let mut pieces = Vec::new();
        let mut text_start = 0;
        let mut i = 0;

        while i < bytes.len() {
            match bytes[i] {
                b'{' | b'}' if bytes.get(i + 1) == Some(&bytes[i]) => {
                    pieces.push(Piece::Text(&source[text_start..i]));
                    pieces.push(Piece::Brace(char::from(bytes[i])));
                    i += 2;
                    text_start = i;
                }
                b'{' => {
                    let close = source[i + 1..]
                        .find('}')
                        .map(|offset| i + 1 + offset)
                        .ok_or_else(|| ValidationError::new(format!("unclosed '{{' at byte {i} in prompt template")))?;
                    let name = source[i + 1..close].trim();
                    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                        return Err(ValidationError::new(format!(
                            "invalid placeholder '{{{name}}}' in prompt template"
                        )));
                    }
                    pieces.push(Piece::Text(&source[text_start..i]));
                    pieces.push(Piece::Slot(name));
                    i = close + 1;
                    text_start = i;
                }
                b'}' => {
                    return Err(ValidationError::new(format!(
                        "unmatched '}}' at byte {i} in prompt template"
                    )))
                }
                _ => i += 1,
            }
        }
        pieces.push(Piece::Text(&source[text_start..]));
        Ok(pieces)
    }
}

impl fmt::Display for PromptTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

impl From<&str> for PromptTemplate {
    fn from(template: &str) -> Self {
        Self::new(template)
    }
}
