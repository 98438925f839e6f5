//! Chat messages and multi-message prompts.

use super::PromptTemplate;
use crate::errors::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions for the model.
    System,
    /// The human side of the conversation.
    User,
    /// The model's side of the conversation.
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message author.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl Message {
    /// Creates a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Fixed(Role, PromptTemplate),
    History,
}

/// An ordered list of message templates.
///
/// A prompt may contain one history slot, where prior conversation turns
/// are spliced in when rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatPrompt {
    parts: Vec<Part>,
}

impl ChatPrompt {
    /// Creates an empty prompt.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a system message template.
    #[must_use]
    pub fn system(mut self, template: impl Into<PromptTemplate>) -> Self {
        self.parts.push(Part::Fixed(Role::System, template.into()));
        self
    }

    /// Appends a user message template.
    #[must_use]
    pub fn user(mut self, template: impl Into<PromptTemplate>) -> Self {
        self.parts.push(Part::Fixed(Role::User, template.into()));
        self
    }

    /// Appends the conversation history slot.
    #[must_use]
    pub fn history(mut self) -> Self {
        self.parts.push(Part::History);
        self
    }

    /// Returns true if the prompt has a history slot.
    #[must_use]
    pub fn has_history(&self) -> bool {
        self.parts.contains(&Part::History)
    }

    /// Renders every message.
    pub fn render(&self, values: &[(&str, &str)], history: &[Message]) -> Result<Vec<Message>, ValidationError> {
        let mut messages = Vec::with_capacity(self.parts.len() + history.len());
        for part in &self.parts {
            match part {
                Part::Fixed(role, template) => messages.push(Message {
                    role: *role,
                    content: template.format(values)?,
                }),
                Part::History => messages.extend_from_slice(history),
            }
        }
        Ok(messages)
    }
}

/// Joins messages into a single transcript, mainly for logs and test doubles.
#[must_use]
pub fn transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}
