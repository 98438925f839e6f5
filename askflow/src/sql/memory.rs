//! Per-session conversation memory.

use crate::prompts::Message;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// One completed question/answer exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// The user's question.
    pub question: String,
    /// The natural language answer given.
    pub answer: String,
    /// The SQL that produced the answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// When the turn completed.
    pub recorded_at: DateTime<Utc>,
}

impl Turn {
    /// Creates a turn stamped with the current time.
    #[must_use]
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            query: None,
            recorded_at: Utc::now(),
        }
    }

    /// Attaches the query.
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }
}

/// Ordered, append-only record of prior turns.
///
/// Turns are only ever appended; readers get a snapshot.
#[derive(Debug, Default)]
pub struct ConversationMemory {
    turns: RwLock<Vec<Turn>>,
}

impl ConversationMemory {
    /// Creates empty memory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a turn.
    pub fn record(&self, turn: Turn) {
        self.turns.write().push(turn);
    }

    /// Returns a snapshot of every turn, oldest first.
    #[must_use]
    pub fn turns(&self) -> Vec<Turn> {
        self.turns.read().clone()
    }

    /// Returns the number of turns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.read().len()
    }

    /// Returns true if no turn was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.read().is_empty()
    }

    /// Renders the turns as alternating user and assistant messages.
    #[must_use]
    pub fn as_messages(&self) -> Vec<Message> {
        self.turns
            .read()
            .iter()
            .flat_map(|turn| [Message::user(&turn.question), Message::assistant(&turn.answer)])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_messages_alternate() {
        let memory = ConversationMemory::new();
        assert!(memory.is_empty());

        memory.record(Turn::new("How many players?", "There are 3.").with_query("SELECT COUNT(*) FROM players"));
        memory.record(Turn::new("And teams?", "There are 2."));

        assert_eq!(
            memory.as_messages(),
            vec![
                Message::user("How many players?"),
                Message::assistant("There are 3."),
                Message::user("And teams?"),
                Message::assistant("There are 2."),
            ]
        );
        assert_eq!(memory.len(), 2);
        assert_eq!(memory.turns()[0].query.as_deref(), Some("SELECT COUNT(*) FROM players"));
    }

    #[test]
    fn test_turn_serializes_without_missing_query() {
        let value = serde_json::to_value(Turn::new("q", "a")).unwrap();
        assert!(value.get("query").is_none());
        assert_eq!(value["question"], "q");
    }
}
