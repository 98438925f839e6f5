//! One assistant per conversation.

use super::Assistant;
use crate::errors::AskflowError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

type Factory = Box<dyn Fn(&str) -> Result<Assistant, AskflowError> + Send + Sync>;

/// Keeps one [`Assistant`] per session id.
///
/// Each session has its own conversation memory and cached schema, so
/// callers serving several users look assistants up here instead of
/// sharing one.
pub struct SessionPool {
    sessions: DashMap<String, Arc<Assistant>>,
    factory: Factory,
}

impl SessionPool {
    /// Creates a pool that builds assistants with `factory`, which receives
    /// the session id.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&str) -> Result<Assistant, AskflowError> + Send + Sync + 'static,
    {
        Self {
            sessions: DashMap::new(),
            factory: Box::new(factory),
        }
    }

    /// Returns the session's assistant, building it on first use.
    ///
    /// # Errors
    ///
    /// Returns the factory's error. Nothing is stored in that case.
    pub fn get_or_create(&self, session_id: &str) -> Result<Arc<Assistant>, AskflowError> {
        if let Some(existing) = self.sessions.get(session_id) {
            return Ok(existing.clone());
        }
        match self.sessions.entry(session_id.to_string()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let assistant = Arc::new((self.factory)(session_id)?);
                debug!(session_id = %session_id, "Created session");
                Ok(entry.insert(assistant).clone())
            }
        }
    }

    /// Returns the session's assistant if it exists.
    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<Arc<Assistant>> {
        self.sessions.get(session_id).map(|entry| entry.clone())
    }

    /// Ends a session, returning its assistant.
    pub fn remove(&self, session_id: &str) -> Option<Arc<Assistant>> {
        self.sessions.remove(session_id).map(|(_, assistant)| assistant)
    }

    /// Returns true if the session exists.
    #[must_use]
    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Returns the number of sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true if there are no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionPool").field("sessions", &self.sessions.len()).finish_non_exhaustive()
    }
}
