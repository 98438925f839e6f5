//! Per-session state shared by the SQL stages.

use super::ConversationMemory;
use crate::errors::AskflowError;
use crate::providers::SchemaProvider;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;
use uuid::Uuid;

/// State owned by one conversation: the cached schema and the memory.
///
/// The schema is fetched lazily on first use and never refreshed for the
/// lifetime of the session. A failed fetch is not cached.
pub struct SqlSession {
    id: String,
    provider: Arc<dyn SchemaProvider>,
    schema: OnceCell<String>,
    memory: ConversationMemory,
}

impl SqlSession {
    /// Creates a session with a random id.
    #[must_use]
    pub fn new(provider: Arc<dyn SchemaProvider>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), provider)
    }

    /// Creates a session with the given id.
    #[must_use]
    pub fn with_id(id: impl Into<String>, provider: Arc<dyn SchemaProvider>) -> Self {
        Self {
            id: id.into(),
            provider,
            schema: OnceCell::new(),
            memory: ConversationMemory::new(),
        }
    }

    /// Returns the session id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the conversation memory.
    #[must_use]
    pub const fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Returns the schema, fetching it on first call.
    pub async fn schema(&self) -> Result<String, AskflowError> {
        self.schema
            .get_or_try_init(|| async {
                debug!(session_id = %self.id, "Fetching schema");
                self.provider.get_schema().await
            })
            .await
            .cloned()
    }

    /// Returns the schema if it has been fetched.
    #[must_use]
    pub fn cached_schema(&self) -> Option<&str> {
        self.schema.get().map(String::as_str)
    }
}

impl fmt::Debug for SqlSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlSession")
            .field("id", &self.id)
            .field("schema_cached", &self.schema.initialized())
            .field("turns", &self.memory.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticSchemaProvider;

    #[tokio::test]
    async fn test_schema_fetched_once() {
        let provider = Arc::new(StaticSchemaProvider::new("CREATE TABLE t (x INT)"));
        let session = SqlSession::new(provider.clone());
        assert!(session.cached_schema().is_none());

        assert_eq!(session.schema().await.unwrap(), "CREATE TABLE t (x INT)");
        assert_eq!(session.schema().await.unwrap(), "CREATE TABLE t (x INT)");

        assert_eq!(provider.call_count(), 1);
        assert_eq!(session.cached_schema(), Some("CREATE TABLE t (x INT)"));
    }

    #[tokio::test]
    async fn test_failed_fetch_not_cached() {
        let provider = Arc::new(StaticSchemaProvider::failing("offline"));
        let session = SqlSession::with_id("s1", provider.clone());

        assert!(session.schema().await.is_err());
        assert!(session.schema().await.is_err());
        assert_eq!(provider.call_count(), 2);
        assert_eq!(session.id(), "s1");
    }
}
