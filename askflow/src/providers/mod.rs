//! External collaborators: text generation, SQL, search and page fetching.
//!
//! Each capability is an `async_trait` so pipelines can be built against
//! real clients or test doubles. Concrete clients live behind the `http`
//! and `sqlite` features.

use crate::errors::AskflowError;
use crate::prompts::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

mod config;
mod extract;

#[cfg(feature = "http")]
mod chat;
#[cfg(feature = "http")]
mod fetch;
#[cfg(feature = "http")]
mod http;
#[cfg(feature = "http")]
mod search;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use config::{FetchConfig, RetryConfig};
pub use extract::{extract_text, truncate_chars};

#[cfg(feature = "http")]
pub use chat::{OllamaChatClient, OpenAiChatClient};
#[cfg(feature = "http")]
pub use fetch::HttpFetcher;
#[cfg(feature = "http")]
pub use search::{parse_duckduckgo_results, DuckDuckGoSearch};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

/// Turns chat messages into text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// The model identifier, for logs.
    fn model(&self) -> &str;

    /// Generates a reply. Output must end before any `stop` sequence.
    async fn generate(&self, messages: &[Message], stop: &[&str]) -> Result<String, AskflowError>;
}

/// Describes the database the SQL pipeline queries.
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    /// Returns the schema description embedded in prompts.
    async fn get_schema(&self) -> Result<String, AskflowError>;
}

/// Runs SQL.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Executes `query` and renders the rows as text.
    ///
    /// Failures are reported as [`AskflowError::Execution`] carrying the query.
    async fn execute(&self, query: &str) -> Result<String, AskflowError>;
}

/// One web search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Result URL.
    pub url: String,
    /// Result title, when the provider reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl SearchHit {
    /// Creates a hit with no title.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
        }
    }
}

/// Finds pages for a query.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Returns at most `limit` hits for `query`.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, AskflowError>;
}

/// Downloads pages.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Returns the raw HTML of `url`.
    ///
    /// Failures are reported as [`AskflowError::Fetch`].
    async fn fetch(&self, url: &str) -> Result<String, AskflowError>;
}
