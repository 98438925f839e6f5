//! Scripted collaborators.
//!
//! Each double answers from a fixed script and records what it was asked,
//! so tests can assert on prompts, queries and URLs.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::errors::{AskflowError, ExecutionError, FetchError};
use crate::prompts::{transcript, Message};
use crate::providers::{PageFetcher, QueryExecutor, SchemaProvider, SearchHit, SearchProvider, TextGenerator};

type Reply = Result<String, AskflowError>;

/// A text generator that picks its reply by matching the prompt.
///
/// Rules are checked in insertion order against the full transcript
/// (`role: content` lines); the first rule whose needle occurs wins.
#[derive(Debug)]
pub struct ScriptedGenerator {
    rules: Vec<(String, Reply)>,
    fallback: Reply,
    delay: Option<Duration>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedGenerator {
    /// Creates a generator that replies `"ok"` to everything.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            fallback: Ok("ok".to_string()),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Replies `reply` when the transcript contains `needle`.
    #[must_use]
    pub fn when(mut self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rules.push((needle.into(), Ok(reply.into())));
        self
    }

    /// Fails with `error` when the transcript contains `needle`.
    #[must_use]
    pub fn fail_when(mut self, needle: impl Into<String>, error: AskflowError) -> Self {
        self.rules.push((needle.into(), Err(error)));
        self
    }

    /// Sets the reply used when no rule matches.
    #[must_use]
    pub fn otherwise(mut self, reply: impl Into<String>) -> Self {
        self.fallback = Ok(reply.into());
        self
    }

    /// Sleeps before every reply.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns every message list received.
    #[must_use]
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().clone()
    }

    /// Returns every received prompt as a transcript.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.calls.lock().iter().map(|m| transcript(m)).collect()
    }

    /// Returns how many received prompts contain `needle`.
    #[must_use]
    pub fn count_containing(&self, needle: &str) -> usize {
        self.prompts().iter().filter(|p| p.contains(needle)).count()
    }

    /// Returns the number of calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, messages: &[Message], _stop: &[&str]) -> Result<String, AskflowError> {
        self.calls.lock().push(messages.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let prompt = transcript(messages);
        self.rules
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map_or_else(|| self.fallback.clone(), |(_, reply)| reply.clone())
    }
}

/// A schema provider returning a fixed description.
#[derive(Debug)]
pub struct StaticSchemaProvider {
    schema: Reply,
    calls: AtomicUsize,
}

impl StaticSchemaProvider {
    /// Returns `schema` on every call.
    #[must_use]
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: Ok(schema.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Fails on every call.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            schema: Err(AskflowError::schema(message)),
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns the number of calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SchemaProvider for StaticSchemaProvider {
    async fn get_schema(&self) -> Result<String, AskflowError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.schema.clone()
    }
}

/// A query executor with a fixed result or error.
#[derive(Debug)]
pub struct StaticExecutor {
    result: Result<String, String>,
    queries: Mutex<Vec<String>>,
}

impl StaticExecutor {
    /// Returns `rows` for every query.
    #[must_use]
    pub fn new(rows: impl Into<String>) -> Self {
        Self {
            result: Ok(rows.into()),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Fails every query with `message`.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            result: Err(message.into()),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Returns every executed query.
    #[must_use]
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl QueryExecutor for StaticExecutor {
    async fn execute(&self, query: &str) -> Result<String, AskflowError> {
        self.queries.lock().push(query.to_string());
        self.result
            .clone()
            .map_err(|message| ExecutionError::new(query, message).into())
    }
}

/// A search provider with per-query scripts.
///
/// Unscripted queries return `example.com` URLs derived from the query.
#[derive(Debug, Default)]
pub struct StaticSearch {
    results: HashMap<String, Vec<String>>,
    failing: Vec<String>,
    queries: Mutex<Vec<String>>,
}

impl StaticSearch {
    /// Creates a search double.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the URLs returned for `query`.
    #[must_use]
    pub fn with_results<I, S>(mut self, query: impl Into<String>, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.results.insert(query.into(), urls.into_iter().map(Into::into).collect());
        self
    }

    /// Makes searches for `query` fail.
    #[must_use]
    pub fn failing_for(mut self, query: impl Into<String>) -> Self {
        self.failing.push(query.into());
        self
    }

    /// Returns every searched query.
    #[must_use]
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl SearchProvider for StaticSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, AskflowError> {
        self.queries.lock().push(query.to_string());
        if self.failing.iter().any(|q| q == query) {
            return Err(AskflowError::search(query, "search backend unavailable"));
        }
        let hits = match self.results.get(query) {
            Some(urls) => urls.iter().take(limit).map(SearchHit::new).collect(),
            None => {
                let slug: String = query
                    .chars()
                    .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
                    .collect();
                (1..=limit)
                    .map(|i| SearchHit::new(format!("https://example.com/{slug}/{i}")))
                    .collect()
            }
        };
        Ok(hits)
    }
}

/// A page fetcher serving canned HTML.
///
/// Unscripted URLs get a small page whose text names the URL.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    pages: HashMap<String, String>,
    failing: Vec<String>,
    delay: Option<Duration>,
    fetched: Mutex<Vec<String>>,
}

impl StaticFetcher {
    /// Creates a fetcher double.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `html` for `url`.
    #[must_use]
    pub fn with_page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.pages.insert(url.into(), html.into());
        self
    }

    /// Makes fetches of `url` fail.
    #[must_use]
    pub fn failing(mut self, url: impl Into<String>) -> Self {
        self.failing.push(url.into());
        self
    }

    /// Sleeps before every response.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns every fetched URL.
    #[must_use]
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().clone()
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AskflowError> {
        self.fetched.lock().push(url.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.iter().any(|u| u == url) {
            return Err(FetchError::new(url, "HTTP 503 Service Unavailable").into());
        }
        Ok(self.pages.get(url).cloned().unwrap_or_else(|| {
            format!("<html><head><title>t</title></head><body><p>Content of {url}</p></body></html>")
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_scripted_generator_rules() {
        let generator = ScriptedGenerator::new()
            .when("SQL Query:", "SELECT 1")
            .fail_when("explode", AskflowError::generation("boom"))
            .otherwise("fallback");

        let sql = generator.generate(&[Message::user("...SQL Query:")], &[]).await.unwrap();
        let other = generator.generate(&[Message::user("hello")], &[]).await.unwrap();
        let err = generator.generate(&[Message::system("explode")], &[]).await.unwrap_err();

        assert_eq!(sql, "SELECT 1");
        assert_eq!(other, "fallback");
        assert_eq!(err.kind(), "generation");
        assert_eq!(generator.call_count(), 3);
        assert_eq!(generator.count_containing("hello"), 1);
    }

    #[tokio::test]
    async fn test_static_executor_records_queries() {
        let ok = StaticExecutor::new("[(1,)]");
        assert_eq!(ok.execute("SELECT 1").await.unwrap(), "[(1,)]");
        assert_eq!(ok.queries(), vec!["SELECT 1"]);

        let bad = StaticExecutor::failing("no such table: x");
        let err = bad.execute("SELECT * FROM x").await.unwrap_err();
        assert_eq!(err.failed_query(), Some("SELECT * FROM x"));
    }

    #[tokio::test]
    async fn test_static_search_defaults_and_failures() {
        let search = StaticSearch::new()
            .with_results("rust", ["https://a.test", "https://b.test"])
            .failing_for("down");

        let hits = search.search("rust", 1).await.unwrap();
        assert_eq!(hits, vec![SearchHit::new("https://a.test")]);

        let generated = search.search("Big Q", 2).await.unwrap();
        assert_eq!(generated[1].url, "https://example.com/big-q/2");

        assert_eq!(search.search("down", 3).await.unwrap_err().kind(), "search");
    }

    #[tokio::test]
    async fn test_static_fetcher() {
        let fetcher = StaticFetcher::new()
            .with_page("https://a.test", "<p>A</p>")
            .failing("https://b.test");

        assert_eq!(fetcher.fetch("https://a.test").await.unwrap(), "<p>A</p>");
        assert!(fetcher.fetch("https://c.test").await.unwrap().contains("Content of https://c.test"));
        assert_eq!(fetcher.fetch("https://b.test").await.unwrap_err().kind(), "fetch");
        assert_eq!(fetcher.fetched().len(), 3);
    }

    #[tokio::test]
    async fn test_static_schema_counts_calls() {
        let provider = StaticSchemaProvider::new("CREATE TABLE t (x)");
        provider.get_schema().await.unwrap();
        provider.get_schema().await.unwrap();
        assert_eq!(provider.call_count(), 2);
        assert!(StaticSchemaProvider::failing("down").get_schema().await.is_err());
    }
}
