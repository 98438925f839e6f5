//! DuckDuckGo HTML search.

use super::http::{client_builder, error_body, send_with_retry};
use super::{FetchConfig, SearchHit, SearchProvider};
use crate::errors::AskflowError;
use async_trait::async_trait;
use reqwest::{Client, Url};
use scraper::{Html, Selector};
use std::collections::HashSet;
use tracing::debug;

const DUCKDUCKGO_HTML: &str = "https://html.duckduckgo.com/html/";

/// Searches DuckDuckGo's HTML endpoint, which needs no API key.
#[derive(Debug, Clone)]
pub struct DuckDuckGoSearch {
    client: Client,
    endpoint: String,
    config: FetchConfig,
}

impl DuckDuckGoSearch {
    /// Creates a search client with default fetch settings.
    pub fn new() -> Result<Self, AskflowError> {
        Self::with_config(FetchConfig::default())
    }

    /// Creates a search client with custom fetch settings.
    pub fn with_config(config: FetchConfig) -> Result<Self, AskflowError> {
        let client = client_builder(&config)
            .build()
            .map_err(|e| AskflowError::config(format!("failed to build search client: {e}")))?;
        Ok(Self {
            client,
            endpoint: DUCKDUCKGO_HTML.to_string(),
            config,
        })
    }

    /// Points the client at a different endpoint, mostly for local mirrors.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, AskflowError> {
        debug!(query = %query, limit, "Searching DuckDuckGo");
        let response = send_with_retry(&self.config.retry, &self.endpoint, || {
            self.client.get(&self.endpoint).query(&[("q", query)])
        })
        .await
        .map_err(|e| AskflowError::search(query, e.to_string()))?;

        if !response.status().is_success() {
            return Err(AskflowError::search(query, error_body(response).await));
        }

        let html = response
            .text()
            .await
            .map_err(|e| AskflowError::search(query, e.to_string()))?;
        Ok(parse_duckduckgo_results(&html, limit))
    }
}

/// Extracts result links from a DuckDuckGo HTML results page.
///
/// Redirect links are unwrapped to their `uddg` target. Non-HTTP links and
/// repeated URLs are skipped.
#[must_use]
pub fn parse_duckduckgo_results(html: &str, limit: usize) -> Vec<SearchHit> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a.result__a") else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut hits = Vec::new();
    for link in document.select(&selector) {
        if hits.len() >= limit {
            break;
        }
        let Some(url) = link.value().attr("href").and_then(resolve_link) else {
            continue;
        };
        if !seen.insert(url.clone()) {
            continue;
        }
        let title = link.text().collect::<String>().trim().to_string();
        hits.push(SearchHit {
            url,
            title: (!title.is_empty()).then_some(title),
        });
    }
    hits
}

fn resolve_link(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else if href.starts_with('/') {
        format!("https://duckduckgo.com{href}")
    } else {
        href.to_string()
    };
    let url = Url::parse(&absolute).ok()?;

    let target = match url.query_pairs().find(|(key, _)| key == "uddg") {
        Some((_, target)) => Url::parse(&target).ok()?,
        None => url,
    };
    matches!(target.scheme(), "http" | "https").then(|| target.to_string())
}
