//! HTTP page fetching.

use super::http::{client_builder, send_with_retry};
use super::{FetchConfig, PageFetcher};
use crate::errors::{AskflowError, FetchError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{redirect, Client};
use tracing::debug;

/// Downloads HTML pages with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    config: FetchConfig,
}

impl HttpFetcher {
    /// Creates a fetcher with default settings.
    pub fn new() -> Result<Self, AskflowError> {
        Self::with_config(FetchConfig::default())
    }

    /// Creates a fetcher from a [`FetchConfig`].
    pub fn with_config(config: FetchConfig) -> Result<Self, AskflowError> {
        let mut headers = HeaderMap::new();
        for (key, value) in &config.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| AskflowError::config(format!("invalid header name '{key}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| AskflowError::config(format!("invalid value for header '{key}': {e}")))?;
            headers.insert(name, value);
        }

        let client = client_builder(&config)
            .redirect(redirect::Policy::limited(config.max_redirects))
            .default_headers(headers)
            .build()
            .map_err(|e| AskflowError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Returns the fetch settings.
    #[must_use]
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AskflowError> {
        debug!(url = %url, "Fetching page");
        let response = send_with_retry(&self.config.retry, url, || self.client.get(url))
            .await
            .map_err(|e| FetchError::new(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(url, format!("HTTP {status}")).into());
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if !is_html(&content_type) {
            return Err(FetchError::new(url, format!("non-HTML content ({content_type})")).into());
        }

        if let Some(length) = response.content_length() {
            if length > self.config.max_body_bytes as u64 {
                return Err(FetchError::new(url, format!("response too large ({length} bytes)")).into());
            }
        }

        let body = response.text().await.map_err(|e| FetchError::new(url, e.to_string()))?;
        if body.len() > self.config.max_body_bytes {
            return Err(FetchError::new(url, format!("response too large ({} bytes)", body.len())).into());
        }
        Ok(body)
    }
}

fn is_html(content_type: &str) -> bool {
    content_type.contains("text/html") || content_type.contains("application/xhtml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_html() {
        assert!(is_html("text/html; charset=utf-8"));
        assert!(is_html("application/xhtml+xml"));
        assert!(!is_html("application/pdf"));
        assert!(!is_html(""));
    }

    #[test]
    fn test_invalid_header_rejected() {
        let config = FetchConfig::default().with_header("bad header", "x");
        let err = HttpFetcher::with_config(config).unwrap_err();
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn test_with_config_keeps_settings() {
        let fetcher = HttpFetcher::with_config(FetchConfig::default().with_timeout(5.0)).unwrap();
        assert_eq!(fetcher.config().timeout_seconds, 5.0);
    }
}
