//! Settings shared by the HTTP clients.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// When and how often a failed request is sent again.
///
/// Transport timeouts, connection failures and the statuses in `retry_on`
/// are retried with exponential backoff. The default never retries, so a
/// slow backend fails within one I/O timeout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Extra attempts after the first.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Factor applied to the delay after each retry.
    pub multiplier: f64,
    /// Upper bound on any single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// HTTP statuses worth retrying.
    pub retry_on: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay_ms: 500,
            multiplier: 2.0,
            max_delay_ms: 8_000,
            retry_on: vec![429, 502, 503, 504],
        }
    }
}

impl RetryConfig {
    /// Retries up to `max_retries` times.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Delay before retry number `attempt`, counting from zero.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(i32::try_from(attempt).unwrap_or(i32::MAX));
        // Float to int casts saturate, so huge factors land on the cap.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let millis = (self.initial_delay_ms as f64 * factor) as u64;
        Duration::from_millis(millis.min(self.max_delay_ms))
    }

    /// Returns true if a response with `status` should be retried.
    #[must_use]
    pub fn retries_status(&self, status: u16) -> bool {
        self.retry_on.contains(&status)
    }
}

/// Client settings for search and page fetching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Whole-request timeout in seconds.
    pub timeout_seconds: f64,
    /// Redirects followed before giving up.
    pub max_redirects: usize,
    /// Sent as `User-Agent`.
    pub user_agent: String,
    /// Larger bodies are rejected.
    pub max_body_bytes: usize,
    /// Extra request headers.
    pub headers: BTreeMap<String, String>,
    /// Retry policy.
    pub retry: RetryConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 20.0,
            max_redirects: 10,
            user_agent: format!("askflow/{}", env!("CARGO_PKG_VERSION")),
            max_body_bytes: 5 * 1024 * 1024,
            headers: BTreeMap::new(),
            retry: RetryConfig::default(),
        }
    }
}

impl FetchConfig {
    /// Sets the request timeout in seconds.
    #[must_use]
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Adds a request header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// The request timeout. Non-positive or unrepresentable values mean no timeout.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        if self.timeout_seconds > 0.0 {
            Duration::try_from_secs_f64(self.timeout_seconds).ok()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_policy_never_retries() {
        let retry = RetryConfig::default();
        assert_eq!(retry.max_retries, 0);
        assert!(retry.retries_status(503));
        assert!(!retry.retries_status(500));
        assert!(!retry.retries_status(404));
    }

    #[test]
    fn test_backoff_doubles_then_caps() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay_for_attempt(0), Duration::from_millis(500));
        assert_eq!(retry.delay_for_attempt(2), Duration::from_millis(2_000));
        assert_eq!(retry.delay_for_attempt(40), Duration::from_millis(8_000));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: FetchConfig =
            serde_json::from_str(r#"{"timeout_seconds": 3.5, "retry": {"max_retries": 2}}"#)
                .unwrap();
        assert_eq!(config.timeout(), Some(Duration::from_millis(3_500)));
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.retry.retry_on, vec![429, 502, 503, 504]);
        assert_eq!(config.max_redirects, 10);
    }

    #[test]
    fn test_builders() {
        let config = FetchConfig::default()
            .with_timeout(0.0)
            .with_user_agent("test-agent")
            .with_header("Accept-Language", "en");
        assert_eq!(config.timeout(), None);
        assert_eq!(FetchConfig::default().with_timeout(1e30).timeout(), None);
        assert_eq!(config.user_agent, "test-agent");
        assert_eq!(config.headers["Accept-Language"], "en");
    }
}
