//! Shared request plumbing for the HTTP clients.

use super::{FetchConfig, RetryConfig};
use reqwest::{ClientBuilder, RequestBuilder, Response};
use tracing::warn;

/// A client builder with the timeout and user agent from `config`.
pub(crate) fn client_builder(config: &FetchConfig) -> ClientBuilder {
    let builder = reqwest::Client::builder().user_agent(config.user_agent.clone());
    match config.timeout() {
        Some(timeout) => builder.timeout(timeout),
        None => builder,
    }
}

/// Sends a request, retrying on transport errors and retryable statuses.
///
/// `build` is called once per attempt because a sent request cannot be reused.
pub(crate) async fn send_with_retry<F>(retry: &RetryConfig, target: &str, mut build: F) -> Result<Response, reqwest::Error>
where
    F: FnMut() -> RequestBuilder,
{
    let mut attempt: u32 = 0;
    loop {
        let result = build().send().await;
        let retryable = match &result {
            Ok(response) => retry.retries_status(response.status().as_u16()),
            Err(err) => err.is_timeout() || err.is_connect(),
        };
        if !retryable || attempt >= retry.max_retries {
            return result;
        }

        let delay = retry.delay_for_attempt(attempt);
        warn!(
            target_url = %target,
            attempt = attempt + 1,
            max_retries = retry.max_retries,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Retrying request"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Reads an error body for inclusion in an error message.
pub(crate) async fn error_body(response: Response) -> String {
    let status = response.status();
    match response.text().await {
        Ok(body) if !body.trim().is_empty() => format!("HTTP {status}: {}", body.trim()),
        _ => format!("HTTP {status}"),
    }
}
