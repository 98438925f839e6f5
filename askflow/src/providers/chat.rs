//! Chat completion clients for OpenAI-compatible servers and Ollama.

use super::http::{error_body, send_with_retry};
use super::{RetryConfig, TextGenerator};
use crate::errors::AskflowError;
use crate::prompts::Message;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Serialize)]
struct OpenAiPayload<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    stop: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for any server implementing the OpenAI `/chat/completions` API.
#[derive(Debug, Clone)]
pub struct OpenAiChatClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: Option<f32>,
    retry: RetryConfig,
}

impl OpenAiChatClient {
    /// Creates a client for `model`, reading `OPENAI_API_KEY` if set.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            model: model.into(),
            temperature: Some(0.0),
            retry: RetryConfig::default(),
        }
    }

    /// Sets the API base URL (without `/chat/completions`).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Uses a preconfigured `reqwest` client.
    #[must_use]
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl TextGenerator for OpenAiChatClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, messages: &[Message], stop: &[&str]) -> Result<String, AskflowError> {
        let url = format!("{}/chat/completions", self.base_url);
        let payload = OpenAiPayload {
            model: &self.model,
            messages,
            stop,
            temperature: self.temperature,
        };
        debug!(model = %self.model, messages = messages.len(), "Requesting chat completion");

        let response = send_with_retry(&self.retry, &url, || {
            let request = self.client.post(&url).json(&payload);
            match &self.api_key {
                Some(key) => request.bearer_auth(key),
                None => request,
            }
        })
        .await
        .map_err(|e| AskflowError::generation(format!("request to {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AskflowError::generation(error_body(response).await));
        }

        let body: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| AskflowError::generation(format!("invalid completion response: {e}")))?;
        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AskflowError::generation("completion response had no content"))
    }
}

#[derive(Serialize)]
struct OllamaPayload<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    options: OllamaOptions<'a>,
}

#[derive(Serialize)]
struct OllamaOptions<'a> {
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    stop: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: ReplyMessage,
}

/// Client for a local Ollama server's `/api/chat` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaChatClient {
    client: Client,
    base_url: String,
    model: String,
    temperature: Option<f32>,
    retry: RetryConfig,
}

impl OllamaChatClient {
    /// Creates a client for `model` at `http://localhost:11434`.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: "http://localhost:11434".to_string(),
            model: model.into(),
            temperature: None,
            retry: RetryConfig::default(),
        }
    }

    /// Sets the server URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl TextGenerator for OllamaChatClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, messages: &[Message], stop: &[&str]) -> Result<String, AskflowError> {
        let url = format!("{}/api/chat", self.base_url);
        let payload = OllamaPayload {
            model: &self.model,
            messages,
            stream: false,
            options: OllamaOptions {
                stop,
                temperature: self.temperature,
            },
        };
        debug!(model = %self.model, messages = messages.len(), "Requesting Ollama chat");

        let response = send_with_retry(&self.retry, &url, || self.client.post(&url).json(&payload))
            .await
            .map_err(|e| AskflowError::generation(format!("request to {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AskflowError::generation(error_body(response).await));
        }

        let body: OllamaResponse = response
            .json()
            .await
            .map_err(|e| AskflowError::generation(format!("invalid Ollama response: {e}")))?;
        body.message
            .content
            .ok_or_else(|| AskflowError::generation("Ollama response had no content"))
    }
}
