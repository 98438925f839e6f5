//! Per-invocation settings shared by every stage of a run.

use super::identity::RunIdentity;
use crate::cancellation::CancellationToken;
use crate::errors::AskflowError;
use crate::events::{EventSink, NoOpEventSink, PipelineEvent};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Settings for one pipeline invocation.
///
/// Nested pipelines (sub-pipelines and merge branches) receive a clone, so
/// they share the parent's cancellation token, timeout and event sink.
#[derive(Clone)]
pub struct RunOptions {
    identity: RunIdentity,
    io_timeout: Option<Duration>,
    cancel: Arc<CancellationToken>,
    events: Arc<dyn EventSink>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl RunOptions {
    /// Creates options with a fresh identity, no timeout and a no-op sink.
    #[must_use]
    pub fn new() -> Self {
        Self {
            identity: RunIdentity::new(),
            io_timeout: None,
            cancel: Arc::new(CancellationToken::new()),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the run identity.
    #[must_use]
    pub fn with_identity(mut self, identity: RunIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Sets the timeout applied to each external call.
    #[must_use]
    pub fn with_io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancel = token;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Returns the run identity.
    #[must_use]
    pub fn identity(&self) -> &RunIdentity {
        &self.identity
    }

    /// Returns the run ID.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.identity.run_id
    }

    /// Returns the per-call timeout.
    #[must_use]
    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &Arc<CancellationToken> {
        &self.cancel
    }

    /// Returns the event sink.
    #[must_use]
    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    /// Sends an event to the sink.
    pub fn emit(&self, event: &PipelineEvent) {
        self.events.try_emit(event);
    }

    /// Builds the error returned when the token has fired.
    #[must_use]
    pub fn cancelled_error(&self) -> AskflowError {
        AskflowError::Cancelled(
            self.cancel
                .reason()
                .unwrap_or_else(|| "cancellation requested".to_string()),
        )
    }

    /// Runs an external call under the configured timeout.
    pub async fn guard<T, F>(&self, operation: &str, call: F) -> Result<T, AskflowError>
    where
        F: Future<Output = Result<T, AskflowError>>,
    {
        match self.io_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| AskflowError::Timeout {
                    operation: operation.to_string(),
                    seconds: limit.as_secs_f64(),
                })?,
            None => call.await,
        }
    }
}

impl std::fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOptions")
            .field("identity", &self.identity)
            .field("io_timeout", &self.io_timeout)
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}
