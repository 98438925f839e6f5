//! Stage output type with factory methods.

use super::StageStatus;
use crate::errors::AskflowError;
use serde_json::Value;
use std::collections::BTreeMap;

/// The output of a stage execution.
///
/// A successful stage returns exactly one value, which the runner stores
/// under the stage's declared output field.
#[derive(Debug, Clone)]
pub struct StageOutput {
    /// The status of the stage execution.
    pub status: StageStatus,
    /// The produced value (for successful executions).
    pub value: Option<Value>,
    /// The error (for failed executions).
    pub error: Option<AskflowError>,
    /// Cancel reason (for cancelled executions).
    pub cancel_reason: Option<String>,
    /// Extra data reported alongside the completion event.
    pub metadata: BTreeMap<String, Value>,
}

impl StageOutput {
    /// Creates a successful output.
    #[must_use]
    pub fn ok(value: impl Into<Value>) -> Self {
        Self {
            status: StageStatus::Ok,
            value: Some(value.into()),
            error: None,
            cancel_reason: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Creates a failure output.
    #[must_use]
    pub fn fail(error: impl Into<AskflowError>) -> Self {
        Self {
            status: StageStatus::Fail,
            value: None,
            error: Some(error.into()),
            cancel_reason: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Creates a cancel output with a reason.
    #[must_use]
    pub fn cancel(reason: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Cancel,
            value: None,
            error: None,
            cancel_reason: Some(reason.into()),
            metadata: BTreeMap::new(),
        }
    }

    /// Converts a result into an output, mapping `Cancelled` errors to a cancel.
    #[must_use]
    pub fn from_result(result: Result<Value, AskflowError>) -> Self {
        match result {
            Ok(value) => Self::ok(value),
            Err(AskflowError::Cancelled(reason)) => Self::cancel(reason),
            Err(err) => Self::fail(err),
        }
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Returns true if the stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns true if the stage failed or was cancelled.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status.is_failure()
    }
}
