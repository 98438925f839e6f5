//! The view of a run that a single stage sees.

use super::fields::Context;
use super::run::RunOptions;
use crate::errors::AskflowError;
use crate::events::PipelineEvent;
use serde::de::DeserializeOwned;
use std::future::Future;

/// Execution context for a single stage.
///
/// Holds a snapshot of the pipeline's fields at the time the stage starts.
#[derive(Debug, Clone)]
pub struct StageContext {
    pipeline: String,
    stage: String,
    data: Context,
    run: RunOptions,
}

impl StageContext {
    /// Creates a new stage context.
    #[must_use]
    pub fn new(
        pipeline: impl Into<String>,
        stage: impl Into<String>,
        data: Context,
        run: RunOptions,
    ) -> Self {
        Self {
            pipeline: pipeline.into(),
            stage: stage.into(),
            data,
            run,
        }
    }

    /// Creates a context for running a stage outside a pipeline.
    #[must_use]
    pub fn detached(stage: impl Into<String>, data: Context) -> Self {
        Self::new("detached", stage, data, RunOptions::new())
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn pipeline_name(&self) -> &str {
        &self.pipeline
    }

    /// Returns the stage name.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        &self.stage
    }

    /// Returns the field snapshot.
    #[must_use]
    pub fn data(&self) -> &Context {
        &self.data
    }

    /// Returns the run options.
    #[must_use]
    pub fn run(&self) -> &RunOptions {
        &self.run
    }

    /// Gets a required string input.
    pub fn input_str(&self, field: &str) -> Result<&str, AskflowError> {
        self.data.require_str(field)
    }

    /// Deserializes a required input.
    pub fn input_as<T: DeserializeOwned>(&self, field: &str) -> Result<T, AskflowError> {
        self.data.get_as(field)
    }

    /// Runs an external call under the run's timeout.
    pub async fn call<T, F>(&self, operation: &str, call: F) -> Result<T, AskflowError>
    where
        F: Future<Output = Result<T, AskflowError>>,
    {
        self.run.guard(operation, call).await
    }

    /// Reports that one fan-out item was dropped.
    pub fn report_dropped(&self, item: &str, error: &AskflowError) {
        tracing::warn!(
            pipeline = %self.pipeline,
            stage = %self.stage,
            item = %item,
            error = %error,
            "Dropping failed item"
        );
        self.run.emit(&PipelineEvent::item_dropped(
            &self.pipeline,
            &self.stage,
            self.run.run_id(),
            item,
            error,
        ));
    }
}
