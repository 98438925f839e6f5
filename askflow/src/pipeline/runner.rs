//! The sequential pipeline runner.

use crate::context::{Context, InputSchema, RunOptions, StageContext};
use crate::core::{StageOutput, StageStatus};
use crate::errors::{AskflowError, StageError};
use crate::events::PipelineEvent;
use crate::stages::Stage;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// A validated, ordered list of stages.
///
/// Built by [`super::PipelineBuilder`] or [`super::compose`]. A pipeline is
/// immutable and can be invoked any number of times, including concurrently.
#[derive(Debug, Clone)]
pub struct Pipeline {
    name: String,
    input_schema: InputSchema,
    stages: Vec<Arc<dyn Stage>>,
    output: String,
}

impl Pipeline {
    pub(crate) fn new(name: String, input_schema: InputSchema, stages: Vec<Arc<dyn Stage>>, output: String) -> Self {
        Self {
            name,
            input_schema,
            stages,
            output,
        }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the fields callers must supply.
    #[must_use]
    pub fn input_schema(&self) -> &InputSchema {
        &self.input_schema
    }

    /// Returns the field holding the pipeline's result.
    #[must_use]
    pub fn output_field(&self) -> &str {
        &self.output
    }

    /// Returns the stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Runs the pipeline with default options.
    pub async fn invoke(&self, input: Context) -> Result<Context, AskflowError> {
        self.invoke_with(input, &RunOptions::new()).await
    }

    /// Runs the pipeline and returns only its output field.
    pub async fn invoke_output(&self, input: Context, run: &RunOptions) -> Result<Value, AskflowError> {
        let context = self.invoke_with(input, run).await?;
        context
            .get(&self.output)
            .cloned()
            .ok_or_else(|| AskflowError::Internal(format!("pipeline '{}' did not produce '{}'", self.name, self.output)))
    }

    /// Runs the pipeline.
    ///
    /// Stages run one after another. Each receives a snapshot of the fields
    /// written so far, and its value is added under its output field. The
    /// first failure stops the run and is returned wrapped in a
    /// [`StageError`]; cancellation is returned as `Cancelled`.
    pub async fn invoke_with(&self, input: Context, run: &RunOptions) -> Result<Context, AskflowError> {
        self.input_schema.validate(&input)?;
        if run.cancellation().is_cancelled() {
            return Err(run.cancelled_error());
        }

        let run_id = run.run_id();
        let started = Instant::now();
        debug!(pipeline = %self.name, run_id = %run_id, stages = self.stages.len(), "Starting pipeline");
        run.emit(&PipelineEvent::pipeline_started(&self.name, run_id));

        match self.run_stages(input, run).await {
            Ok(context) => {
                let elapsed = elapsed_ms(started);
                debug!(pipeline = %self.name, run_id = %run_id, duration_ms = elapsed, "Pipeline completed");
                run.emit(&PipelineEvent::pipeline_completed(&self.name, run_id, elapsed));
                Ok(context)
            }
            Err(err) => {
                let elapsed = elapsed_ms(started);
                warn!(pipeline = %self.name, run_id = %run_id, error = %err, "Pipeline failed");
                run.emit(&PipelineEvent::pipeline_failed(&self.name, run_id, elapsed, &err));
                Err(err)
            }
        }
    }

    async fn run_stages(&self, mut context: Context, run: &RunOptions) -> Result<Context, AskflowError> {
        let run_id = run.run_id();

        for stage in &self.stages {
            let ctx = StageContext::new(&self.name, stage.name(), context.clone(), run.clone());
            let started = Instant::now();
            run.emit(&PipelineEvent::stage_started(&self.name, stage.name(), run_id));

            let output = tokio::select! {
                output = stage.execute(&ctx) => output,
                () = run.cancellation().cancelled() => StageOutput::cancel(
                    run.cancellation().reason().unwrap_or_default()
                ),
            };
            let elapsed = elapsed_ms(started);

            match output.status {
                StageStatus::Ok => {
                    let value = output.value.unwrap_or(Value::Null);
                    if let Err(conflict) = context.insert(stage.output(), value.clone()) {
                        let err = self.stage_error(stage.name(), conflict.into());
                        run.emit(&PipelineEvent::stage_failed(&self.name, stage.name(), run_id, elapsed, &err));
                        return Err(err);
                    }
                    let mut event = PipelineEvent::stage_completed(&self.name, stage.name(), run_id, elapsed, value);
                    event.metadata.extend(output.metadata);
                    run.emit(&event);
                }
                StageStatus::Fail => {
                    let cause = output
                        .error
                        .unwrap_or_else(|| AskflowError::Internal("stage failed without an error".to_string()));
                    let err = self.stage_error(stage.name(), cause);
                    run.emit(&PipelineEvent::stage_failed(&self.name, stage.name(), run_id, elapsed, &err));
                    return Err(err);
                }
                StageStatus::Cancel => {
                    let err = run
                        .cancellation()
                        .reason()
                        .or(output.cancel_reason)
                        .map_or_else(|| run.cancelled_error(), AskflowError::Cancelled);
                    run.emit(&PipelineEvent::stage_failed(&self.name, stage.name(), run_id, elapsed, &err));
                    return Err(err);
                }
            }
        }

        Ok(context)
    }

    fn stage_error(&self, stage: &str, cause: AskflowError) -> AskflowError {
        // Cancellation is reported as-is so callers can match on it directly.
        if cause.is_cancelled() {
            return cause;
        }
        StageError::new(&self.name, stage, cause).into()
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FieldKind;
    use crate::events::{CollectingEventSink, EventKind};
    use crate::pipeline::{compose, PipelineBuilder};
    use crate::cancellation::CancellationToken;
    use crate::testing::{FailingStage, MockStage, SlowStage};
    use serde_json::json;
    use std::time::Duration;

    fn echo_pipeline() -> Pipeline {
        PipelineBuilder::new("echo")
            .input("question", FieldKind::String)
            .stage(Arc::new(MockStage::new("a", &["question"], "first").returning(json!("one"))))
            .stage(Arc::new(MockStage::new("b", &["first"], "second").returning(json!("two"))))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_stages_run_in_order_and_accumulate() {
        let pipeline = echo_pipeline();
        let result = pipeline.invoke(Context::from_question("q")).await.unwrap();

        assert_eq!(result.get_str("question"), Some("q"));
        assert_eq!(result.get_str("first"), Some("one"));
        assert_eq!(result.get_str("second"), Some("two"));
    }

    #[tokio::test]
    async fn test_input_validation_runs_before_stages() {
        let stage = Arc::new(MockStage::new("a", &["question"], "out"));
        let pipeline = PipelineBuilder::new("p")
            .input("question", FieldKind::String)
            .stage(stage.clone())
            .build()
            .unwrap();

        let err = pipeline.invoke(Context::new()).await.unwrap_err();
        assert!(matches!(err, AskflowError::Validation(_)));
        assert_eq!(stage.call_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_stops_run_and_names_stage() {
        let after = Arc::new(MockStage::new("after", &[], "late"));
        let pipeline = compose(
            "p",
            [
                Arc::new(FailingStage::new("explode", "boom", AskflowError::generation("bad output"))) as Arc<dyn Stage>,
                after.clone() as Arc<dyn Stage>,
            ],
        )
        .unwrap();

        let err = pipeline.invoke(Context::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "p/explode failed: Generation error: bad output");
        assert_eq!(err.failed_stage(), Some(("p", "explode")));
        assert_eq!(after.call_count(), 0);
    }

    #[tokio::test]
    async fn test_events_are_emitted_in_order() {
        let sink = Arc::new(CollectingEventSink::new());
        let run = RunOptions::new().with_event_sink(sink.clone());
        echo_pipeline().invoke_with(Context::from_question("q"), &run).await.unwrap();

        assert_eq!(
            sink.event_names(),
            vec![
                "pipeline.started:echo",
                "stage.started:a",
                "stage.completed:a",
                "stage.started:b",
                "stage.completed:b",
                "pipeline.completed:echo",
            ]
        );
        let completed = sink.events_of_type("stage.completed");
        assert_eq!(completed[0].output, Some(json!("one")));
        assert!(completed.iter().all(|e| e.run_id == run.run_id()));
    }

    #[tokio::test]
    async fn test_failure_event_carries_error() {
        let sink = Arc::new(CollectingEventSink::new());
        let run = RunOptions::new().with_event_sink(sink.clone());
        let pipeline = compose(
            "p",
            [Arc::new(FailingStage::new("bad", "x", AskflowError::schema("offline"))) as Arc<dyn Stage>],
        )
        .unwrap();

        pipeline.invoke_with(Context::new(), &run).await.unwrap_err();

        let failed = sink.events_of_type("stage.failed");
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].metadata["error_kind"], "schema");
        assert_eq!(sink.events_of_type("pipeline.failed").len(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_running_stage() {
        let token = Arc::new(CancellationToken::new());
        let run = RunOptions::new().with_cancellation(token.clone());
        let after = Arc::new(MockStage::new("after", &["slept"], "done"));
        let pipeline = compose(
            "p",
            [
                Arc::new(SlowStage::new("sleep", "slept", Duration::from_secs(30))) as Arc<dyn Stage>,
                after.clone() as Arc<dyn Stage>,
            ],
        )
        .unwrap();

        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                token.cancel("caller gave up");
            })
        };

        let err = tokio::time::timeout(Duration::from_secs(5), pipeline.invoke_with(Context::new(), &run))
            .await
            .unwrap()
            .unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(err, AskflowError::Cancelled(ref reason) if reason == "caller gave up"));
        assert_eq!(after.call_count(), 0);
    }

    #[tokio::test]
    async fn test_already_cancelled_run_does_nothing() {
        let stage = Arc::new(MockStage::new("a", &[], "x"));
        let pipeline = compose("p", [stage.clone() as Arc<dyn Stage>]).unwrap();
        let run = RunOptions::new();
        run.cancellation().cancel("early");

        let err = pipeline.invoke_with(Context::new(), &run).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(stage.call_count(), 0);
    }

    #[tokio::test]
    async fn test_invoke_output() {
        let value = echo_pipeline()
            .invoke_output(Context::from_question("q"), &RunOptions::new())
            .await
            .unwrap();
        assert_eq!(value, json!("two"));
    }

    #[tokio::test]
    async fn test_stage_metadata_reaches_completion_event() {
        let sink = Arc::new(CollectingEventSink::new());
        let run = RunOptions::new().with_event_sink(sink.clone());
        let stage = MockStage::new("fan", &[], "items");
        stage.set_output(StageOutput::ok(json!([1, 2])).with_metadata("dropped", 1));
        let pipeline = compose("p", [Arc::new(stage) as Arc<dyn Stage>]).unwrap();

        pipeline.invoke_with(Context::new(), &run).await.unwrap();

        let completed = sink.events_of_type("stage.completed");
        assert_eq!(completed[0].kind, EventKind::StageCompleted);
        assert_eq!(completed[0].metadata["dropped"], json!(1));
    }
}
