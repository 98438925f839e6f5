//! Running two pipelines concurrently and combining their results.

use super::{Pipeline, PipelineBuilder};
use crate::context::{Context, StageContext};
use crate::core::{StageKind, StageOutput};
use crate::errors::{AggregateError, AskflowError, BranchFailure, PipelineValidationError};
use crate::stages::{Stage, StageContract};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// The outcome of one merge branch, as seen by the combiner.
pub type Branch<'a> = Result<&'a Context, &'a AskflowError>;

type Combiner = dyn for<'a> Fn(Branch<'a>, Branch<'a>) -> Result<Value, AskflowError> + Send + Sync;

/// A stage that runs two pipelines concurrently on copies of its input.
///
/// The combiner is called whenever at least one branch succeeds. When both
/// fail the stage fails with an [`AggregateError`] listing both causes. A
/// cancelled run is reported as cancelled even if one branch finished.
pub struct MergeStage {
    contract: StageContract,
    left: Arc<Pipeline>,
    right: Arc<Pipeline>,
    combiner: Box<Combiner>,
}

impl MergeStage {
    /// Creates a merge stage.
    pub fn new<F>(name: impl Into<String>, left: Arc<Pipeline>, right: Arc<Pipeline>, output: impl Into<String>, combiner: F) -> Self
    where
        F: for<'a> Fn(Branch<'a>, Branch<'a>) -> Result<Value, AskflowError> + Send + Sync + 'static,
    {
        let mut inputs: Vec<String> = Vec::new();
        for field in left.input_schema().fields().iter().chain(right.input_schema().fields()) {
            if !inputs.contains(&field.name) {
                inputs.push(field.name.clone());
            }
        }
        Self {
            contract: StageContract::new(name, output).with_inputs(inputs).with_kind(StageKind::Merge),
            left,
            right,
            combiner: Box::new(combiner),
        }
    }
}

impl std::fmt::Debug for MergeStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeStage")
            .field("contract", &self.contract)
            .field("left", &self.left.name())
            .field("right", &self.right.name())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for MergeStage {
    fn contract(&self) -> &StageContract {
        &self.contract
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        let (left, right) = tokio::join!(
            self.left.invoke_with(ctx.data().clone(), ctx.run()),
            self.right.invoke_with(ctx.data().clone(), ctx.run()),
        );

        if ctx.run().cancellation().is_cancelled() {
            return StageOutput::cancel(ctx.run().cancellation().reason().unwrap_or_default());
        }

        let mut failed = Vec::new();
        for (name, result) in [(self.left.name(), &left), (self.right.name(), &right)] {
            if let Err(err) = result {
                warn!(merge = %self.contract.name, branch = %name, error = %err, "Merge branch failed");
                failed.push(BranchFailure::new(name, err.clone()));
            }
        }

        if failed.len() == 2 {
            return StageOutput::fail(AggregateError::new(failed));
        }

        let failed_names: Vec<Value> = failed.iter().map(|f| Value::String(f.branch.clone())).collect();
        match (self.combiner)(left.as_ref(), right.as_ref()) {
            Ok(value) => StageOutput::ok(value).with_metadata("failed_branches", failed_names),
            Err(err) => StageOutput::fail(err),
        }
    }
}

/// Builds a pipeline that runs `left` and `right` concurrently and writes
/// the combiner's result to `output`.
///
/// The merged pipeline requires the union of both input schemas. Neither
/// branch sees the other's writes.
///
/// # Errors
///
/// Returns a `PipelineValidationError` if the two input schemas disagree
/// on a field's type.
pub fn merge<F>(
    name: impl Into<String>,
    left: Pipeline,
    right: Pipeline,
    output: impl Into<String>,
    combiner: F,
) -> Result<Pipeline, PipelineValidationError>
where
    F: for<'a> Fn(Branch<'a>, Branch<'a>) -> Result<Value, AskflowError> + Send + Sync + 'static,
{
    let name = name.into();
    let schema = left.input_schema().union(right.input_schema())?;
    let stage = MergeStage::new(name.clone(), Arc::new(left), Arc::new(right), output, combiner);
    PipelineBuilder::new(name)
        .with_input_schema(schema)
        .stage(Arc::new(stage))
        .build()
}
