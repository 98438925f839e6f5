//! Running a pipeline as a single stage of another.

use super::Pipeline;
use crate::context::StageContext;
use crate::core::{StageKind, StageOutput};
use crate::stages::{Stage, StageContract};
use async_trait::async_trait;
use std::sync::Arc;

/// A stage that runs a nested pipeline.
///
/// The nested pipeline receives a copy of the parent's fields and shares its
/// run options. Only the nested pipeline's output field is written back to
/// the parent, under this stage's output name.
#[derive(Debug, Clone)]
pub struct SubPipelineStage {
    contract: StageContract,
    pipeline: Arc<Pipeline>,
}

impl SubPipelineStage {
    /// Wraps `pipeline`, named after it and writing its output field.
    #[must_use]
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        let contract = StageContract::new(pipeline.name(), pipeline.output_field())
            .with_inputs(pipeline.input_schema().fields().iter().map(|f| f.name.clone()))
            .with_kind(StageKind::Merge);
        Self { contract, pipeline }
    }

    /// Writes the nested result under a different field name.
    #[must_use]
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.contract.output = output.into();
        self
    }

    /// Returns the nested pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }
}

#[async_trait]
impl Stage for SubPipelineStage {
    fn contract(&self) -> &StageContract {
        &self.contract
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        let result = self.pipeline.invoke_output(ctx.data().clone(), ctx.run()).await;
        StageOutput::from_result(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Context, FieldKind};
    use crate::errors::AskflowError;
    use crate::pipeline::PipelineBuilder;
    use crate::testing::{FailingStage, MockStage};
    use serde_json::json;

    fn inner() -> Arc<Pipeline> {
        Arc::new(
            PipelineBuilder::new("inner")
                .input("question", FieldKind::String)
                .stage(Arc::new(MockStage::new("think", &["question"], "thought").returning(json!("hmm"))))
                .stage(Arc::new(MockStage::new("say", &["thought"], "answer").returning(json!("42"))))
                .build()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_only_output_is_written_back() {
        let outer = PipelineBuilder::new("outer")
            .input("question", FieldKind::String)
            .stage(Arc::new(SubPipelineStage::new(inner()).with_output("inner_answer")))
            .build()
            .unwrap();

        let result = outer.invoke(Context::from_question("why?")).await.unwrap();
        assert_eq!(result.get_str("inner_answer"), Some("42"));
        assert!(!result.contains("thought"));
        assert!(!result.contains("answer"));
    }

    #[tokio::test]
    async fn test_contract_mirrors_pipeline() {
        let stage = SubPipelineStage::new(inner());
        assert_eq!(stage.name(), "inner");
        assert_eq!(stage.output(), "answer");
        assert_eq!(stage.contract().inputs, vec!["question"]);
    }

    #[tokio::test]
    async fn test_nested_failure_keeps_both_stage_names() {
        let failing = Arc::new(
            PipelineBuilder::new("inner")
                .stage(Arc::new(FailingStage::new("broken", "x", AskflowError::schema("down"))))
                .build()
                .unwrap(),
        );
        let outer = PipelineBuilder::new("outer")
            .stage(Arc::new(SubPipelineStage::new(failing)))
            .build()
            .unwrap();

        let err = outer.invoke(Context::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "outer/inner failed: inner/broken failed: Schema error: down");
        assert_eq!(err.failed_stage(), Some(("inner", "broken")));
        assert!(matches!(err.root_cause(), AskflowError::Schema(_)));
    }
}
