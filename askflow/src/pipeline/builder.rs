//! Pipeline builder with validation.

use super::Pipeline;
use crate::context::{FieldKind, InputSchema};
use crate::errors::{ContractErrorInfo, PipelineValidationError};
use crate::stages::Stage;
use std::collections::HashSet;
use std::sync::Arc;

/// Builder for creating validated pipelines.
///
/// `build` checks, in order:
/// - the pipeline has a name and at least one stage
/// - stage names are unique
/// - every stage input is either a declared input or an earlier output
/// - no stage writes a field that already exists
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    name: String,
    input_schema: Option<InputSchema>,
    stages: Vec<Arc<dyn Stage>>,
    output: Option<String>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input_schema: None,
            stages: Vec::new(),
            output: None,
        }
    }

    /// Declares a required input field.
    #[must_use]
    pub fn input(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        let schema = self.input_schema.take().unwrap_or_default();
        self.input_schema = Some(schema.field(name, kind));
        self
    }

    /// Declares the whole input schema.
    #[must_use]
    pub fn with_input_schema(mut self, schema: InputSchema) -> Self {
        self.input_schema = Some(schema);
        self
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Appends several stages.
    #[must_use]
    pub fn stages(mut self, stages: impl IntoIterator<Item = Arc<dyn Stage>>) -> Self {
        self.stages.extend(stages);
        self
    }

    /// Names the field returned as the pipeline's result.
    ///
    /// Defaults to the last stage's output.
    #[must_use]
    pub fn output_field(mut self, field: impl Into<String>) -> Self {
        self.output = Some(field.into());
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns a `PipelineValidationError` carrying one of the
    /// `CONTRACT-*` codes when the stages do not fit together.
    pub fn build(self) -> Result<Pipeline, PipelineValidationError> {
        if self.name.trim().is_empty() {
            return Err(PipelineValidationError::new("Pipeline name is empty").with_error_info(
                ContractErrorInfo::new("CONTRACT-EMPTY", "Pipelines must be named")
                    .with_fix_hint("Pass a non-empty name to PipelineBuilder::new."),
            ));
        }
        let Some(last) = self.stages.last() else {
            return Err(PipelineValidationError::new(format!("Pipeline '{}' has no stages", self.name))
                .with_error_info(
                    ContractErrorInfo::new("CONTRACT-EMPTY", "Cannot build an empty pipeline")
                        .with_fix_hint("Add at least one stage to the pipeline before building."),
                ));
        };
        let output = self.output.clone().unwrap_or_else(|| last.output().to_string());

        let mut names = HashSet::new();
        for stage in &self.stages {
            if !names.insert(stage.name()) {
                return Err(PipelineValidationError::new(format!(
                    "Stage '{}' appears more than once in pipeline '{}'",
                    stage.name(),
                    self.name
                ))
                .with_stages(vec![stage.name().to_string()])
                .with_error_info(
                    ContractErrorInfo::new("CONTRACT-DUPLICATE-STAGE", "Stage names must be unique")
                        .with_fix_hint("Rename one of the stages."),
                ));
            }
        }

        let declared = self.input_schema.is_some();
        let mut schema = self.input_schema.unwrap_or_default();
        let mut available: HashSet<String> = schema.fields().iter().map(|f| f.name.clone()).collect();

        for stage in &self.stages {
            for input in &stage.contract().inputs {
                if available.contains(input) {
                    continue;
                }
                if declared {
                    return Err(missing_field(&self.name, Some(stage.name()), input));
                }
                // Without a declared schema, unresolved inputs become required caller fields.
                schema = schema.field(input.clone(), FieldKind::Any);
                available.insert(input.clone());
            }

            if !available.insert(stage.output().to_string()) {
                return Err(PipelineValidationError::new(format!(
                    "Stage '{}' writes '{}', which already exists in pipeline '{}'",
                    stage.name(),
                    stage.output(),
                    self.name
                ))
                .with_stages(vec![stage.name().to_string()])
                .with_error_info(
                    ContractErrorInfo::new(
                        "CONTRACT-OUTPUT-CONFLICT",
                        format!("Field '{}' is written twice", stage.output()),
                    )
                    .with_fix_hint("Give the stage a distinct output field.")
                    .with_context_entry("field", stage.output()),
                ));
            }
        }

        if !available.contains(&output) {
            return Err(missing_field(&self.name, None, &output));
        }

        Ok(Pipeline::new(self.name, schema, self.stages, output))
    }
}

fn missing_field(pipeline: &str, stage: Option<&str>, field: &str) -> PipelineValidationError {
    let message = match stage {
        Some(stage) => format!(
            "Stage '{stage}' in pipeline '{pipeline}' reads '{field}', which is neither a declared input nor an earlier output"
        ),
        None => format!("Pipeline '{pipeline}' returns '{field}', which no stage produces"),
    };
    PipelineValidationError::new(message)
        .with_stages(stage.map(str::to_string).into_iter().collect())
        .with_error_info(
            ContractErrorInfo::new("CONTRACT-MISSING-FIELD", format!("Field '{field}' is never produced"))
                .with_fix_hint("Declare the field as an input or add a stage that outputs it earlier.")
                .with_context_entry("field", field),
        )
}

/// Builds a pipeline from stages, inferring its inputs.
///
/// # Errors
///
/// Returns the same errors as [`PipelineBuilder::build`].
pub fn compose(
    name: impl Into<String>,
    stages: impl IntoIterator<Item = Arc<dyn Stage>>,
) -> Result<Pipeline, PipelineValidationError> {
    PipelineBuilder::new(name).stages(stages).build()
}
