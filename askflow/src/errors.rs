//! Error types for askflow.
//!
//! Every failure that can escape a pipeline run is an [`AskflowError`].
//! Stage failures are wrapped in [`StageError`] so callers can see which
//! pipeline and stage failed, and [`AskflowError::root_cause`] walks back
//! through those wrappers to the original error.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// The main error type for askflow operations.
#[derive(Debug, Clone, Error)]
pub enum AskflowError {
    /// Caller input did not satisfy a pipeline's input schema.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// A pipeline could not be constructed.
    #[error("{0}")]
    PipelineValidation(#[from] PipelineValidationError),

    /// A stage tried to overwrite an existing context field.
    #[error("{0}")]
    DataConflict(#[from] DataConflictError),

    /// The text generator failed or produced unusable output.
    #[error("Generation error: {0}")]
    Generation(String),

    /// The query executor rejected a query.
    #[error("{0}")]
    Execution(#[from] ExecutionError),

    /// A page could not be fetched.
    #[error("{0}")]
    Fetch(#[from] FetchError),

    /// A search provider call failed.
    #[error("Search error for query '{query}': {message}")]
    Search {
        /// The search query that failed.
        query: String,
        /// The provider's message.
        message: String,
    },

    /// The schema provider failed.
    #[error("Schema error: {0}")]
    Schema(String),

    /// An I/O call exceeded the configured timeout.
    #[error("Timed out after {seconds:.1}s: {operation}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout that was exceeded, in seconds.
        seconds: f64,
    },

    /// The run was cancelled.
    #[error("Pipeline cancelled: {0}")]
    Cancelled(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A stage failed inside a named pipeline.
    #[error("{0}")]
    Stage(#[from] StageError),

    /// Every branch of a merge failed.
    #[error("{0}")]
    Aggregate(#[from] AggregateError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AskflowError {
    /// Creates a generation error.
    #[must_use]
    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation(message.into())
    }

    /// Creates a search error for a query.
    #[must_use]
    pub fn search(query: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Search {
            query: query.into(),
            message: message.into(),
        }
    }

    /// Creates a schema error.
    #[must_use]
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema(message.into())
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Returns the innermost error, unwrapping any stage wrappers.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        let mut current = self;
        while let Self::Stage(stage) = current {
            current = &stage.cause;
        }
        current
    }

    /// Returns the innermost `(pipeline, stage)` pair that failed, if any.
    #[must_use]
    pub fn failed_stage(&self) -> Option<(&str, &str)> {
        let mut found = None;
        let mut current = self;
        while let Self::Stage(stage) = current {
            found = Some((stage.pipeline.as_str(), stage.stage.as_str()));
            current = &stage.cause;
        }
        found
    }

    /// Returns the query attached to an execution failure, if any.
    #[must_use]
    pub fn failed_query(&self) -> Option<&str> {
        match self.root_cause() {
            Self::Execution(err) => Some(err.query.as_str()),
            _ => None,
        }
    }

    /// Returns a short machine-readable name for the error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::PipelineValidation(_) => "pipeline_validation",
            Self::DataConflict(_) => "data_conflict",
            Self::Generation(_) => "generation",
            Self::Execution(_) => "execution",
            Self::Fetch(_) => "fetch",
            Self::Search { .. } => "search",
            Self::Schema(_) => "schema",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled(_) => "cancelled",
            Self::Config(_) => "config",
            Self::Stage(_) => "stage",
            Self::Aggregate(_) => "aggregate",
            Self::Serialization(_) => "serialization",
            Self::Internal(_) => "internal",
        }
    }

    /// Returns true if the run was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root_cause(), Self::Cancelled(_))
    }

    /// The error as a JSON object, for API responses and failure events.
    ///
    /// Always has `kind` (of the root cause) and `message`. Stage failures
    /// add `pipeline` and `stage`, execution failures add `query`, and
    /// contract failures add the validation details under `contract`.
    #[must_use]
    pub fn to_dict(&self) -> serde_json::Value {
        let root = self.root_cause();
        let mut dict = serde_json::json!({
            "kind": root.kind(),
            "message": self.to_string(),
        });
        if let Some((pipeline, stage)) = self.failed_stage() {
            dict["pipeline"] = pipeline.into();
            dict["stage"] = stage.into();
        }
        if let Some(query) = self.failed_query() {
            dict["query"] = query.into();
        }
        if let Self::PipelineValidation(err) = root {
            dict["contract"] = err.to_dict();
        }
        dict
    }
}

impl From<serde_json::Error> for AskflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Error raised when caller input fails schema validation.
#[derive(Debug, Clone, Error)]
#[error("Validation error: {message}")]
pub struct ValidationError {
    /// The offending field, when one can be named.
    pub field: Option<String>,
    /// Description of the problem.
    pub message: String,
}

impl ValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }

    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn for_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            message: message.into(),
        }
    }
}

/// Machine-readable details attached to a pipeline build failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractErrorInfo {
    /// Stable code, e.g. `CONTRACT-MISSING-FIELD`.
    pub code: String,
    /// One-line description.
    pub summary: String,
    /// How to fix the pipeline, when there is an obvious way.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_hint: Option<String>,
    /// Names involved, e.g. `field`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates error details with a code and summary.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            ..Self::default()
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when a pipeline cannot be built.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// What is wrong.
    pub message: String,
    /// Stages involved, if any.
    pub stages: Vec<String>,
    /// Code and fix hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a build error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Names the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Attaches a code and fix hint.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract code, if one was attached.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }

    /// The error as a JSON object, for API responses and logs.
    #[must_use]
    pub fn to_dict(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Error raised when writing to an existing key in a context.
#[derive(Debug, Clone, Error)]
#[error("Data conflict: field '{key}' already exists")]
pub struct DataConflictError {
    /// The conflicting key.
    pub key: String,
}

impl DataConflictError {
    /// Creates a new data conflict error.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Error raised when a generated query cannot be executed.
#[derive(Debug, Clone, Error)]
#[error("Query execution failed: {message} (query: {query})")]
pub struct ExecutionError {
    /// The query that was attempted.
    pub query: String,
    /// The executor's message.
    pub message: String,
}

impl ExecutionError {
    /// Creates a new execution error.
    #[must_use]
    pub fn new(query: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            message: message.into(),
        }
    }
}

/// Error raised when a page cannot be fetched or read.
#[derive(Debug, Clone, Error)]
#[error("Fetch failed for {url}: {message}")]
pub struct FetchError {
    /// The URL that failed.
    pub url: String,
    /// Description of the failure.
    pub message: String,
}

impl FetchError {
    /// Creates a new fetch error.
    #[must_use]
    pub fn new(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            message: message.into(),
        }
    }
}

/// A stage failure, tagged with the pipeline and stage names.
#[derive(Debug, Clone, Error)]
#[error("{pipeline}/{stage} failed: {cause}")]
pub struct StageError {
    /// The pipeline the stage belongs to.
    pub pipeline: String,
    /// The failing stage.
    pub stage: String,
    /// The underlying error.
    pub cause: Box<AskflowError>,
}

impl StageError {
    /// Creates a new stage error.
    #[must_use]
    pub fn new(pipeline: impl Into<String>, stage: impl Into<String>, cause: AskflowError) -> Self {
        Self {
            pipeline: pipeline.into(),
            stage: stage.into(),
            cause: Box::new(cause),
        }
    }
}

/// One failed branch of a merge.
#[derive(Debug, Clone)]
pub struct BranchFailure {
    /// Name of the sub-pipeline that failed.
    pub branch: String,
    /// Its error.
    pub error: AskflowError,
}

impl BranchFailure {
    /// Creates a new branch failure.
    #[must_use]
    pub fn new(branch: impl Into<String>, error: AskflowError) -> Self {
        Self {
            branch: branch.into(),
            error,
        }
    }
}

/// Error raised when every branch of a merge failed.
#[derive(Debug, Clone, Error)]
#[error("All sub-pipelines failed: {}", describe_failures(failures))]
pub struct AggregateError {
    /// One entry per failed branch, in declaration order.
    pub failures: Vec<BranchFailure>,
}

impl AggregateError {
    /// Creates a new aggregate error.
    #[must_use]
    pub fn new(failures: Vec<BranchFailure>) -> Self {
        Self { failures }
    }
}

fn describe_failures(failures: &[BranchFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.branch, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_display() {
        let err = StageError::new(
            "sql_qa",
            "execute_sql",
            ExecutionError::new("SELECT * FROM nope", "no such table: nope").into(),
        );
        assert_eq!(
            err.to_string(),
            "sql_qa/execute_sql failed: Query execution failed: no such table: nope (query: SELECT * FROM nope)"
        );
    }

    #[test]
    fn test_root_cause_unwraps_nested_stages() {
        let inner: AskflowError = StageError::new(
            "web_research",
            "synthesize_report",
            AskflowError::generation("no sources"),
        )
        .into();
        let outer: AskflowError = StageError::new("assistant", "web_research", inner).into();

        assert!(matches!(outer.root_cause(), AskflowError::Generation(_)));
        assert_eq!(
            outer.failed_stage(),
            Some(("web_research", "synthesize_report"))
        );
        assert_eq!(outer.kind(), "stage");
        assert_eq!(outer.root_cause().kind(), "generation");
    }

    #[test]
    fn test_failed_query_is_preserved() {
        let err: AskflowError = StageError::new(
            "sql_qa",
            "execute_sql",
            ExecutionError::new("SELECT 1/", "syntax error").into(),
        )
        .into();
        assert_eq!(err.failed_query(), Some("SELECT 1/"));
        assert_eq!(AskflowError::generation("x").failed_query(), None);
    }

    #[test]
    fn test_aggregate_display_lists_branches() {
        let err = AggregateError::new(vec![
            BranchFailure::new("sql_qa", AskflowError::schema("offline")),
            BranchFailure::new("web_research", AskflowError::generation("no sources")),
        ]);
        assert_eq!(
            err.to_string(),
            "All sub-pipelines failed: sql_qa: Schema error: offline; web_research: Generation error: no sources"
        );
    }

    #[test]
    fn test_pipeline_validation_to_dict() {
        let err = PipelineValidationError::new("missing field")
            .with_stages(vec!["generate_sql".to_string()])
            .with_error_info(
                ContractErrorInfo::new("CONTRACT-MISSING-FIELD", "field 'schema' is never produced")
                    .with_fix_hint("Add a stage that outputs 'schema'")
                    .with_context_entry("field", "schema"),
            );

        let dict = err.to_dict();
        assert_eq!(dict["message"], "missing field");
        assert_eq!(dict["stages"][0], "generate_sql");
        assert_eq!(dict["error_info"]["code"], "CONTRACT-MISSING-FIELD");
        assert_eq!(dict["error_info"]["context"]["field"], "schema");
        assert_eq!(err.code(), Some("CONTRACT-MISSING-FIELD"));

        let wrapped: AskflowError = StageError::new("askflow", "sql_qa", err.into()).into();
        let dict = wrapped.to_dict();
        assert_eq!(dict["kind"], "pipeline_validation");
        assert_eq!(dict["stage"], "sql_qa");
        assert_eq!(dict["contract"]["error_info"]["code"], "CONTRACT-MISSING-FIELD");
    }

    #[test]
    fn test_execution_error_to_dict_keeps_query() {
        let err: AskflowError = StageError::new(
            "sql_qa",
            "execute_sql",
            ExecutionError::new("SELECT height FROM roster", "no such column: height").into(),
        )
        .into();

        let dict = err.to_dict();

        assert_eq!(dict["kind"], "execution");
        assert_eq!(dict["pipeline"], "sql_qa");
        assert_eq!(dict["stage"], "execute_sql");
        assert_eq!(dict["query"], "SELECT height FROM roster");
        assert!(dict.get("contract").is_none());
    }

    #[test]
    fn test_cancelled_detection() {
        let err: AskflowError =
            StageError::new("p", "s", AskflowError::Cancelled("user".into())).into();
        assert!(err.is_cancelled());
        assert!(!AskflowError::config("bad").is_cancelled());
    }
}
