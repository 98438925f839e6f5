//! Events emitted while a pipeline runs.

use crate::errors::AskflowError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A pipeline began.
    #[serde(rename = "pipeline.started")]
    PipelineStarted,
    /// A pipeline finished successfully.
    #[serde(rename = "pipeline.completed")]
    PipelineCompleted,
    /// A pipeline stopped on an error.
    #[serde(rename = "pipeline.failed")]
    PipelineFailed,
    /// A stage began.
    #[serde(rename = "stage.started")]
    StageStarted,
    /// A stage produced its output.
    #[serde(rename = "stage.completed")]
    StageCompleted,
    /// A stage failed.
    #[serde(rename = "stage.failed")]
    StageFailed,
    /// One item of a fan-out stage was dropped.
    #[serde(rename = "fanout.item_dropped")]
    ItemDropped,
}

impl EventKind {
    /// Returns the dotted event name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PipelineStarted => "pipeline.started",
            Self::PipelineCompleted => "pipeline.completed",
            Self::PipelineFailed => "pipeline.failed",
            Self::StageStarted => "stage.started",
            Self::StageCompleted => "stage.completed",
            Self::StageFailed => "stage.failed",
            Self::ItemDropped => "fanout.item_dropped",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single observation from a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// Event type.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Name of the pipeline that emitted the event.
    pub pipeline: String,
    /// Stage name for stage events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Run the event belongs to.
    pub run_id: Uuid,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
    /// Elapsed time for completion and failure events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    /// The value a completed stage produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Error text for failure events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Extra data, such as dropped item counts.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl PipelineEvent {
    fn base(kind: EventKind, pipeline: &str, stage: Option<&str>, run_id: Uuid) -> Self {
        Self {
            kind,
            pipeline: pipeline.to_string(),
            stage: stage.map(str::to_string),
            run_id,
            timestamp: Utc::now(),
            duration_ms: None,
            output: None,
            error: None,
            metadata: BTreeMap::new(),
        }
    }

    /// A pipeline started.
    #[must_use]
    pub fn pipeline_started(pipeline: &str, run_id: Uuid) -> Self {
        Self::base(EventKind::PipelineStarted, pipeline, None, run_id)
    }

    /// A pipeline completed.
    #[must_use]
    pub fn pipeline_completed(pipeline: &str, run_id: Uuid, duration_ms: f64) -> Self {
        let mut event = Self::base(EventKind::PipelineCompleted, pipeline, None, run_id);
        event.duration_ms = Some(duration_ms);
        event
    }

    /// A pipeline failed.
    #[must_use]
    pub fn pipeline_failed(pipeline: &str, run_id: Uuid, duration_ms: f64, error: &AskflowError) -> Self {
        let mut event = Self::base(EventKind::PipelineFailed, pipeline, None, run_id);
        event.duration_ms = Some(duration_ms);
        event.error = Some(error.to_string());
        event.metadata.insert("error_details".to_string(), error.to_dict());
        event
    }

    /// A stage started.
    #[must_use]
    pub fn stage_started(pipeline: &str, stage: &str, run_id: Uuid) -> Self {
        Self::base(EventKind::StageStarted, pipeline, Some(stage), run_id)
    }

    /// A stage completed with `output`.
    #[must_use]
    pub fn stage_completed(pipeline: &str, stage: &str, run_id: Uuid, duration_ms: f64, output: Value) -> Self {
        let mut event = Self::base(EventKind::StageCompleted, pipeline, Some(stage), run_id);
        event.duration_ms = Some(duration_ms);
        event.output = Some(output);
        event
    }

    /// A stage failed.
    #[must_use]
    pub fn stage_failed(pipeline: &str, stage: &str, run_id: Uuid, duration_ms: f64, error: &AskflowError) -> Self {
        let mut event = Self::base(EventKind::StageFailed, pipeline, Some(stage), run_id);
        event.duration_ms = Some(duration_ms);
        event.error = Some(error.to_string());
        event.metadata.insert("error_kind".to_string(), error.root_cause().kind().into());
        event.metadata.insert("error_details".to_string(), error.to_dict());
        event
    }

    /// A fan-out item was dropped.
    #[must_use]
    pub fn item_dropped(pipeline: &str, stage: &str, run_id: Uuid, item: &str, error: &AskflowError) -> Self {
        let mut event = Self::base(EventKind::ItemDropped, pipeline, Some(stage), run_id);
        event.error = Some(error.to_string());
        event.metadata.insert("item".to_string(), item.into());
        event
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
