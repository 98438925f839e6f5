//! Assistant configuration.

use crate::errors::AskflowError;
use crate::prompts::ReportType;
use crate::research::ResearchConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Which sub-pipelines answer a question.
///
/// Defaults to [`AnswerMode::Both`]: the SQL answer followed by the research
/// report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnswerMode {
    /// Only the SQL question answering pipeline.
    SqlOnly,
    /// Only the web research pipeline.
    WebOnly,
    /// Both, run concurrently and merged.
    #[default]
    Both,
}

impl AnswerMode {
    /// Returns true if the SQL pipeline runs in this mode.
    #[must_use]
    pub const fn runs_sql(self) -> bool {
        matches!(self, Self::SqlOnly | Self::Both)
    }

    /// Returns true if the research pipeline runs in this mode.
    #[must_use]
    pub const fn runs_web(self) -> bool {
        matches!(self, Self::WebOnly | Self::Both)
    }
}

impl fmt::Display for AnswerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SqlOnly => write!(f, "sql-only"),
            Self::WebOnly => write!(f, "web-only"),
            Self::Both => write!(f, "both"),
        }
    }
}

/// Configuration for an [`super::Assistant`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantConfig {
    /// Model name passed to the text generator.
    #[serde(default = "default_model")]
    pub model: String,

    /// Which sub-pipelines run.
    #[serde(default)]
    pub answer_mode: AnswerMode,

    /// Number of web search queries to generate.
    #[serde(default = "default_search_query_count")]
    pub search_query_count: usize,

    /// Sample rows per table included in the schema description.
    #[serde(default)]
    pub schema_sample_row_count: usize,

    /// Search hits kept per query.
    #[serde(default = "default_results_per_query")]
    pub results_per_query: usize,

    /// Characters of page text kept per source.
    #[serde(default = "default_max_page_chars")]
    pub max_page_chars: usize,

    /// Shape of the research report.
    #[serde(default)]
    pub report_type: ReportType,

    /// Whether to pick a research persona before generating queries.
    #[serde(default)]
    pub choose_agent_role: bool,

    /// Timeout for each external call, in seconds. `None` disables it.
    #[serde(default = "default_io_timeout")]
    pub io_timeout_seconds: Option<f64>,
}

fn default_model() -> String {
    "llama2".to_string()
}

const fn default_search_query_count() -> usize {
    3
}

const fn default_results_per_query() -> usize {
    3
}

const fn default_max_page_chars() -> usize {
    10_000
}

/// Upper bound for `ioTimeoutSeconds`, one day.
pub const MAX_IO_TIMEOUT_SECONDS: f64 = 86_400.0;

#[allow(clippy::unnecessary_wraps)]
fn default_io_timeout() -> Option<f64> {
    Some(120.0)
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            answer_mode: AnswerMode::default(),
            search_query_count: default_search_query_count(),
            schema_sample_row_count: 0,
            results_per_query: default_results_per_query(),
            max_page_chars: default_max_page_chars(),
            report_type: ReportType::default(),
            choose_agent_role: false,
            io_timeout_seconds: default_io_timeout(),
        }
    }
}

impl AssistantConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, AskflowError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| AskflowError::config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), AskflowError> {
        if self.model.trim().is_empty() {
            return Err(AskflowError::config("model must not be empty"));
        }
        for (name, value) in [
            ("searchQueryCount", self.search_query_count),
            ("resultsPerQuery", self.results_per_query),
            ("maxPageChars", self.max_page_chars),
        ] {
            if value == 0 {
                return Err(AskflowError::config(format!("{name} must be at least 1")));
            }
        }
        if let Some(seconds) = self.io_timeout_seconds {
            if !seconds.is_finite() || seconds <= 0.0 || seconds > MAX_IO_TIMEOUT_SECONDS {
                return Err(AskflowError::config(format!(
                    "ioTimeoutSeconds must be a positive number of at most {MAX_IO_TIMEOUT_SECONDS}, got {seconds}"
                )));
            }
        }
        Ok(())
    }

    /// Returns the per-call timeout.
    ///
    /// Values [`validate`](Self::validate) would reject yield no timeout.
    #[must_use]
    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout_seconds
            .filter(|seconds| *seconds > 0.0 && *seconds <= MAX_IO_TIMEOUT_SECONDS)
            .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok())
    }

    /// Returns the research pipeline settings.
    #[must_use]
    pub const fn research(&self) -> ResearchConfig {
        ResearchConfig {
            search_query_count: self.search_query_count,
            results_per_query: self.results_per_query,
            max_page_chars: self.max_page_chars,
            report_type: self.report_type,
            choose_agent_role: self.choose_agent_role,
        }
    }

    /// Sets the model name.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the answer mode.
    #[must_use]
    pub fn with_answer_mode(mut self, mode: AnswerMode) -> Self {
        self.answer_mode = mode;
        self
    }

    /// Sets the number of search queries.
    #[must_use]
    pub fn with_search_query_count(mut self, count: usize) -> Self {
        self.search_query_count = count;
        self
    }

    /// Sets the number of schema sample rows.
    #[must_use]
    pub fn with_schema_sample_row_count(mut self, count: usize) -> Self {
        self.schema_sample_row_count = count;
        self
    }

    /// Sets the hits kept per query.
    #[must_use]
    pub fn with_results_per_query(mut self, count: usize) -> Self {
        self.results_per_query = count;
        self
    }

    /// Sets the page text limit.
    #[must_use]
    pub fn with_max_page_chars(mut self, chars: usize) -> Self {
        self.max_page_chars = chars;
        self
    }

    /// Sets the report type.
    #[must_use]
    pub fn with_report_type(mut self, report_type: ReportType) -> Self {
        self.report_type = report_type;
        self
    }

    /// Enables or disables persona selection.
    #[must_use]
    pub fn with_choose_agent_role(mut self, enabled: bool) -> Self {
        self.choose_agent_role = enabled;
        self
    }

    /// Sets the per-call timeout in seconds.
    #[must_use]
    pub fn with_io_timeout(mut self, seconds: Option<f64>) -> Self {
        self.io_timeout_seconds = seconds;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_from_empty_json() {
        let config = AssistantConfig::from_json_str("{}").unwrap();
        assert_eq!(config, AssistantConfig::default());
        assert_eq!(config.answer_mode, AnswerMode::Both);
        assert_eq!(config.model, "llama2");
        assert_eq!(config.io_timeout(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_camel_case_fields() {
        let config = AssistantConfig::from_json_str(
            r#"{"model": "mistral", "answerMode": "sql-only", "searchQueryCount": 5,
                "schemaSampleRowCount": 2, "reportType": "outline", "ioTimeoutSeconds": null}"#,
        )
        .unwrap();
        assert_eq!(config.model, "mistral");
        assert_eq!(config.answer_mode, AnswerMode::SqlOnly);
        assert_eq!(config.search_query_count, 5);
        assert_eq!(config.schema_sample_row_count, 2);
        assert_eq!(config.report_type, ReportType::Outline);
        assert_eq!(config.io_timeout(), None);
    }

    #[test]
    fn test_validation() {
        let err = AssistantConfig::from_json_str(r#"{"searchQueryCount": 0}"#).unwrap_err();
        assert_eq!(err.kind(), "config");
        assert!(err.to_string().contains("searchQueryCount"));

        assert!(AssistantConfig::default().with_io_timeout(Some(0.0)).validate().is_err());
        assert!(AssistantConfig::default().with_max_page_chars(0).validate().is_err());
        assert!(AssistantConfig::default().with_model(" ").validate().is_err());
        assert!(AssistantConfig::from_json_str(r#"{"answerMode": "everything"}"#).is_err());
    }

    #[test]
    fn test_io_timeout_upper_bound() {
        let err =
            AssistantConfig::from_json_str(r#"{"answerMode": "sql-only", "ioTimeoutSeconds": 1e30}"#).unwrap_err();
        assert_eq!(err.kind(), "config");
        assert!(err.to_string().contains("ioTimeoutSeconds"));

        let config = AssistantConfig::default().with_io_timeout(Some(MAX_IO_TIMEOUT_SECONDS));
        assert!(config.validate().is_ok());
        assert_eq!(config.io_timeout(), Some(Duration::from_secs(86_400)));

        let unchecked = AssistantConfig::default().with_io_timeout(Some(1e30));
        assert_eq!(unchecked.io_timeout(), None);
    }

    #[test]
    fn test_answer_mode() {
        assert!(AnswerMode::Both.runs_sql() && AnswerMode::Both.runs_web());
        assert!(!AnswerMode::SqlOnly.runs_web());
        assert!(!AnswerMode::WebOnly.runs_sql());
        assert_eq!(serde_json::to_string(&AnswerMode::WebOnly).unwrap(), r#""web-only""#);
        assert_eq!(AnswerMode::SqlOnly.to_string(), "sql-only");
    }

    #[test]
    fn test_research_settings() {
        let research = AssistantConfig::default().with_results_per_query(7).with_choose_agent_role(true).research();
        assert_eq!(research.results_per_query, 7);
        assert!(research.choose_agent_role);
        assert_eq!(research.max_page_chars, 10_000);
    }
}
