//! The final answer and how sub-pipeline results are merged into it.

use crate::context::Context;
use crate::errors::AskflowError;
use crate::pipeline::Branch;
use crate::research::RESEARCH_PIPELINE;
use crate::sql::SQL_PIPELINE;
use serde::{Deserialize, Serialize};

/// Why one sub-pipeline contributed nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    /// The sub-pipeline that failed, e.g. `sql_qa`.
    pub sub_pipeline: String,
    /// The innermost stage that failed, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Error kind of the root cause, e.g. `execution`.
    pub kind: String,
    /// Full error message.
    pub message: String,
}

impl FailureReport {
    /// Describes `error` raised by `sub_pipeline`.
    #[must_use]
    pub fn from_error(sub_pipeline: impl Into<String>, error: &AskflowError) -> Self {
        Self {
            sub_pipeline: sub_pipeline.into(),
            stage: error.failed_stage().map(|(_, stage)| stage.to_string()),
            kind: error.root_cause().kind().to_string(),
            message: error.to_string(),
        }
    }

    /// The note appended to a partial answer.
    #[must_use]
    pub fn note(&self) -> String {
        format!("[{} unavailable: {}]", self.sub_pipeline, self.message)
    }
}

/// The response to one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    /// The formatted text shown to the user.
    pub answer: String,
    /// The SQL pipeline's natural language answer, if it ran and succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_answer: Option<String>,
    /// The research report, if it ran and succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    /// Sub-pipelines that failed while the other succeeded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FailureReport>,
}

impl Answer {
    /// Returns true if a sub-pipeline failed.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Formats the SQL block: `"Questions: {question}\n\nAnswer: {answer}"`.
#[must_use]
pub fn format_sql_answer(question: &str, answer: &str) -> String {
    format!("Questions: {question}\n\nAnswer: {answer}")
}

/// Formats the research block: `"Research Report:\n{report}"`.
#[must_use]
pub fn format_report(report: &str) -> String {
    format!("Research Report:\n{report}")
}

/// Builds the answer from a finished SQL run.
pub fn sql_only_answer(ctx: &Context) -> Result<Answer, AskflowError> {
    let answer = ctx.require_str("answer")?;
    Ok(Answer {
        answer: format_sql_answer(ctx.require_str("question")?, answer),
        sql_answer: Some(answer.to_string()),
        report: None,
        failures: Vec::new(),
    })
}

/// Builds the answer from a finished research run.
pub fn web_only_answer(ctx: &Context) -> Result<Answer, AskflowError> {
    let report = ctx.require_str("report")?;
    Ok(Answer {
        answer: report.to_string(),
        sql_answer: None,
        report: Some(report.to_string()),
        failures: Vec::new(),
    })
}

/// Combines both branches of the concurrent run.
///
/// With both present the SQL block comes first, then a blank line and the
/// report. With one present that block is kept and a failure note for the
/// other is appended.
pub fn merge_answers(sql: Branch<'_>, web: Branch<'_>) -> Result<Answer, AskflowError> {
    let mut blocks = Vec::with_capacity(2);
    let mut failures = Vec::new();
    let mut sql_answer = None;
    let mut report = None;

    match sql {
        Ok(ctx) => {
            let answer = ctx.require_str("answer")?;
            blocks.push(format_sql_answer(ctx.require_str("question")?, answer));
            sql_answer = Some(answer.to_string());
        }
        Err(err) => failures.push(FailureReport::from_error(SQL_PIPELINE, err)),
    }
    match web {
        Ok(ctx) => {
            let text = ctx.require_str("report")?;
            blocks.push(format_report(text));
            report = Some(text.to_string());
        }
        Err(err) => failures.push(FailureReport::from_error(RESEARCH_PIPELINE, err)),
    }

    if blocks.is_empty() {
        return Err(AskflowError::Internal("merge called with no successful branch".to_string()));
    }
    blocks.extend(failures.iter().map(FailureReport::note));

    Ok(Answer {
        answer: blocks.join("\n\n"),
        sql_answer,
        report,
        failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ExecutionError, StageError};
    use pretty_assertions::assert_eq;

    fn sql_ctx() -> Context {
        Context::from_question("Who is older?").with("answer", "Centers.").unwrap()
    }

    fn web_ctx() -> Context {
        Context::from_question("Who is older?").with("report", "# Ages").unwrap()
    }

    #[test]
    fn test_both_blocks() {
        let (sql, web) = (sql_ctx(), web_ctx());
        let answer = merge_answers(Ok(&sql), Ok(&web)).unwrap();
        assert_eq!(
            answer.answer,
            "Questions: Who is older?\n\nAnswer: Centers.\n\nResearch Report:\n# Ages"
        );
        assert_eq!(answer.sql_answer.as_deref(), Some("Centers."));
        assert_eq!(answer.report.as_deref(), Some("# Ages"));
        assert!(!answer.is_partial());
    }

    #[test]
    fn test_web_failure_appends_note() {
        let sql = sql_ctx();
        let err = AskflowError::from(StageError::new(
            "web_research",
            "synthesize_report",
            AskflowError::generation("no web sources survived scraping and summarizing"),
        ));
        let answer = merge_answers(Ok(&sql), Err(&err)).unwrap();

        assert_eq!(
            answer.answer,
            "Questions: Who is older?\n\nAnswer: Centers.\n\n[web_research unavailable: web_research/synthesize_report failed: Generation error: no web sources survived scraping and summarizing]"
        );
        assert_eq!(answer.failures[0].stage.as_deref(), Some("synthesize_report"));
        assert_eq!(answer.failures[0].kind, "generation");
    }

    #[test]
    fn test_sql_failure_keeps_report() {
        let web = web_ctx();
        let err = AskflowError::from(StageError::new(
            "sql_qa",
            "execute_sql",
            ExecutionError::new("SELECT x", "no such column: x").into(),
        ));
        let answer = merge_answers(Err(&err), Ok(&web)).unwrap();

        assert!(answer.answer.starts_with("Research Report:\n# Ages\n\n[sql_qa unavailable: "));
        assert!(answer.answer.contains("(query: SELECT x)"));
        assert_eq!(answer.sql_answer, None);
    }

    #[test]
    fn test_single_mode_answers() {
        let answer = sql_only_answer(&sql_ctx()).unwrap();
        assert_eq!(answer.answer, "Questions: Who is older?\n\nAnswer: Centers.");

        let answer = web_only_answer(&web_ctx()).unwrap();
        assert_eq!(answer.answer, "# Ages");
        assert_eq!(answer.report.as_deref(), Some("# Ages"));
    }

    #[test]
    fn test_answer_json_omits_empty_parts() {
        let value = serde_json::to_value(web_only_answer(&web_ctx()).unwrap()).unwrap();
        assert_eq!(value, serde_json::json!({"answer": "# Ages", "report": "# Ages"}));
    }
}
