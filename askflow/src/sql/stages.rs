//! Stages of the SQL question answering pipeline.

use super::{SqlSession, Turn};
use crate::context::StageContext;
use crate::core::{StageKind, StageOutput};
use crate::errors::{AskflowError, ExecutionError};
use crate::prompts::library::{sql_answer_prompt, sql_query_prompt, SQL_STOP};
use crate::prompts::ChatPrompt;
use crate::providers::{QueryExecutor, TextGenerator};
use crate::stages::{contract_debug, Stage, StageContract};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Cuts a generated reply down to the SQL statement.
///
/// Everything from the first blank line on is dropped, then surrounding
/// whitespace is trimmed. Leading whitespace is trimmed first so a reply
/// opening with a blank line is not cut to nothing.
#[must_use]
pub fn truncate_sql(reply: &str) -> &str {
    let reply = reply.trim_start();
    let cut = reply.find("\n\n").map_or(reply, |end| &reply[..end]);
    cut.trim()
}

/// Loads the session's schema into `schema`.
pub struct FetchSchemaStage {
    contract: StageContract,
    session: Arc<SqlSession>,
}

impl FetchSchemaStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(session: Arc<SqlSession>) -> Self {
        Self {
            contract: StageContract::new("fetch_schema", "schema").with_kind(StageKind::Enrich),
            session,
        }
    }
}

#[async_trait]
impl Stage for FetchSchemaStage {
    fn contract(&self) -> &StageContract {
        &self.contract
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        let result = ctx.call("get_schema", self.session.schema()).await;
        StageOutput::from_result(result.map(Value::String))
    }
}

/// Asks the model for a SQL query answering `question` over `schema`.
///
/// Prior turns from the session memory are included so follow-up questions
/// can be resolved.
pub struct GenerateSqlStage {
    contract: StageContract,
    generator: Arc<dyn TextGenerator>,
    session: Arc<SqlSession>,
    prompt: ChatPrompt,
}

impl GenerateSqlStage {
    /// Creates the stage with the bundled prompt.
    #[must_use]
    pub fn new(generator: Arc<dyn TextGenerator>, session: Arc<SqlSession>) -> Self {
        Self {
            contract: StageContract::new("generate_sql", "query")
                .with_inputs(["question", "schema"])
                .with_kind(StageKind::Generate),
            generator,
            session,
            prompt: sql_query_prompt(),
        }
    }

    /// Replaces the prompt. It receives `schema` and `question`.
    #[must_use]
    pub fn with_prompt(mut self, prompt: ChatPrompt) -> Self {
        self.prompt = prompt;
        self
    }

    async fn run(&self, ctx: &StageContext) -> Result<Value, AskflowError> {
        let question = ctx.input_str("question")?;
        let schema = ctx.input_str("schema")?;
        let history = self.session.memory().as_messages();
        let messages = self
            .prompt
            .render(&[("schema", schema), ("question", question)], &history)?;

        let reply = ctx
            .call("generate_sql", self.generator.generate(&messages, &[SQL_STOP]))
            .await?;
        let query = truncate_sql(&reply);
        if query.is_empty() {
            return Err(AskflowError::generation("model returned an empty SQL query"));
        }
        debug!(model = %self.generator.model(), query = %query, "Generated SQL");
        Ok(Value::String(query.to_string()))
    }
}

#[async_trait]
impl Stage for GenerateSqlStage {
    fn contract(&self) -> &StageContract {
        &self.contract
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        StageOutput::from_result(self.run(ctx).await)
    }
}

/// Runs `query` and stores the rendered rows in `response`.
pub struct ExecuteSqlStage {
    contract: StageContract,
    executor: Arc<dyn QueryExecutor>,
}

impl ExecuteSqlStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            contract: StageContract::new("execute_sql", "response")
                .with_inputs(["query"])
                .with_kind(StageKind::Execute),
            executor,
        }
    }

    async fn run(&self, ctx: &StageContext) -> Result<Value, AskflowError> {
        let query = ctx.input_str("query")?;
        match ctx.call("execute_sql", self.executor.execute(query)).await {
            Ok(rows) => Ok(Value::String(rows)),
            Err(err @ (AskflowError::Execution(_) | AskflowError::Cancelled(_))) => Err(err),
            // Every other failure still has to name the query that was attempted.
            Err(err) => Err(ExecutionError::new(query, err.to_string()).into()),
        }
    }
}

#[async_trait]
impl Stage for ExecuteSqlStage {
    fn contract(&self) -> &StageContract {
        &self.contract
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        StageOutput::from_result(self.run(ctx).await)
    }
}

/// Turns the query result into a natural language `answer`.
pub struct SynthesizeAnswerStage {
    contract: StageContract,
    generator: Arc<dyn TextGenerator>,
    prompt: ChatPrompt,
}

impl SynthesizeAnswerStage {
    /// Creates the stage with the bundled prompt.
    #[must_use]
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            contract: StageContract::new("synthesize_answer", "answer")
                .with_inputs(["schema", "question", "query", "response"])
                .with_kind(StageKind::Generate),
            generator,
            prompt: sql_answer_prompt(),
        }
    }

    /// Replaces the prompt. It receives `schema`, `question`, `query` and `response`.
    #[must_use]
    pub fn with_prompt(mut self, prompt: ChatPrompt) -> Self {
        self.prompt = prompt;
        self
    }

    async fn run(&self, ctx: &StageContext) -> Result<Value, AskflowError> {
        let values = [
            ("schema", ctx.input_str("schema")?),
            ("question", ctx.input_str("question")?),
            ("query", ctx.input_str("query")?),
            ("response", ctx.input_str("response")?),
        ];
        let messages = self.prompt.render(&values, &[])?;
        let answer = ctx
            .call("synthesize_answer", self.generator.generate(&messages, &[]))
            .await?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(AskflowError::generation("model returned an empty answer"));
        }
        Ok(Value::String(answer.to_string()))
    }
}

#[async_trait]
impl Stage for SynthesizeAnswerStage {
    fn contract(&self) -> &StageContract {
        &self.contract
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        StageOutput::from_result(self.run(ctx).await)
    }
}

/// Appends the finished exchange to the session memory.
pub struct RecordTurnStage {
    contract: StageContract,
    session: Arc<SqlSession>,
}

impl RecordTurnStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(session: Arc<SqlSession>) -> Self {
        Self {
            contract: StageContract::new("record_turn", "turn")
                .with_inputs(["question", "answer", "query"])
                .with_kind(StageKind::Record),
            session,
        }
    }

    fn run(&self, ctx: &StageContext) -> Result<Value, AskflowError> {
        let turn = Turn::new(ctx.input_str("question")?, ctx.input_str("answer")?)
            .with_query(ctx.input_str("query")?);
        let value = serde_json::to_value(&turn)?;
        self.session.memory().record(turn);
        info!(
            session_id = %self.session.id(),
            turns = self.session.memory().len(),
            "Recorded conversation turn"
        );
        Ok(value)
    }
}

#[async_trait]
impl Stage for RecordTurnStage {
    fn contract(&self) -> &StageContract {
        &self.contract
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        StageOutput::from_result(self.run(ctx))
    }
}

contract_debug!(
    FetchSchemaStage,
    GenerateSqlStage,
    ExecuteSqlStage,
    SynthesizeAnswerStage,
    RecordTurnStage,
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::providers::MockQueryExecutor;
    use crate::testing::{ScriptedGenerator, StaticSchemaProvider};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn session() -> Arc<SqlSession> {
        Arc::new(SqlSession::new(Arc::new(StaticSchemaProvider::new("CREATE TABLE players (age INT)"))))
    }

    fn ctx(stage: &str, data: Context) -> StageContext {
        StageContext::detached(stage, data)
    }

    #[test]
    fn test_truncate_sql() {
        assert_eq!(truncate_sql("SELECT x;\n\nSQLResult: ..."), "SELECT x;");
        assert_eq!(truncate_sql("  SELECT a\nFROM t  "), "SELECT a\nFROM t");
        assert_eq!(truncate_sql("\n\nSELECT 1\n\nextra"), "SELECT 1");
        assert_eq!(truncate_sql("   \n  "), "");
    }

    #[tokio::test]
    async fn test_generate_sql_truncates_and_uses_stop() {
        let generator = Arc::new(ScriptedGenerator::new().otherwise("SELECT AVG(age) FROM players;\n\nSQLResult: 27"));
        let stage = GenerateSqlStage::new(generator.clone(), session());
        let data = Context::from_question("Average age?").with("schema", "CREATE TABLE players (age INT)").unwrap();

        let output = stage.execute(&ctx("generate_sql", data)).await;

        assert_eq!(output.value, Some(json!("SELECT AVG(age) FROM players;")));
        let prompt = &generator.prompts()[0];
        assert!(prompt.contains("Question: Average age?"));
        assert!(prompt.contains("CREATE TABLE players (age INT)"));
    }

    #[tokio::test]
    async fn test_generate_sql_empty_reply_fails() {
        let stage = GenerateSqlStage::new(Arc::new(ScriptedGenerator::new().otherwise("\n")), session());
        let data = Context::from_question("q").with("schema", "s").unwrap();

        let output = stage.execute(&ctx("generate_sql", data)).await;

        assert_eq!(output.error.map(|e| e.kind()), Some("generation"));
    }

    #[tokio::test]
    async fn test_generate_sql_includes_history() {
        let session = session();
        session.memory().record(Turn::new("Who is oldest?", "LeBron James."));
        let generator = Arc::new(ScriptedGenerator::new().otherwise("SELECT 1"));
        let stage = GenerateSqlStage::new(generator.clone(), session);
        let data = Context::from_question("How old is he?").with("schema", "s").unwrap();

        stage.execute(&ctx("generate_sql", data)).await;

        let messages = &generator.calls()[0];
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].content, "Who is oldest?");
        assert_eq!(messages[2].content, "LeBron James.");
    }

    #[tokio::test]
    async fn test_execute_passes_query_verbatim() {
        let mut executor = MockQueryExecutor::new();
        executor
            .expect_execute()
            .withf(|query| query == "SELECT COUNT(*) FROM players")
            .times(1)
            .returning(|_| Ok("[(3,)]".to_string()));
        let stage = ExecuteSqlStage::new(Arc::new(executor));
        let data = Context::new().with("query", "SELECT COUNT(*) FROM players").unwrap();

        let output = stage.execute(&ctx("execute_sql", data)).await;

        assert_eq!(output.value, Some(json!("[(3,)]")));
    }

    #[tokio::test]
    async fn test_execute_failure_carries_query() {
        let mut executor = MockQueryExecutor::new();
        executor
            .expect_execute()
            .times(1)
            .returning(|_| Err(AskflowError::Internal("driver crashed".to_string())));
        let stage = ExecuteSqlStage::new(Arc::new(executor));
        let data = Context::new().with("query", "SELECT broken").unwrap();

        let output = stage.execute(&ctx("execute_sql", data)).await;

        let err = output.error.unwrap();
        assert_eq!(err.kind(), "execution");
        assert_eq!(err.failed_query(), Some("SELECT broken"));
    }

    #[tokio::test]
    async fn test_synthesize_answer_prompt() {
        let generator = Arc::new(ScriptedGenerator::new().otherwise("  Centers are older.  "));
        let stage = SynthesizeAnswerStage::new(generator.clone());
        let data = Context::from_question("Who is older?")
            .with("schema", "S")
            .unwrap()
            .with("query", "SELECT 1")
            .unwrap()
            .with("response", "[(1,)]")
            .unwrap();

        let output = stage.execute(&ctx("synthesize_answer", data)).await;

        assert_eq!(output.value, Some(json!("Centers are older.")));
        assert!(generator.prompts()[0].contains("SQL Query: SELECT 1\nSQL Response: [(1,)]"));
    }

    #[tokio::test]
    async fn test_record_turn_appends_memory() {
        let session = session();
        let stage = RecordTurnStage::new(session.clone());
        let data = Context::from_question("q")
            .with("answer", "a")
            .unwrap()
            .with("query", "SELECT 1")
            .unwrap();

        let output = stage.execute(&ctx("record_turn", data)).await;

        assert!(output.is_success());
        assert_eq!(session.memory().len(), 1);
        assert_eq!(session.memory().turns()[0].query.as_deref(), Some("SELECT 1"));
    }
}
