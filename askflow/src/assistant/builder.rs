//! Assembling an [`Assistant`] from its collaborators.

use super::answer::{merge_answers, sql_only_answer, web_only_answer, Answer};
use super::{Assistant, AssistantConfig, ASSISTANT_PIPELINE};
use crate::context::{Context, FieldKind, StageContext};
use crate::core::StageOutput;
use crate::errors::AskflowError;
use crate::events::{EventSink, LoggingEventSink};
use crate::pipeline::{merge, Pipeline, PipelineBuilder, SubPipelineStage};
use crate::providers::{PageFetcher, QueryExecutor, SchemaProvider, SearchProvider, TextGenerator};
use crate::research::build_research_pipeline;
use crate::sql::{build_sql_pipeline, SqlSession};
use crate::stages::{FnStage, StageContract};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// The field holding the serialized [`Answer`].
pub const FINAL_ANSWER: &str = "final_answer";

/// Builder for [`Assistant`].
///
/// Only the collaborators the configured [`AnswerMode`](super::AnswerMode) needs are required.
#[derive(Default)]
pub struct AssistantBuilder {
    config: AssistantConfig,
    generator: Option<Arc<dyn TextGenerator>>,
    schema: Option<Arc<dyn SchemaProvider>>,
    executor: Option<Arc<dyn QueryExecutor>>,
    search: Option<Arc<dyn SearchProvider>>,
    fetcher: Option<Arc<dyn PageFetcher>>,
    events: Option<Arc<dyn EventSink>>,
    session_id: Option<String>,
}

impl AssistantBuilder {
    /// Creates a builder for `config`.
    #[must_use]
    pub fn new(config: AssistantConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Sets the text generator.
    #[must_use]
    pub fn generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Sets the schema provider.
    #[must_use]
    pub fn schema_provider(mut self, schema: Arc<dyn SchemaProvider>) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Sets the query executor.
    #[must_use]
    pub fn executor(mut self, executor: Arc<dyn QueryExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Uses one value as both schema provider and query executor.
    #[must_use]
    pub fn database<D>(self, database: Arc<D>) -> Self
    where
        D: SchemaProvider + QueryExecutor + 'static,
    {
        self.schema_provider(database.clone()).executor(database)
    }

    /// Sets the search provider.
    #[must_use]
    pub fn search(mut self, search: Arc<dyn SearchProvider>) -> Self {
        self.search = Some(search);
        self
    }

    /// Sets the page fetcher.
    #[must_use]
    pub fn fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Sets the sink receiving every run's events. Defaults to logging.
    #[must_use]
    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Sets the session id. Defaults to a random UUID.
    #[must_use]
    pub fn session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    /// Uses a local Ollama server for generation with the configured model.
    #[cfg(feature = "http")]
    #[must_use]
    pub fn with_ollama(self, base_url: Option<&str>) -> Self {
        let mut client = crate::providers::OllamaChatClient::new(self.config.model.clone());
        if let Some(url) = base_url {
            client = client.with_base_url(url);
        }
        self.generator(Arc::new(client))
    }

    /// Uses DuckDuckGo search and plain HTTP fetching.
    #[cfg(feature = "http")]
    pub fn with_web(self) -> Result<Self, AskflowError> {
        let search = crate::providers::DuckDuckGoSearch::new()?;
        let fetcher = crate::providers::HttpFetcher::new()?;
        Ok(self.search(Arc::new(search)).fetcher(Arc::new(fetcher)))
    }

    /// Opens a SQLite database as schema provider and executor.
    #[cfg(feature = "sqlite")]
    pub async fn with_sqlite(self, url: &str) -> Result<Self, AskflowError> {
        let database = crate::providers::SqliteDatabase::connect(url)
            .await?
            .with_sample_rows(self.config.schema_sample_row_count);
        Ok(self.database(Arc::new(database)))
    }

    /// Validates the configuration and builds the pipelines.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the configuration is invalid or a collaborator
    /// required by the answer mode is missing.
    pub fn build(self) -> Result<Assistant, AskflowError> {
        self.config.validate()?;
        let mode = self.config.answer_mode;
        let generator = require(self.generator, "a text generator")?;
        let id = self.session_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut session = None;
        let sql = if mode.runs_sql() {
            let schema = require(self.schema, "a schema provider")?;
            let executor = require(self.executor, "a query executor")?;
            let sql_session = Arc::new(SqlSession::with_id(id.clone(), schema));
            session = Some(sql_session.clone());
            Some(build_sql_pipeline(generator.clone(), executor, sql_session)?)
        } else {
            None
        };

        let web = if mode.runs_web() {
            let search = require(self.search, "a search provider")?;
            let fetcher = require(self.fetcher, "a page fetcher")?;
            Some(build_research_pipeline(generator, search, fetcher, self.config.research())?)
        } else {
            None
        };

        let pipeline = match (sql, web) {
            (Some(sql), Some(web)) => merge(ASSISTANT_PIPELINE, sql, web, FINAL_ANSWER, |sql, web| {
                to_value(&merge_answers(sql, web)?)
            })?,
            (Some(sql), None) => single(sql, "answer", sql_only_answer)?,
            (None, Some(web)) => single(web, "report", web_only_answer)?,
            (None, None) => return Err(AskflowError::config(format!("answer mode '{mode}' runs nothing"))),
        };

        Ok(Assistant {
            config: self.config,
            id,
            pipeline,
            session,
            turn_lock: Mutex::new(()),
            events: self.events.unwrap_or_else(|| Arc::new(LoggingEventSink::default())),
        })
    }
}

fn require<T: ?Sized>(value: Option<Arc<T>>, what: &str) -> Result<Arc<T>, AskflowError> {
    value.ok_or_else(|| AskflowError::config(format!("{what} is required for this answer mode")))
}

fn to_value(answer: &Answer) -> Result<serde_json::Value, AskflowError> {
    Ok(serde_json::to_value(answer)?)
}

/// Wraps one sub-pipeline and formats its result as an [`Answer`].
fn single(
    inner: Pipeline,
    field: &str,
    format: fn(&Context) -> Result<Answer, AskflowError>,
) -> Result<Pipeline, AskflowError> {
    let format_stage = FnStage::new(
        StageContract::new("format_answer", FINAL_ANSWER).with_inputs(["question", field]),
        move |ctx: &StageContext| StageOutput::from_result(format(ctx.data()).and_then(|a| to_value(&a))),
    );
    Ok(PipelineBuilder::new(ASSISTANT_PIPELINE)
        .input("question", FieldKind::String)
        .stage(Arc::new(SubPipelineStage::new(Arc::new(inner))))
        .stage(Arc::new(format_stage))
        .output_field(FINAL_ANSWER)
        .build()?)
}
