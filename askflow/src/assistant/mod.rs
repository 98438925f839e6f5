//! The question answering assistant.
//!
//! An [`Assistant`] owns one conversation. It routes each question through
//! the SQL pipeline, the research pipeline or both (see [`AnswerMode`]) and
//! merges the results into an [`Answer`]. Questions on one assistant are
//! answered one at a time so the conversation memory stays ordered.
//!
//! ```no_run
//! use askflow::assistant::{Assistant, AssistantConfig};
//!
//! # async fn demo() -> Result<(), askflow::errors::AskflowError> {
//! let assistant = Assistant::builder(AssistantConfig::default())
//!     .with_ollama(None)
//!     .with_web()?
//!     .with_sqlite("sqlite://nba_roster.db")
//!     .await?
//!     .build()?;
//!
//! let answer = assistant.ask("Who is older? Point guards or Centers?").await?;
//! println!("{}", answer.answer);
//! # Ok(())
//! # }
//! ```

mod answer;
mod builder;
mod config;
mod pool;
mod stream;

pub use answer::{format_report, format_sql_answer, merge_answers, Answer, FailureReport};
pub use builder::{AssistantBuilder, FINAL_ANSWER};
pub use config::{AnswerMode, AssistantConfig, MAX_IO_TIMEOUT_SECONDS};
pub use pool::SessionPool;
pub use stream::StreamItem;

use stream::ChannelEventSink;

use crate::context::{Context, RunIdentity, RunOptions};
use crate::errors::{AskflowError, ValidationError};
use crate::events::{EventSink, FanoutEventSink};
use crate::pipeline::Pipeline;
use crate::sql::{ConversationMemory, SqlSession};
use futures::channel::mpsc;
use futures::future::ready;
use futures::stream::{once, select, BoxStream, StreamExt};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Name of the top-level pipeline.
pub const ASSISTANT_PIPELINE: &str = "askflow";

/// Answers questions for one conversation.
pub struct Assistant {
    config: AssistantConfig,
    id: String,
    pipeline: Pipeline,
    session: Option<Arc<SqlSession>>,
    turn_lock: Mutex<()>,
    events: Arc<dyn EventSink>,
}

impl Assistant {
    /// Starts building an assistant.
    #[must_use]
    pub fn builder(config: AssistantConfig) -> AssistantBuilder {
        AssistantBuilder::new(config)
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &AssistantConfig {
        &self.config
    }

    /// Returns the session id.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.id
    }

    /// Returns the top-level pipeline.
    #[must_use]
    pub const fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Returns the conversation memory, when the SQL pipeline runs.
    #[must_use]
    pub fn memory(&self) -> Option<&ConversationMemory> {
        self.session.as_deref().map(SqlSession::memory)
    }

    /// Returns run options carrying the configured timeout, the session id
    /// and the assistant's event sink.
    #[must_use]
    pub fn run_options(&self) -> RunOptions {
        RunOptions::new()
            .with_identity(RunIdentity::new().with_session_id(self.id.clone()))
            .with_io_timeout(self.config.io_timeout())
            .with_event_sink(self.events.clone())
    }

    /// Answers a question.
    pub async fn ask(&self, question: &str) -> Result<Answer, AskflowError> {
        self.ask_with(question, self.run_options()).await
    }

    /// Answers a question with caller-supplied run options.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty question, `Cancelled` if `run`'s token
    /// fires, otherwise the pipeline's error. A question that fails in one
    /// sub-pipeline while the other succeeds is not an error; see
    /// [`Answer::failures`].
    pub async fn ask_with(&self, question: &str, run: RunOptions) -> Result<Answer, AskflowError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ValidationError::for_field("question", "question must not be empty").into());
        }

        // A queued question still honours its own token.
        let _turn = tokio::select! {
            biased;
            () = run.cancellation().cancelled() => {
                debug!(run_id = %run.run_id(), session_id = %self.id, "Cancelled while waiting for the previous turn");
                return Err(run.cancelled_error());
            }
            guard = self.turn_lock.lock() => guard,
        };
        info!(
            run_id = %run.run_id(),
            session_id = %self.id,
            mode = %self.config.answer_mode,
            "Answering question"
        );

        let result = self
            .pipeline
            .invoke_output(Context::from_question(question), &run)
            .await
            .and_then(|value| Ok(serde_json::from_value::<Answer>(value)?));
        match &result {
            Ok(answer) if answer.is_partial() => {
                warn!(run_id = %run.run_id(), failures = answer.failures.len(), "Answered with partial results");
            }
            Ok(_) => info!(run_id = %run.run_id(), "Answered question"),
            Err(err) => warn!(run_id = %run.run_id(), error = %err, "Question failed"),
        }
        result
    }

    /// Answers a question, yielding stage updates as they happen.
    ///
    /// The stream ends with exactly one [`StreamItem::Finished`]. Dropping
    /// the stream cancels the run.
    pub fn stream<'a>(&'a self, question: &'a str) -> BoxStream<'a, StreamItem> {
        self.stream_with(question, self.run_options())
    }

    /// Like [`Assistant::stream`], with caller-supplied run options.
    pub fn stream_with<'a>(&'a self, question: &'a str, run: RunOptions) -> BoxStream<'a, StreamItem> {
        let (tx, rx) = mpsc::unbounded();
        let sinks: Vec<Arc<dyn EventSink>> = vec![run.events().clone(), Arc::new(ChannelEventSink::new(tx.clone()))];
        let run = run.with_event_sink(Arc::new(FanoutEventSink::new(sinks)));

        let driver = async move {
            let result = self.ask_with(question, run).await;
            let _ = tx.unbounded_send(StreamItem::Finished(result));
        };

        // The channel closes once the driver and its run options are gone,
        // so `Finished` is always the last item.
        select(rx, once(driver).filter_map(|()| ready(None::<StreamItem>))).boxed()
    }
}

impl fmt::Debug for Assistant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assistant")
            .field("id", &self.id)
            .field("mode", &self.config.answer_mode)
            .field("pipeline", &self.pipeline.name())
            .finish_non_exhaustive()
    }
}
