//! # Askflow
//!
//! Pipeline orchestration for an assistant that answers questions from a
//! SQL database, from the web, or both.
//!
//! A question flows through one of two sub-pipelines:
//!
//! - **SQL**: fetch the schema, generate a query, run it, and turn the rows
//!   into a natural language answer. Turns are remembered per session so
//!   follow-up questions work.
//! - **Research**: generate search queries, search, scrape and summarize each
//!   hit concurrently, then write a report from the summaries.
//!
//! In `both` mode the two run concurrently and their results are merged; if
//! one fails the other's answer is still returned with a note.
//!
//! Pipelines are built from [`stages::Stage`]s whose declared inputs and
//! outputs are checked before anything runs. Model, database, search and
//! fetch access go through the traits in [`providers`], so every
//! collaborator can be swapped for the doubles in [`testing`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use askflow::prelude::*;
//!
//! let assistant = Assistant::builder(AssistantConfig::default())
//!     .with_ollama(None)
//!     .with_web()?
//!     .with_sqlite("sqlite://nba_roster.db")
//!     .await?
//!     .build()?;
//!
//! let answer = assistant.ask("Who is older? Point guards or Centers?").await?;
//! println!("{}", answer.answer);
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, missing_docs, rust_2018_idioms)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod assistant;
pub mod cancellation;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod prompts;
pub mod providers;
pub mod research;
pub mod sql;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::assistant::{Answer, AnswerMode, Assistant, AssistantConfig, SessionPool, StreamItem};
    pub use crate::cancellation::CancellationToken;
    pub use crate::context::{Context, FieldKind, RunIdentity, RunOptions, StageContext};
    pub use crate::core::{StageKind, StageOutput, StageStatus};
    pub use crate::errors::{AskflowError, PipelineValidationError, StageError, ValidationError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent};
    pub use crate::pipeline::{compose, merge, Pipeline, PipelineBuilder, SubPipelineStage};
    pub use crate::prompts::{ChatPrompt, Message, PromptTemplate, ReportType, Role};
    pub use crate::providers::{PageFetcher, QueryExecutor, SchemaProvider, SearchHit, SearchProvider, TextGenerator};
    pub use crate::stages::{Stage, StageContract};
}
