//! SQL question answering.
//!
//! The pipeline runs `fetch_schema → generate_sql → execute_sql →
//! synthesize_answer → record_turn` and returns `answer`. Schema cache and
//! conversation memory live in a [`SqlSession`], so one session is one
//! conversation.

mod memory;
mod session;
mod stages;

pub use memory::{ConversationMemory, Turn};
pub use session::SqlSession;
pub use stages::{
    truncate_sql, ExecuteSqlStage, FetchSchemaStage, GenerateSqlStage, RecordTurnStage, SynthesizeAnswerStage,
};

use crate::context::FieldKind;
use crate::errors::PipelineValidationError;
use crate::pipeline::{Pipeline, PipelineBuilder};
use crate::providers::{QueryExecutor, TextGenerator};
use std::sync::Arc;

/// Name of the SQL pipeline, as it appears in events and errors.
pub const SQL_PIPELINE: &str = "sql_qa";

/// Builds the SQL question answering pipeline.
///
/// Input: `question` (string). Output: `answer`.
pub fn build_sql_pipeline(
    generator: Arc<dyn TextGenerator>,
    executor: Arc<dyn QueryExecutor>,
    session: Arc<SqlSession>,
) -> Result<Pipeline, PipelineValidationError> {
    PipelineBuilder::new(SQL_PIPELINE)
        .input("question", FieldKind::String)
        .stage(Arc::new(FetchSchemaStage::new(session.clone())))
        .stage(Arc::new(GenerateSqlStage::new(generator.clone(), session.clone())))
        .stage(Arc::new(ExecuteSqlStage::new(executor)))
        .stage(Arc::new(SynthesizeAnswerStage::new(generator)))
        .stage(Arc::new(RecordTurnStage::new(session)))
        .output_field("answer")
        .build()
}
