//! Web research.
//!
//! The pipeline runs `[choose_agent →] generate_search_queries → search →
//! scrape → summarize → synthesize_report` and returns `report`. Search,
//! scrape and summarize fan out over their items; a failed item is dropped
//! and reported as a `fanout.item_dropped` event instead of failing the run.

mod parse;
mod stages;

pub use parse::{parse_agent_role, parse_query_list, AgentRole};
pub use stages::{
    render_research_summary, ChooseAgentStage, GenerateSearchQueriesStage, ScrapeStage, SearchResult, SearchStage,
    SummarizeStage, SynthesizeReportStage,
};

use crate::context::FieldKind;
use crate::errors::PipelineValidationError;
use crate::pipeline::{Pipeline, PipelineBuilder};
use crate::prompts::ReportType;
use crate::providers::{PageFetcher, SearchProvider, TextGenerator};
use crate::stages::Stage;
use std::sync::Arc;

/// Name of the research pipeline, as it appears in events and errors.
pub const RESEARCH_PIPELINE: &str = "web_research";

/// Knobs for the research pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResearchConfig {
    /// How many search queries to ask for.
    pub search_query_count: usize,
    /// Hits kept per query.
    pub results_per_query: usize,
    /// Characters of page text kept per source.
    pub max_page_chars: usize,
    /// Shape of the final report.
    pub report_type: ReportType,
    /// Whether to pick a research persona first.
    pub choose_agent_role: bool,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            search_query_count: 3,
            results_per_query: 3,
            max_page_chars: 10_000,
            report_type: ReportType::default(),
            choose_agent_role: false,
        }
    }
}

/// Builds the web research pipeline.
///
/// Input: `question` (string). Output: `report`.
pub fn build_research_pipeline(
    generator: Arc<dyn TextGenerator>,
    search: Arc<dyn SearchProvider>,
    fetcher: Arc<dyn PageFetcher>,
    config: ResearchConfig,
) -> Result<Pipeline, PipelineValidationError> {
    let mut stages: Vec<Arc<dyn Stage>> = Vec::with_capacity(6);
    let mut queries = GenerateSearchQueriesStage::new(generator.clone(), config.search_query_count);
    if config.choose_agent_role {
        stages.push(Arc::new(ChooseAgentStage::new(generator.clone())));
        queries = queries.with_agent_prompt();
    }
    stages.push(Arc::new(queries));
    stages.push(Arc::new(SearchStage::new(search, config.results_per_query)));
    stages.push(Arc::new(ScrapeStage::new(fetcher, config.max_page_chars)));
    stages.push(Arc::new(SummarizeStage::new(generator.clone())));
    stages.push(Arc::new(SynthesizeReportStage::new(generator, config.report_type)));

    PipelineBuilder::new(RESEARCH_PIPELINE)
        .input("question", FieldKind::String)
        .stages(stages)
        .output_field("report")
        .build()
}
