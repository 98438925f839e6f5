//! Stages of the web research pipeline.

use super::parse::{parse_agent_role, parse_query_list};
use crate::context::StageContext;
use crate::core::{StageKind, StageOutput};
use crate::errors::AskflowError;
use crate::prompts::library::{
    choose_agent_prompt, report_prompt, search_queries_prompt, summary_prompt, ReportType, DEFAULT_AGENT_ROLE,
};
use crate::providers::{extract_text, truncate_chars, PageFetcher, SearchProvider, TextGenerator};
use crate::stages::{contract_debug, Stage, StageContract};
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One web source moving through the research stages.
///
/// Search fills `url`, scraping fills `raw_content` and summarizing fills
/// `summary`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Page URL.
    pub url: String,
    /// Visible page text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_content: Option<String>,
    /// Summary of the page with respect to the question.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl SearchResult {
    /// Creates a result with only a URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            raw_content: None,
            summary: None,
        }
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, AskflowError> {
    Ok(serde_json::to_value(value)?)
}

/// Picks a research persona for the question and writes its role prompt to
/// `agent_prompt`. Unparseable replies fall back to the default role.
pub struct ChooseAgentStage {
    contract: StageContract,
    generator: Arc<dyn TextGenerator>,
}

impl ChooseAgentStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            contract: StageContract::new("choose_agent", "agent_prompt")
                .with_inputs(["question"])
                .with_kind(StageKind::Generate),
            generator,
        }
    }

    async fn run(&self, ctx: &StageContext) -> Result<Value, AskflowError> {
        let question = ctx.input_str("question")?;
        let messages = choose_agent_prompt().render(&[("question", question)], &[])?;
        let reply = ctx
            .call("choose_agent", self.generator.generate(&messages, &[]))
            .await?;

        let prompt = match parse_agent_role(&reply) {
            Some(role) => {
                info!(agent = %role.server, "Chose research agent");
                role.agent_role_prompt
            }
            None => {
                warn!("Could not parse agent choice, using default role");
                DEFAULT_AGENT_ROLE.to_string()
            }
        };
        Ok(Value::String(prompt))
    }
}

#[async_trait]
impl Stage for ChooseAgentStage {
    fn contract(&self) -> &StageContract {
        &self.contract
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        StageOutput::from_result(self.run(ctx).await)
    }
}

/// Asks the model for search queries and writes them to `search_queries`.
pub struct GenerateSearchQueriesStage {
    contract: StageContract,
    generator: Arc<dyn TextGenerator>,
    count: usize,
}

impl GenerateSearchQueriesStage {
    /// Creates the stage asking for `count` queries.
    #[must_use]
    pub fn new(generator: Arc<dyn TextGenerator>, count: usize) -> Self {
        Self {
            contract: StageContract::new("generate_search_queries", "search_queries")
                .with_inputs(["question"])
                .with_kind(StageKind::Generate),
            generator,
            count,
        }
    }

    /// Reads the system prompt from `agent_prompt` instead of using the
    /// default role.
    #[must_use]
    pub fn with_agent_prompt(mut self) -> Self {
        self.contract.inputs.push("agent_prompt".to_string());
        self
    }

    async fn run(&self, ctx: &StageContext) -> Result<Value, AskflowError> {
        let question = ctx.input_str("question")?;
        let agent_prompt = match ctx.data().get_str("agent_prompt") {
            Some(prompt) => prompt,
            None => DEFAULT_AGENT_ROLE,
        };
        let count = self.count.to_string();
        let messages = search_queries_prompt().render(
            &[("agent_prompt", agent_prompt), ("count", &count), ("question", question)],
            &[],
        )?;

        let reply = ctx
            .call("generate_search_queries", self.generator.generate(&messages, &[]))
            .await?;
        let queries = parse_query_list(&reply, self.count);
        if queries.is_empty() {
            return Err(AskflowError::generation("model returned no search queries"));
        }
        debug!(queries = ?queries, "Generated search queries");
        to_value(&queries)
    }
}

#[async_trait]
impl Stage for GenerateSearchQueriesStage {
    fn contract(&self) -> &StageContract {
        &self.contract
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        StageOutput::from_result(self.run(ctx).await)
    }
}

/// Runs every query concurrently and writes unique hits to `search_results`.
///
/// A failed query is dropped. The stage fails only if every query fails.
pub struct SearchStage {
    contract: StageContract,
    search: Arc<dyn SearchProvider>,
    results_per_query: usize,
}

impl SearchStage {
    /// Creates the stage keeping at most `results_per_query` hits per query.
    #[must_use]
    pub fn new(search: Arc<dyn SearchProvider>, results_per_query: usize) -> Self {
        Self {
            contract: StageContract::new("search", "search_results")
                .with_inputs(["search_queries"])
                .with_kind(StageKind::Retrieve),
            search,
            results_per_query,
        }
    }

    async fn run(&self, ctx: &StageContext) -> Result<(Value, usize), AskflowError> {
        let queries: Vec<String> = ctx.input_as("search_queries")?;
        let outcomes = join_all(queries.iter().map(|query| {
            ctx.call("search", self.search.search(query, self.results_per_query))
        }))
        .await;

        let mut seen = HashSet::new();
        let mut results = Vec::new();
        let mut failures = Vec::new();
        for (query, outcome) in queries.iter().zip(outcomes) {
            match outcome {
                Ok(hits) => {
                    for hit in hits.into_iter().take(self.results_per_query) {
                        if seen.insert(hit.url.clone()) {
                            results.push(SearchResult::new(hit.url));
                        }
                    }
                }
                Err(err) => {
                    ctx.report_dropped(query, &err);
                    failures.push(err);
                }
            }
        }

        let dropped = failures.len();
        if dropped == queries.len() {
            if let Some(first) = failures.into_iter().next() {
                return Err(first);
            }
        }
        info!(queries = queries.len(), results = results.len(), dropped, "Search finished");
        Ok((to_value(&results)?, dropped))
    }
}

#[async_trait]
impl Stage for SearchStage {
    fn contract(&self) -> &StageContract {
        &self.contract
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        match self.run(ctx).await {
            Ok((value, dropped)) => StageOutput::ok(value).with_metadata("dropped", dropped),
            Err(err) => StageOutput::fail(err),
        }
    }
}

/// Fetches every result concurrently and writes those with text to `scraped`.
pub struct ScrapeStage {
    contract: StageContract,
    fetcher: Arc<dyn PageFetcher>,
    max_chars: usize,
}

impl ScrapeStage {
    /// Creates the stage keeping at most `max_chars` characters per page.
    #[must_use]
    pub fn new(fetcher: Arc<dyn PageFetcher>, max_chars: usize) -> Self {
        Self {
            contract: StageContract::new("scrape", "scraped")
                .with_inputs(["search_results"])
                .with_kind(StageKind::Retrieve),
            fetcher,
            max_chars,
        }
    }

    async fn scrape(&self, ctx: &StageContext, result: SearchResult) -> Result<SearchResult, AskflowError> {
        let html = ctx.call("fetch", self.fetcher.fetch(&result.url)).await?;
        let text = extract_text(&html);
        if text.is_empty() {
            return Err(crate::errors::FetchError::new(&result.url, "page has no visible text").into());
        }
        Ok(SearchResult {
            raw_content: Some(truncate_chars(&text, self.max_chars)),
            ..result
        })
    }
}

#[async_trait]
impl Stage for ScrapeStage {
    fn contract(&self) -> &StageContract {
        &self.contract
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        let results: Vec<SearchResult> = match ctx.input_as("search_results") {
            Ok(results) => results,
            Err(err) => return StageOutput::fail(err),
        };
        let urls: Vec<String> = results.iter().map(|r| r.url.clone()).collect();
        let outcomes = join_all(results.into_iter().map(|r| self.scrape(ctx, r))).await;

        let (scraped, dropped) = keep_successes(ctx, &urls, outcomes);
        info!(scraped = scraped.len(), dropped, "Scrape finished");
        match to_value(&scraped) {
            Ok(value) => StageOutput::ok(value).with_metadata("dropped", dropped),
            Err(err) => StageOutput::fail(err),
        }
    }
}

/// Summarizes every scraped page concurrently into `summaries`.
pub struct SummarizeStage {
    contract: StageContract,
    generator: Arc<dyn TextGenerator>,
}

impl SummarizeStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            contract: StageContract::new("summarize", "summaries")
                .with_inputs(["question", "scraped"])
                .with_kind(StageKind::Generate),
            generator,
        }
    }

    async fn summarize(&self, ctx: &StageContext, question: &str, result: SearchResult) -> Result<SearchResult, AskflowError> {
        let text = result.raw_content.as_deref().unwrap_or_default();
        let messages = summary_prompt().render(&[("text", text), ("question", question)], &[])?;
        let summary = ctx.call("summarize", self.generator.generate(&messages, &[])).await?;
        let summary = summary.trim();
        if summary.is_empty() {
            return Err(AskflowError::generation(format!("empty summary for {}", result.url)));
        }
        Ok(SearchResult {
            summary: Some(summary.to_string()),
            ..result
        })
    }
}

#[async_trait]
impl Stage for SummarizeStage {
    fn contract(&self) -> &StageContract {
        &self.contract
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        let (question, results) = match (ctx.input_str("question"), ctx.input_as::<Vec<SearchResult>>("scraped")) {
            (Ok(question), Ok(results)) => (question, results),
            (Err(err), _) | (_, Err(err)) => return StageOutput::fail(err),
        };
        let urls: Vec<String> = results.iter().map(|r| r.url.clone()).collect();
        let outcomes = join_all(results.into_iter().map(|r| self.summarize(ctx, question, r))).await;

        let (summaries, dropped) = keep_successes(ctx, &urls, outcomes);
        info!(summaries = summaries.len(), dropped, "Summaries finished");
        match to_value(&summaries) {
            Ok(value) => StageOutput::ok(value).with_metadata("dropped", dropped),
            Err(err) => StageOutput::fail(err),
        }
    }
}

fn keep_successes(
    ctx: &StageContext,
    items: &[String],
    outcomes: Vec<Result<SearchResult, AskflowError>>,
) -> (Vec<SearchResult>, usize) {
    let mut kept = Vec::with_capacity(outcomes.len());
    let mut dropped = 0;
    for (item, outcome) in items.iter().zip(outcomes) {
        match outcome {
            Ok(result) => kept.push(result),
            Err(err) => {
                ctx.report_dropped(item, &err);
                dropped += 1;
            }
        }
    }
    (kept, dropped)
}

/// Renders summaries as the `research_summary` prompt block.
#[must_use]
pub fn render_research_summary(results: &[SearchResult]) -> String {
    results
        .iter()
        .filter_map(|r| {
            r.summary
                .as_deref()
                .map(|summary| format!("Source Url: {}\nSummary: {summary}", r.url))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Writes the final `report` from the question and all summaries.
pub struct SynthesizeReportStage {
    contract: StageContract,
    generator: Arc<dyn TextGenerator>,
    report_type: ReportType,
}

impl SynthesizeReportStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(generator: Arc<dyn TextGenerator>, report_type: ReportType) -> Self {
        Self {
            contract: StageContract::new("synthesize_report", "report")
                .with_inputs(["question", "summaries"])
                .with_kind(StageKind::Generate),
            generator,
            report_type,
        }
    }

    async fn run(&self, ctx: &StageContext) -> Result<Value, AskflowError> {
        let question = ctx.input_str("question")?;
        let summaries: Vec<SearchResult> = ctx.input_as("summaries")?;
        if summaries.is_empty() {
            return Err(AskflowError::generation("no web sources survived scraping and summarizing"));
        }

        let research_summary = render_research_summary(&summaries);
        let messages = report_prompt(self.report_type)
            .render(&[("research_summary", &research_summary), ("question", question)], &[])?;
        let report = ctx
            .call("synthesize_report", self.generator.generate(&messages, &[]))
            .await?;
        let report = report.trim();
        if report.is_empty() {
            return Err(AskflowError::generation("model returned an empty report"));
        }
        info!(sources = summaries.len(), report_type = %self.report_type, "Report written");
        Ok(Value::String(report.to_string()))
    }
}

#[async_trait]
impl Stage for SynthesizeReportStage {
    fn contract(&self) -> &StageContract {
        &self.contract
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        StageOutput::from_result(self.run(ctx).await)
    }
}

contract_debug!(
    ChooseAgentStage,
    GenerateSearchQueriesStage,
    SearchStage,
    ScrapeStage,
    SummarizeStage,
    SynthesizeReportStage,
);
