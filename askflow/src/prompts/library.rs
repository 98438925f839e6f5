//! Bundled prompts for the SQL and web research pipelines.

use super::ChatPrompt;
use serde::{Deserialize, Serialize};
use std::fmt;

/// System message for SQL generation.
pub const SQL_SYSTEM: &str = "Given an input question, convert it to a SQL query. No pre-amble.";

/// User message for SQL generation. Variables: `schema`, `question`.
pub const SQL_HUMAN: &str = "Based on the table schema below, write a SQL query that would answer the user's question:\n{schema}\n\nQuestion: {question}\nSQL Query:";

/// System message for answer synthesis.
pub const ANSWER_SYSTEM: &str =
    "Given an input question and SQL response, convert it to a natural language answer. No pre-amble.";

/// User message for answer synthesis. Variables: `schema`, `question`, `query`, `response`.
pub const ANSWER_HUMAN: &str = "Based on the table schema below, question, sql query, and sql response, write a natural language response:\n{schema}\n\nQuestion: {question}\nSQL Query: {query}\nSQL Response: {response}";

/// Stop sequence passed with SQL generation.
pub const SQL_STOP: &str = "\nSQLResult:";

/// Role prompt used when no research agent was chosen.
pub const DEFAULT_AGENT_ROLE: &str = "You are an AI critical thinker research assistant. Your sole purpose is to write well written, critically acclaimed, objective and structured reports on given text.";

/// User message for search query generation. Variables: `count`, `question`.
pub const SEARCH_QUERIES_HUMAN: &str = "Write {count} google search queries to search online that form an objective opinion from the following: {question}\nYou must respond with a list of strings in the following format: [\"query 1\", \"query 2\", \"query 3\"].";

/// User message for page summaries. Variables: `text`, `question`.
pub const SUMMARY_HUMAN: &str = "{text}\n-----------\n\nUsing the above text, answer in short the following question:\n\n> {question}\n-----------\nif the question cannot be answered using the text, simply summarize the text. Include all factual information, numbers, stats etc if available.";

/// System message for agent selection.
pub const CHOOSE_AGENT_SYSTEM: &str = "This task involves researching a given topic, regardless of its complexity or the availability of a definitive answer. The research is conducted by a specific agent, defined by its type and role, with each agent requiring distinct instructions.\nAgent\nThe agent is determined by the field of the topic and the specific name of the agent that could be utilized to research the topic provided. Agents are categorized by their area of expertise, and each agent type is associated with a corresponding emoji.\n\nexamples:\ntask: \"should I invest in apple stocks?\"\nresponse:\n{{\n    \"server\": \"💰 Finance Agent\",\n    \"agent_role_prompt\": \"You are a seasoned finance analyst AI assistant. Your primary goal is to compose comprehensive, astute, impartial, and methodically arranged financial reports based on provided data and trends.\"\n}}\ntask: \"could reselling sneakers become profitable?\"\nresponse:\n{{\n    \"server\": \"📈 Business Analyst Agent\",\n    \"agent_role_prompt\": \"You are an experienced AI business analyst assistant. Your main objective is to produce comprehensive, insightful, impartial, and systematically structured business reports based on provided business data, market trends, and strategic analysis.\"\n}}\ntask: \"what are the most interesting sites in Tel Aviv?\"\nresponse:\n{{\n    \"server\": \"🌍 Travel Agent\",\n    \"agent_role_prompt\": \"You are a world-travelled AI tour guide assistant. Your main purpose is to draft engaging, insightful, unbiased, and well-structured travel reports on given locations, including history, attractions, and cultural insights.\"\n}}";

/// User message for agent selection. Variables: `question`.
pub const CHOOSE_AGENT_HUMAN: &str = "task: {question}";

/// System message for the final report.
pub const WRITER_SYSTEM: &str = "You are an AI critical thinker research assistant. Your sole purpose is to write well written, critically acclaimed, objective and structured reports on given text.";

/// Report template for [`ReportType::Research`]. Variables: `research_summary`, `question`.
pub const RESEARCH_REPORT: &str = "Information:\n--------\n{research_summary}\n--------\n\nUsing the above information, answer the following question or topic: \"{question}\" in a detailed report -- The report should focus on the answer to the question, should be well structured, informative, in depth, with facts and numbers if available and a minimum of 1,200 words.\n\nYou should strive to write the report as long as you can using all relevant and necessary information provided.\nYou must write the report with markdown syntax.\nYou MUST determine your own concrete and valid opinion based on the given information. Do NOT deter to general and meaningless conclusions.\nWrite all used source urls at the end of the report, and make sure to not add duplicated sources, but only one reference for each.\nYou must write the report in apa format.\nPlease do your best, this is very important to my career.";

/// Report template for [`ReportType::Resource`]. Variables: `research_summary`, `question`.
pub const RESOURCE_REPORT: &str = "{research_summary}\n\nBased on the above information, generate a bibliography recommendation report for the following question or topic: \"{question}\". The report should provide a detailed analysis of each recommended resource, explaining how each source can contribute to finding answers to the research question.\nFocus on the relevance, reliability, and significance of each source.\nEnsure that the report is well-structured, informative, in-depth, and follows Markdown syntax.\nInclude relevant facts, figures, and numbers whenever available.\nThe report should have a minimum length of 1,200 words.";

/// Report template for [`ReportType::Outline`]. Variables: `research_summary`, `question`.
pub const OUTLINE_REPORT: &str = "{research_summary}\n\nUsing the above information, generate an outline for a research report in Markdown syntax for the following question or topic: \"{question}\". The outline should provide a well-structured framework for the research report, including the main sections, subsections, and key points to be covered.\nThe research report should be detailed, informative, in-depth, and a minimum of 1,200 words.\nUse appropriate Markdown syntax to format the outline and ensure readability.";

/// The shape of the final research report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    /// A detailed answer to the question.
    #[default]
    Research,
    /// An annotated list of the sources.
    Resource,
    /// A report outline.
    Outline,
}

impl ReportType {
    /// Returns the user message template for this report type.
    #[must_use]
    pub const fn template(self) -> &'static str {
        match self {
            Self::Research => RESEARCH_REPORT,
            Self::Resource => RESOURCE_REPORT,
            Self::Outline => OUTLINE_REPORT,
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Research => write!(f, "research"),
            Self::Resource => write!(f, "resource"),
            Self::Outline => write!(f, "outline"),
        }
    }
}

/// Prompt that turns a question into SQL, with conversation history.
#[must_use]
pub fn sql_query_prompt() -> ChatPrompt {
    ChatPrompt::new().system(SQL_SYSTEM).history().user(SQL_HUMAN)
}

/// Prompt that turns a SQL result into a natural language answer.
#[must_use]
pub fn sql_answer_prompt() -> ChatPrompt {
    ChatPrompt::new().system(ANSWER_SYSTEM).user(ANSWER_HUMAN)
}

/// Prompt that asks for search queries. Variables: `agent_prompt`, `count`, `question`.
#[must_use]
pub fn search_queries_prompt() -> ChatPrompt {
    ChatPrompt::new().system("{agent_prompt}").user(SEARCH_QUERIES_HUMAN)
}

/// Prompt that summarizes one page.
#[must_use]
pub fn summary_prompt() -> ChatPrompt {
    ChatPrompt::new().user(SUMMARY_HUMAN)
}

/// Prompt that picks a research agent role.
#[must_use]
pub fn choose_agent_prompt() -> ChatPrompt {
    ChatPrompt::new().system(CHOOSE_AGENT_SYSTEM).user(CHOOSE_AGENT_HUMAN)
}

/// Prompt that writes the final report.
#[must_use]
pub fn report_prompt(report_type: ReportType) -> ChatPrompt {
    ChatPrompt::new().system(WRITER_SYSTEM).user(report_type.template())
}
