//! End-to-end runs of the assistant against test doubles.

use askflow::assistant::{AnswerMode, Assistant, AssistantBuilder, AssistantConfig, StreamItem};
use askflow::cancellation::CancellationToken;
use askflow::errors::AskflowError;
use askflow::events::{CollectingEventSink, EventKind};
use askflow::research::RESEARCH_PIPELINE;
use askflow::sql::SQL_PIPELINE;
use askflow::testing::{ScriptedGenerator, StaticExecutor, StaticFetcher, StaticSchemaProvider, StaticSearch};
use futures::StreamExt;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

const QUESTION: &str = "Who is older? Point guards or Centers?";
const SCHEMA: &str = "CREATE TABLE nba_roster (name TEXT, pos TEXT, age INTEGER)";

fn generator() -> ScriptedGenerator {
    ScriptedGenerator::new()
        .when("SQL Response:", "Centers are older than point guards on average.")
        .when(
            "SQL Query:",
            "SELECT pos, AVG(age) FROM nba_roster WHERE pos IN ('PG', 'C') GROUP BY pos;\n\nSQLResult:",
        )
        .when("google search queries", r#"["average age nba centers", "average age nba point guards"]"#)
        .when("answer in short", "Centers average 27.1 years.")
        .when("Information:", "# Centers are older")
}

struct Doubles {
    generator: Arc<ScriptedGenerator>,
    executor: Arc<StaticExecutor>,
    search: Arc<StaticSearch>,
    fetcher: Arc<StaticFetcher>,
    events: Arc<CollectingEventSink>,
}

impl Doubles {
    fn new(generator: ScriptedGenerator) -> Self {
        Self {
            generator: Arc::new(generator),
            executor: Arc::new(StaticExecutor::new("[('C', 27.1), ('PG', 25.4)]")),
            search: Arc::new(StaticSearch::new()),
            fetcher: Arc::new(StaticFetcher::new()),
            events: Arc::new(CollectingEventSink::new()),
        }
    }

    fn builder(&self, config: AssistantConfig) -> AssistantBuilder {
        Assistant::builder(config)
            .generator(self.generator.clone())
            .schema_provider(Arc::new(StaticSchemaProvider::new(SCHEMA)))
            .executor(self.executor.clone())
            .search(self.search.clone())
            .fetcher(self.fetcher.clone())
            .event_sink(self.events.clone())
    }

    fn assistant(&self, mode: AnswerMode) -> Assistant {
        self.builder(AssistantConfig::default().with_answer_mode(mode)).build().unwrap()
    }
}

#[tokio::test]
async fn sql_question_end_to_end() {
    let doubles = Doubles::new(generator());
    let assistant = doubles.assistant(AnswerMode::SqlOnly);

    let answer = assistant.ask(QUESTION).await.unwrap();

    assert_eq!(
        answer.answer,
        format!("Questions: {QUESTION}\n\nAnswer: Centers are older than point guards on average.")
    );
    assert_eq!(
        doubles.executor.queries(),
        vec!["SELECT pos, AVG(age) FROM nba_roster WHERE pos IN ('PG', 'C') GROUP BY pos;"]
    );
    assert!(answer.failures.is_empty());
}

#[tokio::test]
async fn follow_up_sees_previous_turn() {
    let doubles = Doubles::new(generator());
    let assistant = doubles.assistant(AnswerMode::SqlOnly);

    assistant.ask(QUESTION).await.unwrap();
    assistant.ask("And by how much?").await.unwrap();

    let sql_prompts: Vec<String> = doubles
        .generator
        .prompts()
        .into_iter()
        .filter(|p| p.contains("SQL Query:") && !p.contains("SQL Response:"))
        .collect();
    assert_eq!(sql_prompts.len(), 2);
    assert!(!sql_prompts[0].contains("Centers are older"));
    assert!(sql_prompts[1].contains(&format!("user: {QUESTION}")));
    assert!(sql_prompts[1].contains("assistant: Centers are older than point guards on average."));
    assert_eq!(assistant.memory().map(|m| m.len()), Some(2));
}

#[tokio::test]
async fn research_drops_failed_sources() {
    let urls: Vec<String> = (1..=5).map(|i| format!("https://stats.example/{i}")).collect();
    let mut doubles = Doubles::new(generator());
    doubles.search = Arc::new(StaticSearch::new().with_results("average age nba centers", urls.clone()));
    doubles.fetcher = Arc::new(StaticFetcher::new().failing(&urls[1]).failing(&urls[3]));
    let config = AssistantConfig::default()
        .with_answer_mode(AnswerMode::WebOnly)
        .with_search_query_count(1)
        .with_results_per_query(5);
    let assistant = doubles.builder(config).build().unwrap();

    let answer = assistant.ask(QUESTION).await.unwrap();

    assert_eq!(answer.answer, "# Centers are older");
    assert_eq!(doubles.generator.count_containing("answer in short"), 3);
    let dropped = doubles
        .events
        .events()
        .into_iter()
        .filter(|e| e.kind == EventKind::ItemDropped && e.stage.as_deref() == Some("scrape"))
        .count();
    assert_eq!(dropped, 2);
}

#[tokio::test]
async fn both_mode_keeps_surviving_branch() {
    let mut doubles = Doubles::new(generator());
    doubles.executor = Arc::new(StaticExecutor::failing("no such table: nba_roster"));
    let assistant = doubles.assistant(AnswerMode::Both);

    let answer = assistant.ask(QUESTION).await.unwrap();

    assert!(answer.is_partial());
    assert_eq!(answer.sql_answer, None);
    assert_eq!(answer.report.as_deref(), Some("# Centers are older"));
    assert_eq!(answer.failures[0].sub_pipeline, SQL_PIPELINE);
    assert_eq!(answer.failures[0].stage.as_deref(), Some("execute_sql"));
    assert!(answer.answer.starts_with("Research Report:\n# Centers are older\n\n[sql_qa unavailable: "));
    assert!(answer.answer.contains("no such table: nba_roster"));
    // Synthesis is skipped after a failed query.
    assert_eq!(doubles.generator.count_containing("SQL Response:"), 0);
}

#[tokio::test]
async fn both_mode_fails_when_both_branches_fail() {
    let mut doubles = Doubles::new(generator());
    doubles.executor = Arc::new(StaticExecutor::failing("database is locked"));
    doubles.search = Arc::new(
        StaticSearch::new()
            .failing_for("average age nba centers")
            .failing_for("average age nba point guards"),
    );
    let assistant = doubles.assistant(AnswerMode::Both);

    let err = assistant.ask(QUESTION).await.unwrap_err();

    let AskflowError::Aggregate(aggregate) = err.root_cause() else {
        panic!("expected an aggregate error, got {err:?}");
    };
    let branches: Vec<&str> = aggregate.failures.iter().map(|f| f.branch.as_str()).collect();
    assert_eq!(branches, vec![SQL_PIPELINE, RESEARCH_PIPELINE]);
    assert!(matches!(aggregate.failures[0].error.root_cause(), AskflowError::Execution(_)));
    assert!(matches!(aggregate.failures[1].error.root_cause(), AskflowError::Search { .. }));
}

#[tokio::test]
async fn stream_reports_stages_then_finishes() {
    let doubles = Doubles::new(generator());
    let assistant = doubles.assistant(AnswerMode::Both);

    let items: Vec<StreamItem> = assistant.stream(QUESTION).collect().await;

    let (last, stages) = items.split_last().unwrap();
    let StreamItem::Finished(Ok(answer)) = last else {
        panic!("stream must end with a successful answer, got {last:?}");
    };
    assert!(answer.sql_answer.is_some() && answer.report.is_some());
    assert!(stages.iter().all(|item| !item.is_finished()));

    let completed: Vec<&str> = stages
        .iter()
        .filter_map(|item| match item {
            StreamItem::Stage(event) if event.kind == EventKind::StageCompleted => event.stage.as_deref(),
            _ => None,
        })
        .collect();
    for stage in ["generate_sql", "execute_sql", "scrape", "synthesize_report"] {
        assert!(completed.contains(&stage), "missing {stage} in {completed:?}");
    }
}

#[tokio::test]
async fn slow_generator_times_out() {
    let doubles = Doubles::new(generator().with_delay(Duration::from_secs(5)));
    let config = AssistantConfig::default()
        .with_answer_mode(AnswerMode::SqlOnly)
        .with_io_timeout(Some(0.05));
    let assistant = doubles.builder(config).build().unwrap();

    let err = assistant.ask(QUESTION).await.unwrap_err();

    assert!(matches!(err.root_cause(), AskflowError::Timeout { .. }));
    assert!(doubles.executor.queries().is_empty());
}

#[tokio::test]
async fn cancelled_run_stops_quickly() {
    let slow = Doubles {
        fetcher: Arc::new(StaticFetcher::new().with_delay(Duration::from_secs(10))),
        ..Doubles::new(generator())
    };
    let assistant = slow.assistant(AnswerMode::Both);
    let token = Arc::new(CancellationToken::new());
    let run = assistant.run_options().with_cancellation(token.clone());

    let ask = assistant.ask_with(QUESTION, run);
    let cancel = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel("user left");
    };
    let (result, ()) = tokio::time::timeout(Duration::from_secs(2), async { tokio::join!(ask, cancel) })
        .await
        .unwrap();

    let err = result.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(err.to_string(), "Pipeline cancelled: user left");
}

#[tokio::test]
async fn same_question_same_answer() {
    let first = Doubles::new(generator()).assistant(AnswerMode::Both);
    let second = Doubles::new(generator()).assistant(AnswerMode::Both);

    let a = first.ask(QUESTION).await.unwrap();
    let b = second.ask(QUESTION).await.unwrap();

    assert_eq!(a, b);
}
