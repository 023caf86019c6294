//! Request orchestration.
//!
//! Sequences prompt building, generation, validation, execution and
//! summarization for one question. Every request captures a single catalog
//! snapshot up front and uses it for all stages, so a concurrent refresh
//! never changes the schema a request was generated against.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use super::{Answer, AnswerStatus, RequestStage, StageTracker};
use crate::catalog::{AllowList, CatalogSnapshot, SchemaCatalog};
use crate::config::Config;
use crate::engine::QueryEngine;
use crate::error::{Result, TripSqlError};
use crate::generator::QueryGenerator;
use crate::llm::{CompletionOptions, LlmClient};
use crate::prompt::PromptBuilder;
use crate::query::{ExecutionResult, QueryCandidate, QueryExecutor, Question};
use crate::safety::SqlValidator;
use crate::summary::{unsupported_figures, Summarizer};

/// Mutable bookkeeping for one request.
struct RequestRun {
    tracker: StageTracker,
    sql: Option<String>,
    generation_attempts: u32,
    warnings: Vec<String>,
}

/// What a successful run produced.
struct Outcome {
    candidate: QueryCandidate,
    result: ExecutionResult,
    narrative: String,
}

/// Answers questions end to end.
#[derive(Clone)]
pub struct Orchestrator {
    catalog: Arc<SchemaCatalog>,
    prompts: PromptBuilder,
    generator: QueryGenerator,
    validator: SqlValidator,
    executor: QueryExecutor,
    summarizer: Summarizer,
    max_regenerations: u32,
}

impl Orchestrator {
    pub fn new(
        catalog: Arc<SchemaCatalog>,
        prompts: PromptBuilder,
        generator: QueryGenerator,
        validator: SqlValidator,
        executor: QueryExecutor,
        summarizer: Summarizer,
    ) -> Self {
        Self {
            catalog,
            prompts,
            generator,
            validator,
            executor,
            summarizer,
            max_regenerations: 1,
        }
    }

    /// Wires every stage from configuration.
    pub fn from_config(
        config: &Config,
        catalog: Arc<SchemaCatalog>,
        llm: Arc<dyn LlmClient>,
        engine: Arc<dyn QueryEngine>,
    ) -> Self {
        let pipeline = &config.pipeline;
        let allow_list = AllowList::new(&config.catalog.allowed_tables, &config.engine.schema)
            .with_catalog(&config.engine.catalog);
        let generation = pipeline.generation_policy();

        let prompts = PromptBuilder::new(
            allow_list.clone(),
            config.catalog.core_tables.clone(),
            pipeline.prompt_char_budget,
            pipeline.default_row_cap,
        );
        let generator = QueryGenerator::new(
            Arc::clone(&llm),
            generation,
            CompletionOptions::new(config.llm.max_tokens),
        );
        let validator = SqlValidator::new(allow_list, pipeline.default_row_cap);
        let executor = QueryExecutor::new(
            engine,
            pipeline.execution_policy(),
            pipeline.default_row_cap,
        );
        let summarizer = Summarizer::new(
            llm,
            CompletionOptions::new(config.llm.summary_max_tokens),
            generation.timeout,
            pipeline.summary_preview_rows,
        );

        Self::new(catalog, prompts, generator, validator, executor, summarizer)
            .with_max_regenerations(pipeline.max_regenerations)
    }

    /// Sets how many times a rejected candidate is regenerated.
    pub fn with_max_regenerations(mut self, max_regenerations: u32) -> Self {
        self.max_regenerations = max_regenerations;
        self
    }

    pub fn catalog(&self) -> &Arc<SchemaCatalog> {
        &self.catalog
    }

    pub fn validator(&self) -> &SqlValidator {
        &self.validator
    }

    /// Answers `question`. Never fails: errors become a `Failed` answer
    /// carrying the originating error kind.
    ///
    /// Firing `cancel` stops in-flight generation or execution and yields a
    /// `Failed` answer with `Cancelled`.
    pub async fn answer(&self, question: &Question, cancel: &CancellationToken) -> Answer {
        let span = info_span!("request", request_id = %question.request_id);
        self.run(question, cancel).instrument(span).await
    }

    async fn run(&self, question: &Question, cancel: &CancellationToken) -> Answer {
        let started = Instant::now();
        let snapshot = self.catalog.snapshot();
        info!(
            schema_version = snapshot.version,
            question = %question.text,
            "Request received"
        );

        let mut run = RequestRun {
            tracker: StageTracker::new(),
            sql: None,
            generation_attempts: 0,
            warnings: Vec::new(),
        };

        let outcome = self.drive(question, &snapshot, cancel, &mut run).await;
        let duration = started.elapsed();

        match outcome {
            Ok(outcome) => {
                info!(
                    rows = outcome.result.row_count,
                    truncated = outcome.result.truncated,
                    duration_ms = duration.as_millis() as u64,
                    "Request complete"
                );
                Answer {
                    request_id: question.request_id.clone(),
                    status: AnswerStatus::Complete,
                    sql: Some(outcome.candidate.sql),
                    result: Some(outcome.result),
                    narrative: outcome.narrative,
                    error: None,
                    schema_version: Some(snapshot.version),
                    generation_attempts: run.generation_attempts,
                    stages: run.tracker.into_history(),
                    warnings: run.warnings,
                    duration,
                }
            }
            Err(error) => {
                warn!(
                    kind = %error.kind(),
                    stage = %run.tracker.current(),
                    duration_ms = duration.as_millis() as u64,
                    "Request failed: {}",
                    error.message()
                );
                run.tracker.fail();
                Answer {
                    request_id: question.request_id.clone(),
                    status: AnswerStatus::Failed,
                    sql: run.sql,
                    result: None,
                    narrative: String::new(),
                    error: Some(error),
                    schema_version: Some(snapshot.version),
                    generation_attempts: run.generation_attempts,
                    stages: run.tracker.into_history(),
                    warnings: run.warnings,
                    duration,
                }
            }
        }
    }

    async fn drive(
        &self,
        question: &Question,
        snapshot: &CatalogSnapshot,
        cancel: &CancellationToken,
        run: &mut RequestRun,
    ) -> Result<Outcome> {
        run.tracker.advance(RequestStage::Generating)?;
        let candidate = self.generate_valid(question, snapshot, cancel, run).await?;
        run.sql = Some(candidate.sql.clone());

        run.tracker.advance(RequestStage::Executing)?;
        let result = self.executor.execute(&candidate, cancel).await?;
        run.warnings
            .extend(unexplained_columns(&result, &candidate, snapshot));

        run.tracker.advance(RequestStage::Summarizing)?;
        let narrative = match cancellable(cancel, self.summarizer.summarize(question, &result)).await
        {
            Ok(narrative) => {
                let unsupported = unsupported_figures(&narrative, question, &result);
                if !unsupported.is_empty() {
                    run.warnings.push(format!(
                        "Narrative mentions figures not in the result: {}",
                        unsupported.join(", ")
                    ));
                }
                narrative
            }
            Err(e @ TripSqlError::Cancelled(_)) => return Err(e),
            Err(e) => {
                warn!("Summary unavailable, returning raw results: {}", e.message());
                run.warnings
                    .push(format!("Summary unavailable: {}", e.message()));
                String::new()
            }
        };

        run.tracker.advance(RequestStage::Complete)?;
        Ok(Outcome {
            candidate,
            result,
            narrative,
        })
    }

    /// Generates candidates until one validates or the regeneration bound is
    /// spent. Validator rejections and ambiguous responses are fed back into
    /// a revised prompt.
    async fn generate_valid(
        &self,
        question: &Question,
        snapshot: &CatalogSnapshot,
        cancel: &CancellationToken,
        run: &mut RequestRun,
    ) -> Result<QueryCandidate> {
        let mut payload = self.prompts.build(question, snapshot)?;
        info!(
            tables = ?payload.selected_tables,
            "Prompt built"
        );

        let mut attempt = 1;
        loop {
            run.generation_attempts = attempt;
            let generated = cancellable(cancel, self.generator.generate(&payload, attempt)).await;

            let (previous_sql, reason) = match generated {
                Ok(candidate) => {
                    run.tracker.advance(RequestStage::Validating)?;
                    let candidate = self.validator.validate(candidate, snapshot);
                    if candidate.is_valid() {
                        info!(attempt, sql = %candidate.sql, "Candidate validated");
                        return Ok(candidate);
                    }
                    let reason = candidate.reason().cloned().ok_or_else(|| {
                        TripSqlError::internal("rejected candidate without a reason")
                    })?;
                    run.sql = Some(candidate.sql.clone());
                    (Some(candidate.sql), reason)
                }
                Err(e @ TripSqlError::AmbiguousGeneration(_)) => (None, e),
                Err(e) => return Err(e),
            };

            info!(
                attempt,
                kind = %reason.kind(),
                "Candidate rejected: {}",
                reason.message()
            );
            if attempt > self.max_regenerations {
                return Err(reason);
            }

            if run.tracker.current() == RequestStage::Validating {
                run.tracker.advance(RequestStage::Generating)?;
            }
            payload = self
                .prompts
                .revise(&payload, question, previous_sql.as_deref(), &reason);
            attempt += 1;
        }
    }
}

/// Runs `future` unless `cancel` fires first.
async fn cancellable<T>(
    cancel: &CancellationToken,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TripSqlError::cancelled("request cancelled by caller")),
        outcome = future => outcome,
    }
}

/// Warnings for result columns that neither the schema nor the query's own
/// output names explain.
fn unexplained_columns(
    result: &ExecutionResult,
    candidate: &QueryCandidate,
    snapshot: &CatalogSnapshot,
) -> Vec<String> {
    result
        .columns
        .iter()
        .filter(|column| {
            let name = column.name.as_str();
            let aliased = candidate
                .output_names
                .iter()
                .any(|n| n.eq_ignore_ascii_case(name));
            let in_schema = snapshot
                .tables
                .iter()
                .any(|t| t.find_column(name).is_some());
            !aliased && !in_schema
        })
        .map(|column| {
            format!(
                "Result column '{}' is not in the schema or the query's output names",
                column.name
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::BuiltinSource;
    use crate::engine::{MockEngine, MockOutcome};
    use crate::error::ErrorKind;
    use crate::llm::mock::DEMO_HOURLY_SQL;
    use crate::llm::{MockLlmClient, MockReply};
    use std::time::Duration;

    async fn orchestrator(llm: MockLlmClient, engine: MockEngine) -> Orchestrator {
        let mut config = Config::default();
        config.pipeline.retry_base_delay_ms = 1;
        config.pipeline.retry_max_delay_ms = 5;
        let catalog = Arc::new(
            SchemaCatalog::load(Arc::new(BuiltinSource))
                .await
                .unwrap(),
        );
        Orchestrator::from_config(&config, catalog, Arc::new(llm), Arc::new(engine))
    }

    fn question(text: &str) -> Question {
        Question::new(text).unwrap().with_request_id("req-test")
    }

    #[tokio::test]
    async fn test_answers_hourly_question() {
        let orchestrator = orchestrator(MockLlmClient::new(), MockEngine::demo()).await;
        let answer = orchestrator
            .answer(
                &question("total trips and revenue by hour for Manhattan pickups on 2024-08-01"),
                &CancellationToken::new(),
            )
            .await;

        assert!(answer.is_complete(), "{:?}", answer.error);
        let sql = answer.sql.as_deref().unwrap();
        assert!(sql.contains("pickup_borough = 'Manhattan'"));
        assert!(sql.ends_with("LIMIT 100"));
        assert_eq!(answer.rows().len(), 24);
        assert!(!answer.narrative.is_empty());
        assert_eq!(answer.generation_attempts, 1);
        assert_eq!(
            answer.stages,
            vec![
                RequestStage::Received,
                RequestStage::Generating,
                RequestStage::Validating,
                RequestStage::Executing,
                RequestStage::Summarizing,
                RequestStage::Complete,
            ]
        );
        assert!(answer.warnings.is_empty(), "{:?}", answer.warnings);
    }

    #[tokio::test]
    async fn test_rejection_triggers_one_regeneration() {
        let llm = MockLlmClient::new().with_sql_script([
            MockReply::text("SELECT * FROM nyc_taxi_raw.yellow_tripdata"),
            MockReply::text(DEMO_HOURLY_SQL),
        ]);
        let observer = llm.clone();
        let orchestrator = orchestrator(llm, MockEngine::demo()).await;
        let answer = orchestrator
            .answer(&question("trips by hour"), &CancellationToken::new())
            .await;

        assert!(answer.is_complete());
        assert_eq!(answer.generation_attempts, 2);
        assert_eq!(observer.sql_calls(), 2);

        let requests = observer.requests();
        let revised = requests[1].last().unwrap();
        assert!(revised.content.contains("ForbiddenTable"));
    }

    #[tokio::test]
    async fn test_ambiguous_generation_is_regenerated() {
        let llm = MockLlmClient::new().with_sql_script([
            MockReply::text("Which borough do you mean?"),
            MockReply::text(DEMO_HOURLY_SQL),
        ]);
        let orchestrator = orchestrator(llm, MockEngine::demo()).await;
        let answer = orchestrator
            .answer(&question("trips by hour"), &CancellationToken::new())
            .await;
        assert!(answer.is_complete());
        assert_eq!(answer.generation_attempts, 2);
        assert_eq!(
            &answer.stages[..3],
            &[
                RequestStage::Received,
                RequestStage::Generating,
                RequestStage::Validating
            ]
        );
    }

    #[tokio::test]
    async fn test_summary_failure_degrades() {
        let llm = MockLlmClient::new()
            .with_summary(MockReply::Error(TripSqlError::llm("model overloaded")));
        let orchestrator = orchestrator(llm, MockEngine::demo()).await;
        let answer = orchestrator
            .answer(&question("revenue by hour"), &CancellationToken::new())
            .await;

        assert!(answer.is_complete());
        assert!(answer.narrative.is_empty());
        assert_eq!(answer.rows().len(), 24);
        assert!(answer.warnings[0].starts_with("Summary unavailable"));
    }

    #[tokio::test]
    async fn test_fabricated_figures_are_warned() {
        let llm = MockLlmClient::new()
            .with_summary(MockReply::text("Revenue peaked at 999999 dollars."));
        let orchestrator = orchestrator(llm, MockEngine::demo()).await;
        let answer = orchestrator
            .answer(&question("revenue by hour"), &CancellationToken::new())
            .await;
        assert!(answer.is_complete());
        assert!(answer.warnings.iter().any(|w| w.contains("999999")));
    }

    #[tokio::test]
    async fn test_execution_rejection_is_terminal() {
        let engine = MockEngine::demo()
            .with_script([MockOutcome::Rejected("TABLE_NOT_FOUND".to_string())]);
        let orchestrator = orchestrator(MockLlmClient::new(), engine).await;
        let answer = orchestrator
            .answer(&question("revenue by hour"), &CancellationToken::new())
            .await;

        assert_eq!(answer.status, AnswerStatus::Failed);
        assert_eq!(answer.error_kind(), Some(ErrorKind::ExecutionRejected));
        assert!(answer.sql.is_some());
        assert_eq!(answer.stages.last(), Some(&RequestStage::Failed));
    }

    #[tokio::test]
    async fn test_cancel_during_generation() {
        let llm = MockLlmClient::new().with_delay(Duration::from_secs(30));
        let orchestrator = orchestrator(llm, MockEngine::demo()).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let answer = orchestrator.answer(&question("revenue by hour"), &cancel).await;
        assert_eq!(answer.error_kind(), Some(ErrorKind::Cancelled));
    }

    #[test]
    fn test_unexplained_columns() {
        use crate::catalog::nyc_taxi_tables;
        use crate::engine::ColumnInfo;

        let snapshot = CatalogSnapshot::new(1, nyc_taxi_tables());
        let mut candidate = QueryCandidate::new("SELECT 1", 1, 1);
        candidate.mark_valid("SELECT 1".to_string(), vec!["trips".to_string()]);
        let result = ExecutionResult {
            columns: vec![
                ColumnInfo::new("trips", "bigint"),
                ColumnInfo::new("fare_amount", "double"),
                ColumnInfo::new("_col2", "double"),
            ],
            rows: vec![],
            row_count: 0,
            truncated: false,
            duration: Duration::ZERO,
            attempts: 1,
            total_rows_seen: None,
        };

        let warnings = unexplained_columns(&result, &candidate, &snapshot);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("_col2"));
    }
}
