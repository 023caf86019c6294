//! End-to-end pipeline scenarios over the mock generator and engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use tripsql::catalog::{nyc_taxi_tables, MetadataSource, SchemaDescriptor};
use tripsql::engine::{ColumnInfo, MockEngine, MockOutcome, Value};
use tripsql::error::{ErrorKind, Result};
use tripsql::llm::mock::DEMO_HOURLY_SQL;
use tripsql::llm::{MockLlmClient, MockReply};
use tripsql::pipeline::{AnswerStatus, RequestStage};
use tripsql::query::Question;

use super::common::{self, SCENARIO_A};

fn question(text: &str) -> Question {
    Question::new(text).unwrap()
}

#[tokio::test]
async fn test_hourly_manhattan_question_completes() {
    let (orchestrator, engine) = common::demo_orchestrator(MockLlmClient::new()).await;

    let answer = orchestrator
        .answer(&question(SCENARIO_A), &CancellationToken::new())
        .await;

    assert_eq!(answer.status, AnswerStatus::Complete, "{:?}", answer.error);
    let sql = answer.sql.as_deref().unwrap();
    assert!(sql.contains("pickup_borough = 'Manhattan'"));
    assert!(sql.contains("DATE '2024-08-01'"));
    assert!(sql.contains("GROUP BY"));
    assert!(answer.rows().len() <= 24);
    assert!(!answer.truncated());
    assert_eq!(answer.column_names(), vec!["pickup_hr", "trips", "revenue"]);
    assert!(!answer.narrative.is_empty());
    assert_eq!(answer.schema_version, Some(1));
    assert_eq!(engine.attempts(), 1);
    assert_eq!(engine.submitted()[0], sql);

    let json = answer.to_json();
    assert_eq!(json["status"], "COMPLETE");
    assert_eq!(json["row_count"], 24);
    assert!(json.get("error_kind").is_none());
}

#[tokio::test]
async fn test_unsafe_output_never_reaches_engine() {
    let llm = MockLlmClient::new().with_sql_script([
        MockReply::text("DROP TABLE nyc_taxi.yellow_curated"),
        MockReply::text("SELECT * FROM nyc_taxi.yellow_curated; DROP TABLE nyc_taxi.yellow_curated"),
    ]);
    let observer = llm.clone();
    let (orchestrator, engine) = common::demo_orchestrator(llm).await;

    let answer = orchestrator
        .answer(&question("delete all the trips"), &CancellationToken::new())
        .await;

    assert_eq!(answer.status, AnswerStatus::Failed);
    assert_eq!(answer.error_kind(), Some(ErrorKind::UnsafeStatement));
    assert_eq!(answer.generation_attempts, 2);
    assert_eq!(observer.sql_calls(), 2);
    assert_eq!(observer.summary_calls(), 0);
    assert_eq!(engine.attempts(), 0);
    assert!(answer.result.is_none());
    assert!(!answer.stages.contains(&RequestStage::Executing));
    assert_eq!(answer.stages.last(), Some(&RequestStage::Failed));

    let json = answer.to_json();
    assert_eq!(json["status"], "FAILED");
    assert_eq!(json["error_kind"], "UnsafeStatement");
}

#[tokio::test]
async fn test_raw_table_is_rejected_after_regeneration() {
    let llm = MockLlmClient::new().with_sql_script([
        MockReply::text("SELECT COUNT(*) FROM nyc_taxi_raw.yellow_tripdata"),
        MockReply::text("SELECT COUNT(*) FROM nyc_taxi_raw.yellow_tripdata"),
    ]);
    let (orchestrator, engine) = common::demo_orchestrator(llm).await;

    let answer = orchestrator
        .answer(&question("how many raw trips"), &CancellationToken::new())
        .await;

    assert_eq!(answer.error_kind(), Some(ErrorKind::ForbiddenTable));
    assert_eq!(answer.generation_attempts, 2);
    assert_eq!(engine.attempts(), 0);
}

#[tokio::test]
async fn test_engine_timeouts_are_retried_and_cancelled() {
    let engine = Arc::new(
        MockEngine::demo()
            .with_script([MockOutcome::Hang, MockOutcome::Hang])
            .with_hang(Duration::from_secs(30)),
    );
    let orchestrator = common::orchestrator(
        common::builtin_catalog().await,
        MockLlmClient::new(),
        Arc::clone(&engine),
        common::fast_policy(3, Duration::from_millis(100)),
    );

    let answer = orchestrator
        .answer(&question(SCENARIO_A), &CancellationToken::new())
        .await;

    assert!(answer.is_complete(), "{:?}", answer.error);
    assert_eq!(answer.result.as_ref().unwrap().attempts, 3);
    assert_eq!(engine.attempts(), 3);
    assert_eq!(engine.cancellations(), 2);
    assert_eq!(answer.to_json()["execution_attempts"], 3);
}

#[tokio::test]
async fn test_engine_timeouts_exhaust_attempts() {
    let engine = Arc::new(
        MockEngine::demo()
            .with_script([MockOutcome::Hang, MockOutcome::Hang, MockOutcome::Hang])
            .with_hang(Duration::from_secs(30)),
    );
    let orchestrator = common::orchestrator(
        common::builtin_catalog().await,
        MockLlmClient::new(),
        Arc::clone(&engine),
        common::fast_policy(3, Duration::from_millis(50)),
    );

    let answer = orchestrator
        .answer(&question(SCENARIO_A), &CancellationToken::new())
        .await;

    assert_eq!(answer.error_kind(), Some(ErrorKind::ExecutionTimeout));
    assert_eq!(engine.attempts(), 3);
    assert!(answer.sql.is_some());
}

#[tokio::test]
async fn test_transient_engine_failures_exhaust_to_unavailable() {
    let engine = Arc::new(MockEngine::demo().with_script([
        MockOutcome::Transient("TOO_MANY_REQUESTS".to_string()),
        MockOutcome::Transient("TOO_MANY_REQUESTS".to_string()),
        MockOutcome::Transient("TOO_MANY_REQUESTS".to_string()),
    ]));
    let orchestrator = common::orchestrator(
        common::builtin_catalog().await,
        MockLlmClient::new(),
        Arc::clone(&engine),
        common::fast_policy(3, Duration::from_secs(5)),
    );

    let answer = orchestrator
        .answer(&question(SCENARIO_A), &CancellationToken::new())
        .await;

    assert_eq!(answer.error_kind(), Some(ErrorKind::ExecutionUnavailable));
    assert_eq!(engine.attempts(), 3);
}

#[tokio::test]
async fn test_oversized_result_is_truncated() {
    let columns = vec![
        ColumnInfo::new("pickup_hr", "bigint"),
        ColumnInfo::new("trips", "bigint"),
        ColumnInfo::new("revenue", "double"),
    ];
    let rows = (0..250)
        .map(|i| vec![Value::Int(i % 24), Value::Int(100 + i), Value::Float(i as f64 * 2.5)])
        .collect();
    let engine = Arc::new(MockEngine::new().with_rows(columns, rows));
    let orchestrator = common::orchestrator(
        common::builtin_catalog().await,
        MockLlmClient::new(),
        Arc::clone(&engine),
        common::fast_policy(3, Duration::from_secs(5)),
    );

    let answer = orchestrator
        .answer(&question(SCENARIO_A), &CancellationToken::new())
        .await;

    assert!(answer.is_complete(), "{:?}", answer.error);
    assert_eq!(answer.rows().len(), common::ROW_CAP);
    assert!(answer.truncated());
    let json = answer.to_json();
    assert_eq!(json["row_count"], 100);
    assert_eq!(json["truncated"], true);
}

#[tokio::test]
async fn test_repeated_question_is_stable() {
    let (orchestrator, _engine) = common::demo_orchestrator(MockLlmClient::new()).await;

    let first = orchestrator
        .answer(&question(SCENARIO_A), &CancellationToken::new())
        .await;
    let second = orchestrator
        .answer(&question(SCENARIO_A), &CancellationToken::new())
        .await;

    assert!(first.is_complete() && second.is_complete());
    assert_eq!(first.sql, second.sql);
    assert_eq!(first.rows(), second.rows());
    assert_ne!(first.request_id, second.request_id);
}

#[tokio::test]
async fn test_cancel_during_execution() {
    let engine = Arc::new(
        MockEngine::demo()
            .with_script([MockOutcome::Hang])
            .with_hang(Duration::from_secs(30)),
    );
    let orchestrator = common::orchestrator(
        common::builtin_catalog().await,
        MockLlmClient::new(),
        Arc::clone(&engine),
        common::fast_policy(3, Duration::from_secs(30)),
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let answer = orchestrator.answer(&question(SCENARIO_A), &cancel).await;

    assert_eq!(answer.error_kind(), Some(ErrorKind::Cancelled));
    assert_eq!(engine.attempts(), 1);
    assert_eq!(engine.cancellations(), 1);
    assert_eq!(answer.stages.last(), Some(&RequestStage::Failed));
}

/// Serves the built-in tables first, then drops the hourly view on every
/// later fetch.
struct ShrinkingSource {
    fetches: AtomicUsize,
}

#[async_trait]
impl MetadataSource for ShrinkingSource {
    async fn fetch_tables(&self) -> Result<Vec<SchemaDescriptor>> {
        let fetch = self.fetches.fetch_add(1, Ordering::SeqCst);
        let tables = nyc_taxi_tables();
        if fetch == 0 {
            return Ok(tables);
        }
        Ok(tables
            .into_iter()
            .filter(|t| t.name != "v_trips_borough_hour")
            .collect())
    }

    fn name(&self) -> &str {
        "shrinking"
    }
}

#[tokio::test]
async fn test_refresh_mid_request_keeps_captured_snapshot() {
    let catalog = common::catalog_from(Arc::new(ShrinkingSource {
        fetches: AtomicUsize::new(0),
    }))
    .await;
    let llm = MockLlmClient::new()
        .with_sql_script([MockReply::text(DEMO_HOURLY_SQL), MockReply::text(DEMO_HOURLY_SQL)])
        .with_delay(Duration::from_millis(200));
    let orchestrator = common::orchestrator(
        Arc::clone(&catalog),
        llm,
        Arc::new(MockEngine::demo()),
        common::fast_policy(3, Duration::from_secs(5)),
    );

    let in_flight = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator
                .answer(&question(SCENARIO_A), &CancellationToken::new())
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    let refreshed = catalog.refresh().await.unwrap();
    assert_eq!(refreshed.version, 2);

    let answer = in_flight.await.unwrap();
    assert!(answer.is_complete(), "{:?}", answer.error);
    assert_eq!(answer.schema_version, Some(1));
    assert_eq!(catalog.version(), 2);

    // A new request sees the refreshed catalog, where the view is gone.
    let next = orchestrator
        .answer(&question(SCENARIO_A), &CancellationToken::new())
        .await;
    assert_eq!(next.schema_version, Some(2));
    assert_eq!(next.error_kind(), Some(ErrorKind::UnknownReference));
}
