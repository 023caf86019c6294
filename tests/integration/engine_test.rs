//! PostgreSQL engine tests.
//!
//! These need a running PostgreSQL database and are skipped unless
//! DATABASE_URL is set.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use tripsql::catalog::CatalogSnapshot;
use tripsql::engine::{EngineOutput, PostgresEngine, QueryEngine, Value};
use tripsql::error::{ErrorKind, Result};
use tripsql::query::{QueryCandidate, QueryExecutor};
use tripsql::safety::SqlValidator;

use super::common;

async fn get_test_engine() -> Option<PostgresEngine> {
    let url = std::env::var("DATABASE_URL").ok()?;
    PostgresEngine::connect(&url).await.ok()
}

async fn run(engine: &PostgresEngine, sql: &str, max_rows: usize) -> Result<EngineOutput> {
    let handle = engine.submit(sql).await?;
    engine.fetch(&handle, max_rows).await
}

#[tokio::test]
async fn test_select_values() {
    let Some(engine) = get_test_engine().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let output = run(
        &engine,
        "SELECT 1::int8 AS trips, 'Queens' AS borough, NULL::float8 AS tip",
        10,
    )
    .await
    .unwrap();

    assert_eq!(output.columns.len(), 3);
    assert_eq!(output.columns[0].name, "trips");
    assert_eq!(
        output.rows[0],
        vec![Value::Int(1), Value::String("Queens".to_string()), Value::Null]
    );
    assert!(!output.truncated);
    assert_eq!(output.total_rows, Some(1));
}

#[tokio::test]
async fn test_rows_past_cap_are_not_read() {
    let Some(engine) = get_test_engine().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let output = run(&engine, "SELECT g AS n FROM generate_series(1, 500) AS g", 100)
        .await
        .unwrap();

    assert_eq!(output.rows.len(), 100);
    assert!(output.truncated);
    assert_eq!(output.total_rows, None);
}

#[tokio::test]
async fn test_empty_result_keeps_columns() {
    let Some(engine) = get_test_engine().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let output = run(&engine, "SELECT 1 AS n WHERE false", 10).await.unwrap();
    assert!(output.rows.is_empty());
    assert_eq!(output.columns.len(), 1);
    assert_eq!(output.columns[0].name, "n");
}

#[tokio::test]
async fn test_bad_sql_is_rejected() {
    let Some(engine) = get_test_engine().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let err = run(&engine, "SELECT * FROM table_that_does_not_exist", 10)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExecutionRejected);
    assert!(err.message().starts_with("ERROR:"));
}

#[tokio::test]
async fn test_executor_over_postgres() {
    let Some(engine) = get_test_engine().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let snapshot = CatalogSnapshot::new(1, Vec::new());
    let mut candidate = QueryCandidate::manual("SELECT 42 AS answer", snapshot.version);
    let validator = SqlValidator::new(common::allow_list(), 5);
    candidate = validator.validate(candidate, &snapshot);
    assert!(candidate.is_valid(), "{:?}", candidate.reason());

    let executor = QueryExecutor::new(
        Arc::new(engine),
        common::fast_policy(2, Duration::from_secs(10)),
        5,
    );
    let result = executor
        .execute(&candidate, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.column_names(), vec!["answer"]);
    assert_eq!(result.rows[0][0], Value::Int(42));
    assert_eq!(result.attempts, 1);
}
