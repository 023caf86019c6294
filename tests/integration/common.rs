//! Shared fixtures for pipeline integration tests.

use std::sync::Arc;
use std::time::Duration;

use tripsql::catalog::{AllowList, BuiltinSource, MetadataSource, SchemaCatalog};
use tripsql::engine::{MockEngine, QueryEngine};
use tripsql::generator::QueryGenerator;
use tripsql::llm::{CompletionOptions, LlmClient, MockLlmClient};
use tripsql::pipeline::Orchestrator;
use tripsql::prompt::PromptBuilder;
use tripsql::query::QueryExecutor;
use tripsql::retry::RetryPolicy;
use tripsql::safety::SqlValidator;
use tripsql::summary::Summarizer;

pub const ROW_CAP: usize = 100;

pub const SCENARIO_A: &str = "total trips and revenue by hour for Manhattan pickups on 2024-08-01";

pub fn allow_list() -> AllowList {
    AllowList::new(
        [
            "nyc_taxi.yellow_curated",
            "nyc_taxi.taxi_zone_lookup",
            "nyc_taxi.v_trips_borough_hour",
        ],
        "nyc_taxi",
    )
    .with_catalog("hive")
}

/// A policy with millisecond backoff so retry tests stay fast.
pub fn fast_policy(max_attempts: u32, timeout: Duration) -> RetryPolicy {
    RetryPolicy::new(max_attempts, timeout)
        .with_backoff(Duration::from_millis(1), Duration::from_millis(10))
}

pub async fn catalog_from(source: Arc<dyn MetadataSource>) -> Arc<SchemaCatalog> {
    Arc::new(SchemaCatalog::load(source).await.unwrap())
}

pub async fn builtin_catalog() -> Arc<SchemaCatalog> {
    catalog_from(Arc::new(BuiltinSource)).await
}

/// Wires an orchestrator over mocks, with the given execution policy.
pub fn orchestrator(
    catalog: Arc<SchemaCatalog>,
    llm: MockLlmClient,
    engine: Arc<MockEngine>,
    execution: RetryPolicy,
) -> Orchestrator {
    let llm: Arc<dyn LlmClient> = Arc::new(llm);
    let engine: Arc<dyn QueryEngine> = engine;

    Orchestrator::new(
        catalog,
        PromptBuilder::new(
            allow_list(),
            vec![
                "nyc_taxi.yellow_curated".to_string(),
                "nyc_taxi.taxi_zone_lookup".to_string(),
            ],
            6000,
            ROW_CAP,
        ),
        QueryGenerator::new(
            Arc::clone(&llm),
            fast_policy(3, Duration::from_secs(5)),
            CompletionOptions::new(300),
        ),
        SqlValidator::new(allow_list(), ROW_CAP),
        QueryExecutor::new(engine, execution, ROW_CAP),
        Summarizer::new(llm, CompletionOptions::new(150), Duration::from_secs(5), 30),
    )
    .with_max_regenerations(1)
}

/// An orchestrator over the demo engine and the built-in catalog.
pub async fn demo_orchestrator(llm: MockLlmClient) -> (Orchestrator, Arc<MockEngine>) {
    let engine = Arc::new(MockEngine::demo());
    let orchestrator = orchestrator(
        builtin_catalog().await,
        llm,
        Arc::clone(&engine),
        fast_policy(3, Duration::from_secs(5)),
    );
    (orchestrator, engine)
}
