//! Application wiring for tripsql.
//!
//! Builds the catalog, the LLM client and the query engine from
//! configuration and exposes the operations the CLI offers.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::catalog::{
    BuiltinSource, FileSource, MetadataSource, PostgresSource, SchemaCatalog, SchemaDescriptor,
};
use crate::config::{CatalogSourceKind, Config};
use crate::engine::{self, QueryEngine};
use crate::error::{Result, TripSqlError};
use crate::llm::{self, LlmClient};
use crate::pipeline::{parse_request, Answer, Orchestrator};
use crate::query::{QueryCandidate, Question};

/// A configured pipeline plus its background catalog refresh.
pub struct App {
    orchestrator: Orchestrator,
    refresh: Option<(CancellationToken, JoinHandle<()>)>,
}

impl App {
    /// Connects every collaborator named in `config`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let source = metadata_source(config).await?;
        let catalog = Arc::new(SchemaCatalog::load(source).await?);
        let llm = llm::create_client(&config.llm, config.pipeline.generation_timeout_secs)?;
        let engine = engine::connect(&config.engine).await?;
        info!(
            llm = %config.llm.provider,
            engine = %config.engine.backend,
            schema_version = catalog.version(),
            "Pipeline ready"
        );
        Ok(Self::with_components(config, catalog, llm, engine))
    }

    /// Builds an app from already-constructed collaborators.
    pub fn with_components(
        config: &Config,
        catalog: Arc<SchemaCatalog>,
        llm: Arc<dyn LlmClient>,
        engine: Arc<dyn QueryEngine>,
    ) -> Self {
        let refresh = (config.catalog.refresh_interval_secs > 0).then(|| {
            let cancel = CancellationToken::new();
            let handle = Arc::clone(&catalog).spawn_refresh_task(
                Duration::from_secs(config.catalog.refresh_interval_secs),
                cancel.clone(),
            );
            (cancel, handle)
        });

        Self {
            orchestrator: Orchestrator::from_config(config, catalog, llm, engine),
            refresh,
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Answers one question.
    pub async fn ask(&self, question: &Question, cancel: &CancellationToken) -> Answer {
        self.orchestrator.answer(question, cancel).await
    }

    /// Decodes a raw JSON request and answers it. Undecodable requests yield
    /// a failed answer with `InvalidRequest`.
    pub async fn handle_request(&self, raw: &str, cancel: &CancellationToken) -> Answer {
        match parse_request(raw) {
            Ok(question) => self.ask(&question, cancel).await,
            Err(e) => {
                tracing::warn!("Rejected request: {}", e);
                Answer::rejected_request(crate::query::next_request_id(), e)
            }
        }
    }

    /// Describes the named tables, or every table.
    pub fn describe(&self, tables: &[String]) -> Vec<SchemaDescriptor> {
        let catalog = self.orchestrator.catalog();
        if tables.is_empty() {
            return catalog.describe(None);
        }
        let names: HashSet<String> = tables.iter().cloned().collect();
        catalog.describe(Some(&names))
    }

    /// Runs the validator on hand-written SQL against the current snapshot.
    pub fn validate_sql(&self, sql: &str) -> QueryCandidate {
        let snapshot = self.orchestrator.catalog().snapshot();
        let candidate = QueryCandidate::manual(sql, snapshot.version);
        self.orchestrator.validator().validate(candidate, &snapshot)
    }

    /// Stops the background refresh task, if any.
    pub async fn shutdown(self) {
        if let Some((cancel, handle)) = self.refresh {
            cancel.cancel();
            let _ = handle.await;
        }
    }
}

async fn metadata_source(config: &Config) -> Result<Arc<dyn MetadataSource>> {
    match config.catalog.source {
        CatalogSourceKind::Builtin => Ok(Arc::new(BuiltinSource)),
        CatalogSourceKind::File => {
            let path = config.catalog.path.clone().ok_or_else(|| {
                TripSqlError::config("catalog.path is required for the file source")
            })?;
            Ok(Arc::new(FileSource::new(path, config.engine.schema.clone())))
        }
        CatalogSourceKind::Postgres => {
            let pool = PgPool::connect(config.database_url()?)
                .await
                .map_err(|e| TripSqlError::catalog_unavailable(e.to_string()))?;
            Ok(Arc::new(PostgresSource::new(
                pool,
                vec![config.engine.schema.clone()],
            )))
        }
    }
}
