//! Query engine abstraction for tripsql.
//!
//! The executor talks to engines through [`QueryEngine`], which splits a query
//! into submit / fetch / cancel so that a timed-out statement can be killed on
//! the engine side.

mod mock;
mod postgres;
mod trino;
mod types;

pub use mock::{MockEngine, MockOutcome};
pub use postgres::PostgresEngine;
pub use trino::{TrinoConfig, TrinoEngine};
pub use types::{ColumnInfo, EngineOutput, QueryHandle, Row, Value};

use crate::config::EngineConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::str::FromStr;
use std::sync::Arc;

/// Supported query engine backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineBackend {
    /// Trino / Presto-compatible REST coordinator.
    #[default]
    Trino,
    /// PostgreSQL via sqlx.
    Postgres,
    /// In-memory engine with the demo data set.
    Mock,
}

impl EngineBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trino => "trino",
            Self::Postgres => "postgres",
            Self::Mock => "mock",
        }
    }
}

impl FromStr for EngineBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trino" | "presto" => Ok(Self::Trino),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mock" => Ok(Self::Mock),
            _ => Err(format!("Unknown engine backend: {}", s)),
        }
    }
}

impl std::fmt::Display for EngineBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Creates a query engine for the configured backend.
pub async fn connect(config: &EngineConfig) -> Result<Arc<dyn QueryEngine>> {
    match config.backend {
        EngineBackend::Trino => {
            let engine = TrinoEngine::new(TrinoConfig::from_engine_config(config))?;
            Ok(Arc::new(engine))
        }
        EngineBackend::Postgres => {
            let url = config.database_url.as_deref().ok_or_else(|| {
                crate::error::TripSqlError::config("engine.database_url is required")
            })?;
            let engine = PostgresEngine::connect(url).await?;
            Ok(Arc::new(engine))
        }
        EngineBackend::Mock => Ok(Arc::new(MockEngine::demo())),
    }
}

/// Interface to a SQL query engine.
///
/// Errors are `Transient` for conditions worth retrying (throttling, temporary
/// unavailability) and `ExecutionRejected` for anything the engine refused.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Submits a statement and returns a handle to its results.
    async fn submit(&self, sql: &str) -> Result<QueryHandle>;

    /// Reads up to `max_rows` rows, setting `truncated` if more were available.
    async fn fetch(&self, handle: &QueryHandle, max_rows: usize) -> Result<EngineOutput>;

    /// Cancels a running statement. A no-op for engines without remote cancellation.
    async fn cancel(&self, handle: &QueryHandle) -> Result<()>;

    /// Returns true if [`QueryEngine::cancel`] stops work on the engine side.
    fn supports_cancellation(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_from_str() {
        assert_eq!("trino".parse::<EngineBackend>().unwrap(), EngineBackend::Trino);
        assert_eq!("Presto".parse::<EngineBackend>().unwrap(), EngineBackend::Trino);
        assert_eq!(
            "postgresql".parse::<EngineBackend>().unwrap(),
            EngineBackend::Postgres
        );
        assert_eq!("mock".parse::<EngineBackend>().unwrap(), EngineBackend::Mock);
        assert!("athena".parse::<EngineBackend>().is_err());
    }

    #[test]
    fn test_backend_display() {
        assert_eq!(EngineBackend::Trino.to_string(), "trino");
        assert_eq!(EngineBackend::default(), EngineBackend::Trino);
    }

    #[tokio::test]
    async fn test_connect_mock() {
        let config = EngineConfig {
            backend: EngineBackend::Mock,
            ..EngineConfig::default()
        };
        let engine = connect(&config).await.unwrap();
        assert!(engine.supports_cancellation());
    }
}
