//! Configuration management for tripsql.
//!
//! Loads configuration from a TOML file, then applies `TRIPSQL_*` environment
//! overrides. Every section has defaults, so an absent file is valid.

use crate::engine::EngineBackend;
use crate::error::{Result, TripSqlError};
use crate::llm::LlmProvider;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Main configuration structure for tripsql.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Query engine connection.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Text-generation provider.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Pipeline bounds (row cap, timeouts, retries).
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Schema catalog source and allow-list.
    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// Query engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub backend: EngineBackend,

    /// Trino coordinator URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Trino catalog holding the curated schema.
    #[serde(default = "default_engine_catalog")]
    pub catalog: String,

    /// Default schema; unqualified table references resolve here.
    #[serde(default = "default_schema")]
    pub schema: String,

    /// User reported to the engine.
    #[serde(default = "default_user")]
    pub user: String,

    /// PostgreSQL connection string, for the postgres backend.
    pub database_url: Option<String>,
}

fn default_endpoint() -> String {
    "http://localhost:8080".to_string()
}

fn default_engine_catalog() -> String {
    "hive".to_string()
}

fn default_schema() -> String {
    "nyc_taxi".to_string()
}

fn default_user() -> String {
    "tripsql".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: EngineBackend::default(),
            endpoint: default_endpoint(),
            catalog: default_engine_catalog(),
            schema: default_schema(),
            user: default_user(),
            database_url: None,
        }
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,

    /// Model name. Falls back to the provider's default when unset.
    pub model: Option<String>,

    /// Token budget for SQL generation.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Token budget for result summaries.
    #[serde(default = "default_summary_max_tokens")]
    pub summary_max_tokens: u32,
}

fn default_max_tokens() -> u32 {
    300
}

fn default_summary_max_tokens() -> u32 {
    150
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            model: None,
            max_tokens: default_max_tokens(),
            summary_max_tokens: default_summary_max_tokens(),
        }
    }
}

/// Pipeline bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub default_row_cap: usize,
    pub execution_timeout_secs: u64,
    pub generation_timeout_secs: u64,
    /// Regenerations after a rejected candidate; total candidates is this plus one.
    pub max_regenerations: u32,
    pub execution_max_attempts: u32,
    pub generation_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Character budget for the schema section of the prompt.
    pub prompt_char_budget: usize,
    /// Rows shown to the summarizer.
    pub summary_preview_rows: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_row_cap: 100,
            execution_timeout_secs: 60,
            generation_timeout_secs: 30,
            max_regenerations: 1,
            execution_max_attempts: 3,
            generation_max_attempts: 3,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 8000,
            prompt_char_budget: 6000,
            summary_preview_rows: 30,
        }
    }
}

impl PipelineConfig {
    /// Retry policy for the query executor.
    pub fn execution_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.execution_max_attempts,
            Duration::from_secs(self.execution_timeout_secs),
        )
        .with_backoff(
            Duration::from_millis(self.retry_base_delay_ms),
            Duration::from_millis(self.retry_max_delay_ms),
        )
    }

    /// Retry policy for the query generator and the summarizer.
    pub fn generation_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.generation_max_attempts,
            Duration::from_secs(self.generation_timeout_secs),
        )
        .with_backoff(
            Duration::from_millis(self.retry_base_delay_ms),
            Duration::from_millis(self.retry_max_delay_ms),
        )
    }
}

/// Where catalog metadata comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogSourceKind {
    /// The curated NYC taxi schema compiled into the binary.
    #[default]
    Builtin,
    /// A TOML file of table descriptors.
    File,
    /// PostgreSQL `information_schema`.
    Postgres,
}

/// Schema catalog configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub source: CatalogSourceKind,

    /// Descriptor file, for the file source.
    pub path: Option<PathBuf>,

    /// Tables generated SQL may read: `schema.table`, bare `table`, or `schema.*`.
    #[serde(default = "default_allowed_tables")]
    pub allowed_tables: Vec<String>,

    /// Tables the prompt falls back to when nothing in the question matches.
    #[serde(default = "default_core_tables")]
    pub core_tables: Vec<String>,

    /// Background refresh interval; 0 disables it.
    #[serde(default)]
    pub refresh_interval_secs: u64,
}

fn default_allowed_tables() -> Vec<String> {
    vec![
        "nyc_taxi.yellow_curated".to_string(),
        "nyc_taxi.taxi_zone_lookup".to_string(),
        "nyc_taxi.v_trips_borough_hour".to_string(),
    ]
}

fn default_core_tables() -> Vec<String> {
    vec![
        "nyc_taxi.yellow_curated".to_string(),
        "nyc_taxi.taxi_zone_lookup".to_string(),
    ]
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            source: CatalogSourceKind::default(),
            path: None,
            allowed_tables: default_allowed_tables(),
            core_tables: default_core_tables(),
            refresh_interval_secs: 0,
        }
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tripsql")
            .join("config.toml")
    }

    /// Loads the file (or defaults), applies environment overrides and validates.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_path);
        let mut config = Self::load_from_file(&path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file. A missing file yields defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| TripSqlError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            TripSqlError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Applies `TRIPSQL_*` overrides using the given variable lookup.
    pub fn apply_env_overrides<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = var("TRIPSQL_MAX_ROWS") {
            self.pipeline.default_row_cap = parse_number("TRIPSQL_MAX_ROWS", &v)?;
        }
        if let Some(v) = var("TRIPSQL_ALLOWED_TABLES") {
            self.catalog.allowed_tables = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = var("TRIPSQL_LLM_PROVIDER") {
            self.llm.provider = v.parse().map_err(TripSqlError::config)?;
        }
        if let Some(v) = var("TRIPSQL_MODEL") {
            self.llm.model = Some(v);
        }
        if let Some(v) = var("TRIPSQL_ENGINE") {
            self.engine.backend = v.parse().map_err(TripSqlError::config)?;
        }
        if let Some(v) = var("TRIPSQL_ENGINE_ENDPOINT") {
            self.engine.endpoint = v;
        }
        if let Some(v) = var("TRIPSQL_ENGINE_SCHEMA") {
            self.engine.schema = v;
        }
        if let Some(v) = var("TRIPSQL_DATABASE_URL") {
            self.engine.database_url = Some(v);
        }
        if let Some(v) = var("TRIPSQL_EXECUTION_TIMEOUT_SECS") {
            self.pipeline.execution_timeout_secs =
                parse_number("TRIPSQL_EXECUTION_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = var("TRIPSQL_GENERATION_TIMEOUT_SECS") {
            self.pipeline.generation_timeout_secs =
                parse_number("TRIPSQL_GENERATION_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = var("TRIPSQL_MAX_REGENERATIONS") {
            self.pipeline.max_regenerations = parse_number("TRIPSQL_MAX_REGENERATIONS", &v)?;
        }
        Ok(())
    }

    /// Rejects settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let p = &self.pipeline;
        if p.default_row_cap == 0 {
            return Err(TripSqlError::config("default_row_cap must be positive"));
        }
        if p.execution_timeout_secs == 0 || p.generation_timeout_secs == 0 {
            return Err(TripSqlError::config("timeouts must be positive"));
        }
        if p.execution_max_attempts == 0 || p.generation_max_attempts == 0 {
            return Err(TripSqlError::config("attempt counts must be positive"));
        }
        if self.catalog.allowed_tables.is_empty() {
            return Err(TripSqlError::config("allowed_tables must not be empty"));
        }
        if self.catalog.source == CatalogSourceKind::File && self.catalog.path.is_none() {
            return Err(TripSqlError::config(
                "catalog.path is required for the file source",
            ));
        }

        match self.engine.backend {
            EngineBackend::Trino => {
                let url = Url::parse(&self.engine.endpoint).map_err(|e| {
                    TripSqlError::config(format!("Invalid engine endpoint: {e}"))
                })?;
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(TripSqlError::config(format!(
                        "Invalid scheme '{}'. Expected 'http' or 'https'",
                        url.scheme()
                    )));
                }
            }
            EngineBackend::Postgres => {
                self.database_url()?;
            }
            EngineBackend::Mock => {}
        }

        if self.catalog.source == CatalogSourceKind::Postgres {
            self.database_url()?;
        }
        Ok(())
    }

    /// Returns the PostgreSQL connection string, checking its scheme.
    pub fn database_url(&self) -> Result<&str> {
        let conn_str = self
            .engine
            .database_url
            .as_deref()
            .ok_or_else(|| TripSqlError::config("engine.database_url is required"))?;

        let url = Url::parse(conn_str)
            .map_err(|e| TripSqlError::config(format!("Invalid connection string: {e}")))?;
        if url.scheme() != "postgres" && url.scheme() != "postgresql" {
            return Err(TripSqlError::config(format!(
                "Invalid scheme '{}'. Expected 'postgres' or 'postgresql'",
                url.scheme()
            )));
        }
        Ok(conn_str)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| TripSqlError::config(format!("{key} must be a number, got '{value}'")))
}
