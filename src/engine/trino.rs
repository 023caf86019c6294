//! Trino query engine.
//!
//! Speaks the Trino client REST protocol: a statement is POSTed to
//! `/v1/statement` and results are paged by following `nextUri` until it
//! disappears. Cancellation DELETEs the latest `nextUri` seen for the query.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::{ColumnInfo, EngineOutput, QueryEngine, QueryHandle, Row, Value};
use crate::config::EngineConfig;
use crate::error::{Result, TripSqlError};

/// Connect timeout for coordinator requests.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Trino error types that clear up on their own.
const TRANSIENT_ERROR_TYPES: &[&str] = &["INSUFFICIENT_RESOURCES"];

/// Trino error names that clear up on their own.
const TRANSIENT_ERROR_NAMES: &[&str] = &[
    "NO_NODES_AVAILABLE",
    "SERVER_STARTING_UP",
    "SERVER_SHUTTING_DOWN",
    "CLUSTER_OUT_OF_MEMORY",
    "EXCEEDED_GLOBAL_MEMORY_LIMIT",
    "TOO_MANY_REQUESTS_FAILED",
];

/// Trino client configuration.
#[derive(Debug, Clone)]
pub struct TrinoConfig {
    pub endpoint: String,
    pub catalog: String,
    pub schema: String,
    pub user: String,
}

impl TrinoConfig {
    pub fn from_engine_config(config: &EngineConfig) -> Self {
        Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            catalog: config.catalog.clone(),
            schema: config.schema.clone(),
            user: config.user.clone(),
        }
    }
}

/// Trino REST client.
#[derive(Debug, Clone)]
pub struct TrinoEngine {
    config: TrinoConfig,
    client: Client,
    /// Latest `nextUri` per running query id.
    next_uris: Arc<Mutex<HashMap<String, String>>>,
}

impl TrinoEngine {
    pub fn new(config: TrinoConfig) -> Result<Self> {
        Url::parse(&config.endpoint)
            .map_err(|e| TripSqlError::config(format!("Invalid Trino endpoint: {e}")))?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| TripSqlError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            next_uris: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    fn statement_url(&self) -> String {
        format!("{}/v1/statement", self.config.endpoint)
    }

    /// Records the page the coordinator will serve next. `None` means the
    /// query has no more pages.
    fn track(&self, query_id: &str, next_uri: Option<&str>) {
        let mut next_uris = self.next_uris.lock().unwrap_or_else(|e| e.into_inner());
        match next_uri {
            Some(uri) => {
                next_uris.insert(query_id.to_string(), uri.to_string());
            }
            None => {
                next_uris.remove(query_id);
            }
        }
    }

    /// The `nextUri` a cancel should DELETE: the latest one tracked while
    /// paging, else the one returned at submission.
    fn cancel_target(&self, handle: &QueryHandle) -> Option<String> {
        self.next_uris
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&handle.id)
            .or_else(|| handle.next_uri.clone())
    }

    /// Sends a request and decodes one page of results.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<QueryResults> {
        let response = request
            .header("X-Trino-User", &self.config.user)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TripSqlError::transient(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(Self::parse_error(status, &body));
        }

        let page: QueryResults = serde_json::from_str(&body).map_err(|e| {
            TripSqlError::execution_rejected(format!("Unexpected Trino response: {}", e))
        })?;

        if let Some(error) = &page.error {
            return Err(classify_query_error(error));
        }
        Ok(page)
    }

    /// Maps an HTTP failure from the coordinator.
    fn parse_error(status: StatusCode, body: &str) -> TripSqlError {
        match status {
            StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT => {
                TripSqlError::transient(format!("Trino unavailable ({})", status))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                TripSqlError::execution_rejected(format!("Permission denied ({}): {}", status, body))
            }
            _ => TripSqlError::execution_rejected(format!("Trino error ({}): {}", status, body)),
        }
    }

    /// Best-effort DELETE, used for cancellation and to abandon capped queries.
    async fn delete(&self, url: &str) {
        let result = self
            .client
            .delete(url)
            .header("X-Trino-User", &self.config.user)
            .send()
            .await;
        if let Err(e) = result {
            warn!("Failed to cancel Trino query at {}: {}", url, e);
        }
    }
}

#[async_trait]
impl QueryEngine for TrinoEngine {
    async fn submit(&self, sql: &str) -> Result<QueryHandle> {
        let request = self
            .client
            .post(self.statement_url())
            .header("X-Trino-Catalog", &self.config.catalog)
            .header("X-Trino-Schema", &self.config.schema)
            .body(sql.to_string());

        let page = self.send(request).await?;
        debug!(query_id = %page.id, "Submitted statement to Trino");

        self.track(&page.id, page.next_uri.as_deref());
        let mut handle = QueryHandle::new(page.id, sql);
        handle.next_uri = page.next_uri;
        if let Some(columns) = page.columns {
            handle.columns = columns.into_iter().map(Into::into).collect();
        }
        if let Some(data) = page.data {
            handle.prefetched = data.iter().map(|row| convert_row(row)).collect();
        }
        Ok(handle)
    }

    async fn fetch(&self, handle: &QueryHandle, max_rows: usize) -> Result<EngineOutput> {
        let mut columns = handle.columns.clone();
        let mut rows: Vec<Row> = handle.prefetched.clone();
        let mut next_uri = handle.next_uri.clone();

        // One row past the cap tells us whether the result was truncated.
        while rows.len() <= max_rows {
            let Some(uri) = next_uri.take() else {
                break;
            };
            let page = self.send(self.client.get(&uri)).await?;
            self.track(&handle.id, page.next_uri.as_deref());

            if columns.is_empty() {
                if let Some(cols) = page.columns {
                    columns = cols.into_iter().map(Into::into).collect();
                }
            }
            if let Some(data) = page.data {
                rows.extend(data.iter().map(|row| convert_row(row)));
            }
            next_uri = page.next_uri;
        }

        self.track(&handle.id, None);
        let truncated = rows.len() > max_rows;
        if truncated {
            rows.truncate(max_rows);
            if let Some(uri) = next_uri {
                debug!(query_id = %handle.id, "Row cap reached, abandoning remaining pages");
                self.delete(&uri).await;
            }
        }

        let total_rows = (!truncated).then_some(rows.len());
        Ok(EngineOutput {
            columns,
            rows,
            truncated,
            total_rows,
        })
    }

    async fn cancel(&self, handle: &QueryHandle) -> Result<()> {
        match self.cancel_target(handle) {
            Some(uri) => self.delete(&uri).await,
            None => debug!(query_id = %handle.id, "Query already finished, nothing to cancel"),
        }
        Ok(())
    }

    fn supports_cancellation(&self) -> bool {
        true
    }
}

fn map_transport_error(e: reqwest::Error) -> TripSqlError {
    if e.is_timeout() || e.is_connect() {
        TripSqlError::transient(format!("Trino unreachable: {}", e))
    } else {
        TripSqlError::transient(format!("Request failed: {}", e))
    }
}

fn classify_query_error(error: &QueryError) -> TripSqlError {
    let error_type = error.error_type.as_deref().unwrap_or_default();
    let error_name = error.error_name.as_deref().unwrap_or_default();
    let message = format!("{}: {}", error_name, error.message);

    if TRANSIENT_ERROR_TYPES.contains(&error_type) || TRANSIENT_ERROR_NAMES.contains(&error_name) {
        TripSqlError::transient(message)
    } else {
        TripSqlError::execution_rejected(message)
    }
}

fn convert_row(row: &[serde_json::Value]) -> Row {
    row.iter().map(Value::from_json).collect()
}

// Trino REST protocol types

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResults {
    id: String,
    next_uri: Option<String>,
    columns: Option<Vec<TrinoColumn>>,
    data: Option<Vec<Vec<serde_json::Value>>>,
    error: Option<QueryError>,
}

#[derive(Debug, Deserialize)]
struct TrinoColumn {
    name: String,
    #[serde(rename = "type")]
    column_type: String,
}

impl From<TrinoColumn> for ColumnInfo {
    fn from(col: TrinoColumn) -> Self {
        ColumnInfo::new(col.name, col.column_type)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryError {
    message: String,
    error_name: Option<String>,
    error_type: Option<String>,
}
