//! PostgreSQL query engine.
//!
//! Runs validated statements through a sqlx pool. Rows are streamed and the
//! stream is dropped once the cap is exceeded, so oversized results are never
//! fully materialized.

use super::{ColumnInfo, EngineOutput, QueryEngine, QueryHandle, Row, Value};
use crate::error::{Result, TripSqlError};
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column as SqlxColumn, Executor, Row as SqlxRow, Statement, TypeInfo};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Maximum number of connection retry attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// PostgreSQL-backed query engine.
#[derive(Debug)]
pub struct PostgresEngine {
    pool: PgPool,
    next_id: AtomicU64,
}

impl PostgresEngine {
    /// Connects with bounded retries on transient failures.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
        let mut attempt = 1;

        loop {
            debug!("Connection attempt {} of {}", attempt, MAX_RETRY_ATTEMPTS);

            let result = PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(10))
                .connect(database_url)
                .await;

            match result {
                Ok(pool) => {
                    debug!("Connected to PostgreSQL");
                    return Ok(Self::from_pool(pool));
                }
                Err(e) if attempt < MAX_RETRY_ATTEMPTS && is_transient_error(&e) => {
                    warn!(
                        "Connection attempt {} failed (transient error), retrying in {:?}",
                        attempt, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(TripSqlError::execution_unavailable(format!(
                        "Cannot connect to PostgreSQL: {e}"
                    )))
                }
            }
        }
    }

    /// Creates an engine from an existing connection pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            next_id: AtomicU64::new(1),
        }
    }

    /// Returns the underlying pool, shared with the catalog source.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Column metadata for a statement that returned no rows.
    async fn describe_columns(&self, sql: &str) -> Vec<ColumnInfo> {
        match (&self.pool).prepare(sql).await {
            Ok(statement) => statement
                .columns()
                .iter()
                .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                .collect(),
            Err(e) => {
                debug!("Could not describe empty result: {e}");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl QueryEngine for PostgresEngine {
    async fn submit(&self, sql: &str) -> Result<QueryHandle> {
        let id = format!("pg-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        Ok(QueryHandle::new(id, sql))
    }

    async fn fetch(&self, handle: &QueryHandle, max_rows: usize) -> Result<EngineOutput> {
        let mut stream = sqlx::query(&handle.sql).fetch(&self.pool);
        let mut columns: Option<Vec<ColumnInfo>> = None;
        let mut rows: Vec<Row> = Vec::new();
        let mut truncated = false;

        while let Some(row) = stream.try_next().await.map_err(map_query_error)? {
            if columns.is_none() {
                columns = Some(
                    row.columns()
                        .iter()
                        .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                        .collect(),
                );
            }
            if rows.len() == max_rows {
                truncated = true;
                break;
            }
            rows.push(convert_row(&row));
        }
        drop(stream);

        if truncated {
            warn!("Query returned more than {} rows, truncating", max_rows);
        }

        let columns = match columns {
            Some(columns) => columns,
            None => self.describe_columns(&handle.sql).await,
        };

        let total_rows = (!truncated).then_some(rows.len());
        Ok(EngineOutput {
            columns,
            rows,
            truncated,
            total_rows,
        })
    }

    async fn cancel(&self, _handle: &QueryHandle) -> Result<()> {
        // Dropping the fetch future closes the stream client-side.
        Ok(())
    }

    fn supports_cancellation(&self) -> bool {
        false
    }
}

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Converts a single column value by its PostgreSQL type name.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    match type_name.to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),

        "INT2" | "SMALLINT" => row
            .try_get::<Option<i16>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT4" | "INT" | "INTEGER" => row
            .try_get::<Option<i32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT8" | "BIGINT" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),

        "FLOAT4" | "REAL" => row
            .try_get::<Option<f32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Float(v as f64))
            .unwrap_or(Value::Null),

        "FLOAT8" | "DOUBLE PRECISION" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),

        _ => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

/// SQLSTATE classes worth retrying: insufficient resources, operator
/// intervention (e.g. `cannot_connect_now`), serialization failures.
fn is_transient_sqlstate(code: &str) -> bool {
    code.starts_with("53") || code.starts_with("57P") || code == "40001" || code == "40P01"
}

/// Determines if a connection-level error is transient and worth retrying.
fn is_transient_error(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db) => db.code().is_some_and(|c| is_transient_sqlstate(&c)),
        other => {
            let error_str = other.to_string().to_lowercase();
            error_str.contains("connection refused")
                || error_str.contains("timed out")
                || error_str.contains("temporarily unavailable")
                || error_str.contains("connection reset")
                || error_str.contains("broken pipe")
        }
    }
}

/// Maps a query error to `Transient` or `ExecutionRejected`.
fn map_query_error(error: sqlx::Error) -> TripSqlError {
    if is_transient_error(&error) {
        return TripSqlError::transient(error.to_string());
    }
    TripSqlError::execution_rejected(format_query_error(&error))
}

/// Formats a query error with detail and hint if available.
fn format_query_error(error: &sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = String::from("ERROR: ");
    result.push_str(db_error.message());

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\n  DETAIL: ");
            result.push_str(detail);
        }
        if let Some(hint) = pg_error.hint() {
            result.push_str("\n  HINT: ");
            result.push_str(hint);
        }
    }

    result
}
