//! Query execution with bounded retries.
//!
//! Runs validated candidates against a [`QueryEngine`]. Each attempt is a
//! submit followed by a capped fetch, bounded by the execution policy's
//! timeout. Transient failures and timeouts are retried with backoff; engine
//! rejections fail immediately.

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::{ColumnInfo, EngineOutput, QueryEngine, QueryHandle, Row};
use crate::error::{Result, TripSqlError};
use crate::query::QueryCandidate;
use crate::retry::RetryPolicy;

/// Rows returned by a successful execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Row>,
    pub row_count: usize,
    /// True if the row cap cut the result short.
    pub truncated: bool,
    #[serde(skip)]
    pub duration: Duration,
    /// Engine attempts used, including the successful one.
    pub attempts: u32,
    /// Rows the engine produced before capping, when it reports them.
    pub total_rows_seen: Option<usize>,
}

impl ExecutionResult {
    fn from_output(output: EngineOutput, duration: Duration, attempts: u32) -> Self {
        Self {
            row_count: output.rows.len(),
            columns: output.columns,
            rows: output.rows,
            truncated: output.truncated,
            duration,
            attempts,
            total_rows_seen: output.total_rows,
        }
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// How a single attempt ended.
enum AttemptError {
    TimedOut,
    Failed(TripSqlError),
}

/// Executes validated candidates.
#[derive(Clone)]
pub struct QueryExecutor {
    engine: Arc<dyn QueryEngine>,
    policy: RetryPolicy,
    row_cap: usize,
}

impl QueryExecutor {
    pub fn new(engine: Arc<dyn QueryEngine>, policy: RetryPolicy, row_cap: usize) -> Self {
        Self {
            engine,
            policy,
            row_cap,
        }
    }

    pub fn row_cap(&self) -> usize {
        self.row_cap
    }

    /// Runs a `Valid` candidate and returns at most `row_cap` rows.
    ///
    /// Fails with `ExecutionRejected` when the engine refuses the statement,
    /// `ExecutionTimeout` or `ExecutionUnavailable` when retries run out, and
    /// `Cancelled` when `cancel` fires.
    pub async fn execute(
        &self,
        candidate: &QueryCandidate,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult> {
        if !candidate.is_valid() {
            return Err(TripSqlError::internal(format!(
                "refusing to execute a {} candidate",
                candidate.status()
            )));
        }

        let start = Instant::now();
        let mut attempt = 1;
        loop {
            let failure = match self.attempt(&candidate.sql, cancel).await {
                Ok(output) => {
                    let result = ExecutionResult::from_output(output, start.elapsed(), attempt);
                    info!(
                        rows = result.row_count,
                        truncated = result.truncated,
                        attempts = attempt,
                        duration_ms = result.duration.as_millis() as u64,
                        "Query executed"
                    );
                    return Ok(result);
                }
                Err(AttemptError::Failed(e @ TripSqlError::ExecutionRejected(_))) => {
                    warn!(sql = %candidate.sql, "Engine rejected validated SQL: {}", e.message());
                    return Err(e);
                }
                Err(AttemptError::Failed(e @ TripSqlError::Cancelled(_))) => return Err(e),
                Err(AttemptError::Failed(e)) if e.is_transient() => AttemptError::Failed(e),
                Err(AttemptError::Failed(e)) => {
                    return Err(TripSqlError::execution_rejected(e.message().to_string()));
                }
                Err(timed_out) => timed_out,
            };

            if !self.policy.should_retry(attempt) {
                return Err(match failure {
                    AttemptError::TimedOut => TripSqlError::execution_timeout(format!(
                        "query did not finish within {}s (after {} attempts)",
                        self.policy.timeout.as_secs_f64(),
                        attempt
                    )),
                    AttemptError::Failed(e) => TripSqlError::execution_unavailable(format!(
                        "{} (after {} attempts)",
                        e.message(),
                        attempt
                    )),
                });
            }

            let delay = self.policy.delay_for(attempt);
            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                timed_out = matches!(failure, AttemptError::TimedOut),
                "Execution attempt failed, retrying"
            );
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(TripSqlError::cancelled("request cancelled during execution backoff"));
                }
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    async fn attempt(
        &self,
        sql: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<EngineOutput, AttemptError> {
        let deadline = tokio::time::Instant::now() + self.policy.timeout;

        let handle = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(AttemptError::Failed(TripSqlError::cancelled(
                    "request cancelled before the query was submitted",
                )));
            }
            submitted = tokio::time::timeout_at(deadline, self.engine.submit(sql)) => match submitted {
                Ok(Ok(handle)) => handle,
                Ok(Err(e)) => return Err(AttemptError::Failed(e)),
                Err(_) => return Err(AttemptError::TimedOut),
            },
        };
        debug!(query_id = %handle.id, "Query submitted");

        tokio::select! {
            _ = cancel.cancelled() => {
                self.cancel_remote(&handle).await;
                Err(AttemptError::Failed(TripSqlError::cancelled("request cancelled during execution")))
            }
            fetched = tokio::time::timeout_at(deadline, self.engine.fetch(&handle, self.row_cap)) => match fetched {
                Ok(Ok(output)) => Ok(output),
                Ok(Err(e)) => Err(AttemptError::Failed(e)),
                Err(_) => {
                    self.cancel_remote(&handle).await;
                    Err(AttemptError::TimedOut)
                }
            },
        }
    }

    async fn cancel_remote(&self, handle: &QueryHandle) {
        if !self.engine.supports_cancellation() {
            debug!(query_id = %handle.id, "Engine has no remote cancellation");
            return;
        }
        if let Err(e) = self.engine.cancel(handle).await {
            warn!(query_id = %handle.id, "Failed to cancel query: {}", e);
        }
    }
}
