//! Query generation.
//!
//! Sends a prompt to the text generator and turns the response into an
//! unvalidated [`QueryCandidate`]. Each call is bounded by the generation
//! policy's timeout; throttling and timeouts are retried with backoff up to
//! the policy's attempt bound.

mod extract;

pub use extract::{extract_sql, split_statements};

use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{Result, TripSqlError};
use crate::llm::{CompletionOptions, LlmClient};
use crate::prompt::PromptPayload;
use crate::query::QueryCandidate;
use crate::retry::RetryPolicy;

/// Produces SQL candidates from prompts.
#[derive(Clone)]
pub struct QueryGenerator {
    client: Arc<dyn LlmClient>,
    policy: RetryPolicy,
    options: CompletionOptions,
}

impl QueryGenerator {
    pub fn new(client: Arc<dyn LlmClient>, policy: RetryPolicy, options: CompletionOptions) -> Self {
        Self {
            client,
            policy,
            options,
        }
    }

    /// Generates a candidate for `payload`. `attempt` is the 1-based
    /// regeneration round recorded on the candidate.
    ///
    /// Fails with `GenerationFailed` on generator errors, timeouts, or
    /// exhausted retries, and with `AmbiguousGeneration` when the response
    /// does not hold exactly one statement.
    pub async fn generate(&self, payload: &PromptPayload, attempt: u32) -> Result<QueryCandidate> {
        let raw = self.complete_with_retry(payload).await?;
        let sql = extract_sql(&raw)?;
        debug!(
            request_id = %payload.request_id,
            attempt,
            revision = payload.revision,
            "Generated SQL candidate"
        );
        Ok(QueryCandidate::new(sql, payload.schema_version, attempt))
    }

    async fn complete_with_retry(&self, payload: &PromptPayload) -> Result<String> {
        let mut call = 1;
        loop {
            let outcome = tokio::time::timeout(
                self.policy.timeout,
                self.client.complete(&payload.messages, &self.options),
            )
            .await;

            let failure = match outcome {
                Ok(Ok(text)) => return Ok(text),
                Ok(Err(e)) if e.is_transient() => e.to_string(),
                Ok(Err(e)) => {
                    return Err(TripSqlError::generation_failed(e.message().to_string()));
                }
                Err(_) => format!(
                    "Generator did not respond within {}s",
                    self.policy.timeout.as_secs_f64()
                ),
            };

            if !self.policy.should_retry(call) {
                return Err(TripSqlError::generation_failed(format!(
                    "{} (after {} attempts)",
                    failure, call
                )));
            }

            let delay = self.policy.delay_for(call);
            warn!(
                request_id = %payload.request_id,
                call,
                delay_ms = delay.as_millis() as u64,
                "Generation failed, retrying: {}",
                failure
            );
            tokio::time::sleep(delay).await;
            call += 1;
        }
    }
}
