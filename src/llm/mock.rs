//! Mock LLM client for testing and `--mock` runs.
//!
//! SQL requests are answered from a script, then from pattern mappings, then
//! from built-in demo queries. Summary requests get a narrative assembled from
//! the preview rows in the prompt, so it never cites figures the result lacks.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{Result, TripSqlError};
use crate::llm::types::{CompletionOptions, Message, Role};
use crate::llm::LlmClient;

/// Hourly trips and revenue for Manhattan pickups on 2024-08-01.
pub const DEMO_HOURLY_SQL: &str = "SELECT EXTRACT(HOUR FROM pickup_hour) AS pickup_hr, \
COUNT(*) AS trips, SUM(total_amount) AS revenue \
FROM nyc_taxi.v_trips_borough_hour \
WHERE pickup_borough = 'Manhattan' AND CAST(pickup_hour AS DATE) = DATE '2024-08-01' \
GROUP BY 1 ORDER BY 1";

/// Average tip percentage by pickup borough in 2024.
pub const DEMO_TIP_SQL: &str = "SELECT zpu.Borough AS pickup_borough, \
AVG(y.tip_amount / NULLIF(y.fare_amount, 0)) AS avg_tip_pct \
FROM nyc_taxi.yellow_curated y \
JOIN nyc_taxi.taxi_zone_lookup zpu ON y.pulocationid = zpu.LocationID \
WHERE y.year = 2024 AND y.fare_amount > 0 \
GROUP BY zpu.Borough ORDER BY avg_tip_pct DESC";

/// Trip counts by pickup borough.
pub const DEMO_BOROUGH_SQL: &str = "SELECT zpu.Borough AS pickup_borough, COUNT(*) AS trips \
FROM nyc_taxi.yellow_curated y \
JOIN nyc_taxi.taxi_zone_lookup zpu ON y.pulocationid = zpu.LocationID \
GROUP BY 1 ORDER BY 2 DESC";

/// A scripted reply.
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    Text(String),
    Error(TripSqlError),
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    fn into_result(self) -> Result<String> {
        match self {
            Self::Text(text) => Ok(text),
            Self::Error(e) => Err(e),
        }
    }
}

/// Mock LLM client with deterministic responses.
///
/// Clones share their script, counters and request log, so a test can keep a
/// clone to inspect after handing one to the pipeline.
#[derive(Debug, Clone, Default)]
pub struct MockLlmClient {
    /// Custom response mappings (pattern -> response).
    custom_responses: Vec<(String, String)>,
    sql_script: Arc<Mutex<VecDeque<MockReply>>>,
    summary_reply: Option<MockReply>,
    delay: Duration,
    sql_calls: Arc<AtomicUsize>,
    summary_calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl MockLlmClient {
    /// Creates a new mock client with default responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a custom response mapping.
    ///
    /// When the question contains `pattern`, the mock returns `response`.
    pub fn with_response(mut self, pattern: impl Into<String>, response: impl Into<String>) -> Self {
        self.custom_responses
            .push((pattern.into().to_lowercase(), response.into()));
        self
    }

    /// Queues replies for SQL requests, consumed in order before any pattern.
    pub fn with_sql_script(self, replies: impl IntoIterator<Item = MockReply>) -> Self {
        self.sql_script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(replies);
        self
    }

    /// Fixes the reply to every summary request.
    pub fn with_summary(mut self, reply: MockReply) -> Self {
        self.summary_reply = Some(reply);
        self
    }

    /// Delays every call, to exercise timeouts and cancellation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of SQL generation calls received.
    pub fn sql_calls(&self) -> usize {
        self.sql_calls.load(Ordering::SeqCst)
    }

    /// Number of summary calls received.
    pub fn summary_calls(&self) -> usize {
        self.summary_calls.load(Ordering::SeqCst)
    }

    /// Every message list received, in order.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Summary prompts ask for an insight summary; everything else wants SQL.
    fn is_summary_request(messages: &[Message]) -> bool {
        messages
            .iter()
            .any(|m| m.role == Role::System && m.content.contains("insight summary"))
    }

    fn last_user_input(messages: &[Message]) -> &str {
        messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }

    /// The question section of a generation prompt, so schema text in the
    /// same message does not influence pattern matching.
    fn question_text(input: &str) -> &str {
        match input.split_once("User question:") {
            Some((_, rest)) => rest.trim_start().split("\n\n").next().unwrap_or_default(),
            None => input,
        }
    }

    fn sql_response(&self, input: &str) -> String {
        let input_lower = input.to_lowercase();

        for (pattern, response) in &self.custom_responses {
            if input_lower.contains(pattern) {
                return response.clone();
            }
        }

        let sql = if input_lower.contains("tip") {
            DEMO_TIP_SQL
        } else if input_lower.contains("hour") || input_lower.contains("revenue") {
            DEMO_HOURLY_SQL
        } else {
            DEMO_BOROUGH_SQL
        };
        format!("```sql\n{}\n```", sql)
    }

    /// Builds a narrative from the `Rows returned:` line and the first
    /// preview row of a summary prompt.
    fn summary_response(input: &str) -> String {
        let row_count = input
            .lines()
            .find_map(|line| line.strip_prefix("Rows returned: "))
            .and_then(|rest| rest.split_whitespace().next())
            .unwrap_or("0");

        let mut tsv = input
            .lines()
            .skip_while(|line| !line.starts_with("Result preview"))
            .skip(1);
        let header = tsv.next().unwrap_or_default();
        let first = tsv.next().filter(|line| !line.trim().is_empty());

        match first {
            Some(first) => {
                let pairs = header
                    .split('\t')
                    .zip(first.split('\t'))
                    .map(|(name, value)| format!("{} {}", name, value))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("The query returned {} rows. The first row shows {}.", row_count, pairs)
            }
            None => "The query returned no rows.".to_string(),
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message], _options: &CompletionOptions) -> Result<String> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(messages.to_vec());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let input = Self::last_user_input(messages);

        if Self::is_summary_request(messages) {
            self.summary_calls.fetch_add(1, Ordering::SeqCst);
            return match &self.summary_reply {
                Some(reply) => reply.clone().into_result(),
                None => Ok(Self::summary_response(input)),
            };
        }

        self.sql_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .sql_script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match scripted {
            Some(reply) => reply.into_result(),
            None => Ok(self.sql_response(Self::question_text(input))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> CompletionOptions {
        CompletionOptions::default()
    }

    #[tokio::test]
    async fn test_mock_demo_hourly() {
        let client = MockLlmClient::new();
        let messages = vec![Message::user("Trips and revenue by hour for Manhattan")];
        let response = client.complete(&messages, &options()).await.unwrap();
        assert!(response.contains("EXTRACT(HOUR FROM pickup_hour)"));
        assert_eq!(client.sql_calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_demo_tip() {
        let client = MockLlmClient::new();
        let messages = vec![Message::user("Average TIP percentage by borough")];
        let response = client.complete(&messages, &options()).await.unwrap();
        assert!(response.contains("avg_tip_pct"));
    }

    #[tokio::test]
    async fn test_mock_ignores_schema_text() {
        let client = MockLlmClient::new();
        let messages = vec![Message::user(
            "Schema:\n  - tip_amount: double\n\nUser question:\nTrips by borough\n\nReturn only SQL:",
        )];
        let response = client.complete(&messages, &options()).await.unwrap();
        assert!(response.contains("COUNT(*) AS trips"));
    }

    #[tokio::test]
    async fn test_mock_custom_response() {
        let client = MockLlmClient::new().with_response("Custom Query", "SELECT custom FROM t");
        let messages = vec![Message::user("Run the custom query")];
        let response = client.complete(&messages, &options()).await.unwrap();
        assert_eq!(response, "SELECT custom FROM t");
    }

    #[tokio::test]
    async fn test_mock_script_before_patterns() {
        let client = MockLlmClient::new().with_sql_script([
            MockReply::text("DROP TABLE nyc_taxi.yellow_curated"),
            MockReply::Error(TripSqlError::transient("throttled")),
        ]);
        let messages = vec![Message::user("revenue by hour")];

        let first = client.complete(&messages, &options()).await.unwrap();
        assert!(first.starts_with("DROP"));

        let second = client.complete(&messages, &options()).await.unwrap_err();
        assert!(second.is_transient());

        let third = client.complete(&messages, &options()).await.unwrap();
        assert!(third.contains("SELECT"));
        assert_eq!(client.sql_calls(), 3);
    }

    #[tokio::test]
    async fn test_mock_summary_uses_preview() {
        let client = MockLlmClient::new();
        let messages = vec![
            Message::system("You are a data analyst. Write a crisp insight summary."),
            Message::user(
                "Question: revenue by hour\n\nRows returned: 24 (truncated: no)\nResult preview (TSV, first 2 rows):\npickup_hr\ttrips\n0\t820\n1\t540\n",
            ),
        ];
        let response = client.complete(&messages, &options()).await.unwrap();
        assert_eq!(
            response,
            "The query returned 24 rows. The first row shows pickup_hr 0, trips 820."
        );
        assert_eq!(client.summary_calls(), 1);
        assert_eq!(client.sql_calls(), 0);
    }

    #[tokio::test]
    async fn test_mock_summary_empty_result() {
        let client = MockLlmClient::new();
        let messages = vec![
            Message::system("Write an insight summary."),
            Message::user("Rows returned: 0 (truncated: no)\nResult preview (TSV, first 0 rows):\npickup_hr\n"),
        ];
        let response = client.complete(&messages, &options()).await.unwrap();
        assert_eq!(response, "The query returned no rows.");
    }

    #[tokio::test]
    async fn test_clones_share_counters() {
        let client = MockLlmClient::new();
        let observer = client.clone();
        client
            .complete(&[Message::user("hello")], &options())
            .await
            .unwrap();
        assert_eq!(observer.sql_calls(), 1);
        assert_eq!(observer.requests().len(), 1);
    }
}
