//! Terminal response of a request.

use serde::{Serialize, Serializer};
use std::time::Duration;

use super::RequestStage;
use crate::engine::{Row, Value};
use crate::error::{ErrorKind, TripSqlError};
use crate::query::ExecutionResult;

/// Final status of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AnswerStatus {
    Complete,
    Failed,
}

/// What a request produced.
///
/// A `Complete` answer carries the executed SQL, the rows, and a narrative
/// that may be empty when summarization degraded. A `Failed` answer carries
/// the error that ended the request and, when one was generated, the last
/// candidate SQL.
#[derive(Debug, Clone)]
pub struct Answer {
    pub request_id: String,
    pub status: AnswerStatus,
    pub sql: Option<String>,
    pub result: Option<ExecutionResult>,
    pub narrative: String,
    pub error: Option<TripSqlError>,
    pub schema_version: Option<u64>,
    pub generation_attempts: u32,
    pub stages: Vec<RequestStage>,
    pub warnings: Vec<String>,
    pub duration: Duration,
}

impl Answer {
    /// A failed answer for a request that never reached the pipeline.
    pub fn rejected_request(request_id: impl Into<String>, error: TripSqlError) -> Self {
        Self {
            request_id: request_id.into(),
            status: AnswerStatus::Failed,
            sql: None,
            result: None,
            narrative: String::new(),
            error: Some(error),
            schema_version: None,
            generation_attempts: 0,
            stages: vec![RequestStage::Received, RequestStage::Failed],
            warnings: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == AnswerStatus::Complete
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(TripSqlError::kind)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.result
            .iter()
            .flat_map(|r| r.columns.iter().map(|c| c.name.as_str()))
            .collect()
    }

    pub fn rows(&self) -> &[Row] {
        self.result
            .as_ref()
            .map(|r| r.rows.as_slice())
            .unwrap_or(&[])
    }

    pub fn truncated(&self) -> bool {
        self.result.as_ref().is_some_and(|r| r.truncated)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({
                "status": AnswerStatus::Failed,
                "error_kind": ErrorKind::Internal,
                "message": format!("failed to serialize answer: {}", e),
            })
        })
    }
}

/// Wire shape of an [`Answer`].
#[derive(Serialize)]
struct AnswerResponse<'a> {
    request_id: &'a str,
    status: AnswerStatus,
    sql: Option<&'a str>,
    columns: Vec<&'a str>,
    column_types: Vec<&'a str>,
    rows: &'a [Vec<Value>],
    row_count: usize,
    truncated: bool,
    narrative: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    schema_version: Option<u64>,
    generation_attempts: u32,
    execution_attempts: u32,
    stages: &'a [RequestStage],
    warnings: &'a [String],
    duration_ms: u64,
}

impl Serialize for Answer {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let result = self.result.as_ref();
        AnswerResponse {
            request_id: &self.request_id,
            status: self.status,
            sql: self.sql.as_deref(),
            columns: self.column_names(),
            column_types: result
                .iter()
                .flat_map(|r| r.columns.iter().map(|c| c.data_type.as_str()))
                .collect(),
            rows: self.rows(),
            row_count: result.map_or(0, |r| r.row_count),
            truncated: self.truncated(),
            narrative: &self.narrative,
            error_kind: self.error_kind(),
            message: self.error.as_ref().map(TripSqlError::message),
            schema_version: self.schema_version,
            generation_attempts: self.generation_attempts,
            execution_attempts: result.map_or(0, |r| r.attempts),
            stages: &self.stages,
            warnings: &self.warnings,
            duration_ms: self.duration.as_millis() as u64,
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ColumnInfo;

    fn complete() -> Answer {
        Answer {
            request_id: "req-1".to_string(),
            status: AnswerStatus::Complete,
            sql: Some("SELECT pickup_hr FROM v LIMIT 100".to_string()),
            result: Some(ExecutionResult {
                columns: vec![ColumnInfo::new("pickup_hr", "bigint")],
                rows: vec![vec![Value::Int(0)], vec![Value::Null]],
                row_count: 2,
                truncated: false,
                duration: Duration::from_millis(5),
                attempts: 1,
                total_rows_seen: Some(2),
            }),
            narrative: "Two hours.".to_string(),
            error: None,
            schema_version: Some(3),
            generation_attempts: 1,
            stages: vec![RequestStage::Received, RequestStage::Complete],
            warnings: vec![],
            duration: Duration::from_millis(42),
        }
    }

    #[test]
    fn test_complete_json_shape() {
        let json = complete().to_json();
        assert_eq!(json["status"], "COMPLETE");
        assert_eq!(json["sql"], "SELECT pickup_hr FROM v LIMIT 100");
        assert_eq!(json["columns"], serde_json::json!(["pickup_hr"]));
        assert_eq!(json["column_types"], serde_json::json!(["bigint"]));
        assert_eq!(json["rows"], serde_json::json!([[0], [null]]));
        assert_eq!(json["truncated"], false);
        assert_eq!(json["narrative"], "Two hours.");
        assert_eq!(json["duration_ms"], 42);
        assert!(json.get("error_kind").is_none());
        assert!(json.get("message").is_none());
    }

    #[test]
    fn test_failed_json_carries_kind_and_message() {
        let answer = Answer::rejected_request(
            "req-2",
            TripSqlError::invalid_request("Missing 'question' field"),
        );
        let json = answer.to_json();
        assert_eq!(json["status"], "FAILED");
        assert_eq!(json["error_kind"], "InvalidRequest");
        assert_eq!(json["message"], "Missing 'question' field");
        assert_eq!(json["rows"], serde_json::json!([]));
        assert_eq!(json["narrative"], "");
        assert_eq!(json["stages"], serde_json::json!(["RECEIVED", "FAILED"]));
    }
}
