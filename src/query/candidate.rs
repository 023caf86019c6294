//! Generated SQL candidates and their validation status.

use serde::Serialize;
use std::fmt;

use crate::error::{ErrorKind, TripSqlError};

/// Where a candidate is in validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValidationStatus {
    Unvalidated,
    Valid,
    Rejected,
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unvalidated => write!(f, "UNVALIDATED"),
            Self::Valid => write!(f, "VALID"),
            Self::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// A SQL statement produced by the generator (or written by hand).
///
/// Only the validator moves a candidate out of `Unvalidated`, and only a
/// `Valid` candidate is accepted by the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryCandidate {
    /// SQL text. After validation this is the statement that will run,
    /// including any injected row limit.
    pub sql: String,
    /// Catalog version the candidate was generated against.
    pub schema_version: u64,
    /// 1-based generation attempt within the request.
    pub attempt: u32,
    /// Projection aliases collected during validation.
    pub output_names: Vec<String>,
    status: ValidationStatus,
    reason: Option<TripSqlError>,
}

impl QueryCandidate {
    /// Creates an unvalidated candidate.
    pub fn new(sql: impl Into<String>, schema_version: u64, attempt: u32) -> Self {
        Self {
            sql: sql.into(),
            schema_version,
            attempt,
            output_names: Vec::new(),
            status: ValidationStatus::Unvalidated,
            reason: None,
        }
    }

    /// A candidate for hand-written SQL.
    pub fn manual(sql: impl Into<String>, schema_version: u64) -> Self {
        Self::new(sql, schema_version, 0)
    }

    pub fn status(&self) -> ValidationStatus {
        self.status
    }

    pub fn is_valid(&self) -> bool {
        self.status == ValidationStatus::Valid
    }

    /// The rejection reason, set only when `Rejected`.
    pub fn reason(&self) -> Option<&TripSqlError> {
        self.reason.as_ref()
    }

    pub fn reason_kind(&self) -> Option<ErrorKind> {
        self.reason.as_ref().map(TripSqlError::kind)
    }

    pub(crate) fn mark_valid(&mut self, sql: String, output_names: Vec<String>) {
        self.sql = sql;
        self.output_names = output_names;
        self.status = ValidationStatus::Valid;
        self.reason = None;
    }

    pub(crate) fn mark_rejected(&mut self, reason: TripSqlError) {
        self.status = ValidationStatus::Rejected;
        self.reason = Some(reason);
    }

    /// JSON view used by the `validate` command.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "sql": self.sql,
            "status": self.status,
            "reason": self.reason_kind(),
            "message": self.reason.as_ref().map(|r| r.message().to_string()),
            "output_names": self.output_names,
            "schema_version": self.schema_version,
        })
    }
}
