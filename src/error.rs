//! Error types for tripsql.
//!
//! Defines the error enum used throughout the pipeline and the serializable
//! [`ErrorKind`] that terminal responses carry.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Main error type for tripsql operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TripSqlError {
    /// The catalog metadata source could not be reached.
    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    /// The catalog holds no tables to build a prompt from.
    #[error("Schema empty: {0}")]
    SchemaEmpty(String),

    /// The text generator failed or timed out.
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    /// The generator response did not contain exactly one SQL statement.
    #[error("Ambiguous generation: {0}")]
    AmbiguousGeneration(String),

    /// DDL, DML, multiple statements, or unparseable SQL.
    #[error("Unsafe statement: {0}")]
    UnsafeStatement(String),

    /// A table or column that the schema snapshot does not know.
    #[error("Unknown reference: {0}")]
    UnknownReference(String),

    /// An unqualified column that more than one joined table provides.
    #[error("Ambiguous reference: {0}")]
    AmbiguousReference(String),

    /// A table outside the analytical allow-list.
    #[error("Forbidden table: {0}")]
    ForbiddenTable(String),

    /// The engine itself refused the query (syntax, semantics, permissions).
    #[error("Execution rejected: {0}")]
    ExecutionRejected(String),

    /// The query exceeded the execution timeout.
    #[error("Execution timed out: {0}")]
    ExecutionTimeout(String),

    /// Transient engine failures exhausted the retry bound.
    #[error("Execution unavailable: {0}")]
    ExecutionUnavailable(String),

    /// The summarizer could not narrate the result.
    #[error("Summarization failed: {0}")]
    SummarizationFailed(String),

    /// The caller aborted the request.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Retryable upstream condition (throttling, temporary unavailability).
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Non-retryable LLM API error (auth, malformed response, etc.)
    #[error("LLM error: {0}")]
    Llm(String),

    /// Malformed inbound request or filters.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TripSqlError {
    pub fn catalog_unavailable(msg: impl Into<String>) -> Self {
        Self::CatalogUnavailable(msg.into())
    }

    pub fn schema_empty(msg: impl Into<String>) -> Self {
        Self::SchemaEmpty(msg.into())
    }

    pub fn generation_failed(msg: impl Into<String>) -> Self {
        Self::GenerationFailed(msg.into())
    }

    pub fn ambiguous_generation(msg: impl Into<String>) -> Self {
        Self::AmbiguousGeneration(msg.into())
    }

    pub fn unsafe_statement(msg: impl Into<String>) -> Self {
        Self::UnsafeStatement(msg.into())
    }

    pub fn unknown_reference(msg: impl Into<String>) -> Self {
        Self::UnknownReference(msg.into())
    }

    pub fn ambiguous_reference(msg: impl Into<String>) -> Self {
        Self::AmbiguousReference(msg.into())
    }

    pub fn forbidden_table(msg: impl Into<String>) -> Self {
        Self::ForbiddenTable(msg.into())
    }

    pub fn execution_rejected(msg: impl Into<String>) -> Self {
        Self::ExecutionRejected(msg.into())
    }

    pub fn execution_timeout(msg: impl Into<String>) -> Self {
        Self::ExecutionTimeout(msg.into())
    }

    pub fn execution_unavailable(msg: impl Into<String>) -> Self {
        Self::ExecutionUnavailable(msg.into())
    }

    pub fn summarization_failed(msg: impl Into<String>) -> Self {
        Self::SummarizationFailed(msg.into())
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn llm(msg: impl Into<String>) -> Self {
        Self::Llm(msg.into())
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CatalogUnavailable(_) => ErrorKind::CatalogUnavailable,
            Self::SchemaEmpty(_) => ErrorKind::SchemaEmpty,
            Self::GenerationFailed(_) => ErrorKind::GenerationFailed,
            Self::AmbiguousGeneration(_) => ErrorKind::AmbiguousGeneration,
            Self::UnsafeStatement(_) => ErrorKind::UnsafeStatement,
            Self::UnknownReference(_) => ErrorKind::UnknownReference,
            Self::AmbiguousReference(_) => ErrorKind::AmbiguousReference,
            Self::ForbiddenTable(_) => ErrorKind::ForbiddenTable,
            Self::ExecutionRejected(_) => ErrorKind::ExecutionRejected,
            Self::ExecutionTimeout(_) => ErrorKind::ExecutionTimeout,
            Self::ExecutionUnavailable(_) => ErrorKind::ExecutionUnavailable,
            Self::SummarizationFailed(_) => ErrorKind::SummarizationFailed,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Transient(_) => ErrorKind::Transient,
            Self::Llm(_) => ErrorKind::Llm,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::Config(_) => ErrorKind::Config,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns the human-readable message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::CatalogUnavailable(m)
            | Self::SchemaEmpty(m)
            | Self::GenerationFailed(m)
            | Self::AmbiguousGeneration(m)
            | Self::UnsafeStatement(m)
            | Self::UnknownReference(m)
            | Self::AmbiguousReference(m)
            | Self::ForbiddenTable(m)
            | Self::ExecutionRejected(m)
            | Self::ExecutionTimeout(m)
            | Self::ExecutionUnavailable(m)
            | Self::SummarizationFailed(m)
            | Self::Cancelled(m)
            | Self::Transient(m)
            | Self::Llm(m)
            | Self::InvalidRequest(m)
            | Self::Config(m)
            | Self::Internal(m) => m,
        }
    }

    /// Returns true if retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::ExecutionTimeout(_))
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self.kind() {
            ErrorKind::CatalogUnavailable | ErrorKind::SchemaEmpty => "Catalog Error",
            ErrorKind::GenerationFailed | ErrorKind::AmbiguousGeneration | ErrorKind::Llm => {
                "Generation Error"
            }
            ErrorKind::UnsafeStatement
            | ErrorKind::UnknownReference
            | ErrorKind::AmbiguousReference
            | ErrorKind::ForbiddenTable => "Validation Error",
            ErrorKind::ExecutionRejected
            | ErrorKind::ExecutionTimeout
            | ErrorKind::ExecutionUnavailable
            | ErrorKind::Transient => "Execution Error",
            ErrorKind::SummarizationFailed => "Summary Error",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::InvalidRequest => "Request Error",
            ErrorKind::Config => "Configuration Error",
            ErrorKind::Internal => "Internal Error",
        }
    }
}

/// Serializable error kind carried by terminal responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    CatalogUnavailable,
    SchemaEmpty,
    GenerationFailed,
    AmbiguousGeneration,
    UnsafeStatement,
    UnknownReference,
    AmbiguousReference,
    ForbiddenTable,
    ExecutionRejected,
    ExecutionTimeout,
    ExecutionUnavailable,
    SummarizationFailed,
    Cancelled,
    Transient,
    Llm,
    InvalidRequest,
    Config,
    Internal,
}

impl ErrorKind {
    /// Returns the kind name as it appears in responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CatalogUnavailable => "CatalogUnavailable",
            Self::SchemaEmpty => "SchemaEmpty",
            Self::GenerationFailed => "GenerationFailed",
            Self::AmbiguousGeneration => "AmbiguousGeneration",
            Self::UnsafeStatement => "UnsafeStatement",
            Self::UnknownReference => "UnknownReference",
            Self::AmbiguousReference => "AmbiguousReference",
            Self::ForbiddenTable => "ForbiddenTable",
            Self::ExecutionRejected => "ExecutionRejected",
            Self::ExecutionTimeout => "ExecutionTimeout",
            Self::ExecutionUnavailable => "ExecutionUnavailable",
            Self::SummarizationFailed => "SummarizationFailed",
            Self::Cancelled => "Cancelled",
            Self::Transient => "Transient",
            Self::Llm => "Llm",
            Self::InvalidRequest => "InvalidRequest",
            Self::Config => "Config",
            Self::Internal => "Internal",
        }
    }

    /// Returns true for the validator kinds, which trigger regeneration.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::UnsafeStatement
                | Self::UnknownReference
                | Self::AmbiguousReference
                | Self::ForbiddenTable
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type alias using TripSqlError.
pub type Result<T> = std::result::Result<T, TripSqlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_unsafe_statement() {
        let err = TripSqlError::unsafe_statement("DROP is not allowed");
        assert_eq!(err.to_string(), "Unsafe statement: DROP is not allowed");
        assert_eq!(err.kind(), ErrorKind::UnsafeStatement);
        assert_eq!(err.category(), "Validation Error");
        assert_eq!(err.message(), "DROP is not allowed");
    }

    #[test]
    fn test_error_display_config() {
        let err = TripSqlError::config("default_row_cap must be positive");
        assert_eq!(
            err.to_string(),
            "Configuration error: default_row_cap must be positive"
        );
        assert_eq!(err.category(), "Configuration Error");
    }

    #[test]
    fn test_transient_classification() {
        assert!(TripSqlError::transient("429").is_transient());
        assert!(TripSqlError::execution_timeout("60s").is_transient());
        assert!(!TripSqlError::execution_rejected("syntax").is_transient());
        assert!(!TripSqlError::llm("bad key").is_transient());
    }

    #[test]
    fn test_validation_kinds() {
        assert!(ErrorKind::UnsafeStatement.is_validation());
        assert!(ErrorKind::UnknownReference.is_validation());
        assert!(ErrorKind::AmbiguousReference.is_validation());
        assert!(ErrorKind::ForbiddenTable.is_validation());
        assert!(!ErrorKind::AmbiguousGeneration.is_validation());
        assert!(!ErrorKind::ExecutionRejected.is_validation());
    }

    #[test]
    fn test_error_kind_serialization() {
        let json = serde_json::to_string(&ErrorKind::ForbiddenTable).unwrap();
        assert_eq!(json, "\"ForbiddenTable\"");
        assert_eq!(ErrorKind::ForbiddenTable.to_string(), "ForbiddenTable");
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TripSqlError>();
    }
}
