//! Inbound questions and their structured filters.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Result, TripSqlError};

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generates a process-unique request id: `req-<hex millis>-<counter>`.
pub fn next_request_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let n = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("req-{:x}-{}", millis, n)
}

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parses a zero-padded calendar date. Impossible dates such as
/// `2023-02-29` are rejected.
fn parse_date(date: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date, DATE_FORMAT)
        .ok()
        .filter(|parsed| parsed.format(DATE_FORMAT).to_string() == date)
        .ok_or_else(|| {
            TripSqlError::invalid_request(format!(
                "Invalid date '{}', expected YYYY-MM-DD",
                date
            ))
        })
}

/// Inclusive date range, both ends `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

impl DateRange {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Result<Self> {
        let range = Self {
            start: start.into(),
            end: end.into(),
        };
        range.validate()?;
        Ok(range)
    }

    /// A range covering one day.
    pub fn day(date: impl Into<String>) -> Result<Self> {
        let date = date.into();
        Self::new(date.clone(), date)
    }

    pub fn validate(&self) -> Result<()> {
        let start = parse_date(&self.start)?;
        let end = parse_date(&self.end)?;
        if start > end {
            return Err(TripSqlError::invalid_request(format!(
                "Date range start {} is after end {}",
                self.start, self.end
            )));
        }
        Ok(())
    }

    pub fn is_single_day(&self) -> bool {
        self.start == self.end
    }
}

/// Optional structured filters accompanying a question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionFilters {
    #[serde(default)]
    pub date_range: Option<DateRange>,
    #[serde(default)]
    pub borough: Option<String>,
}

impl QuestionFilters {
    pub fn is_empty(&self) -> bool {
        self.date_range.is_none() && self.borough.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(range) = &self.date_range {
            range.validate()?;
        }
        if let Some(borough) = &self.borough {
            if borough.trim().is_empty() {
                return Err(TripSqlError::invalid_request("Borough filter is empty"));
            }
        }
        Ok(())
    }

    /// Renders the filters as prompt constraints, one per line.
    pub fn describe(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(range) = &self.date_range {
            if range.is_single_day() {
                lines.push(format!("Restrict to pickups on {}.", range.start));
            } else {
                lines.push(format!(
                    "Restrict to pickups from {} through {} inclusive.",
                    range.start, range.end
                ));
            }
        }
        if let Some(borough) = &self.borough {
            lines.push(format!("Restrict to pickups in the borough '{}'.", borough.trim()));
        }
        lines
    }
}

/// A natural-language question. Read-only once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Question {
    pub request_id: String,
    pub text: String,
    pub filters: QuestionFilters,
}

impl Question {
    /// Creates a question with a fresh request id.
    pub fn new(text: impl Into<String>) -> Result<Self> {
        Self::with_filters(text, QuestionFilters::default())
    }

    pub fn with_filters(text: impl Into<String>, filters: QuestionFilters) -> Result<Self> {
        let text = text.into().trim().to_string();
        if text.is_empty() {
            return Err(TripSqlError::invalid_request("Missing 'question' field"));
        }
        filters.validate()?;
        Ok(Self {
            request_id: next_request_id(),
            text,
            filters,
        })
    }

    /// Replaces the generated request id, e.g. with a caller-supplied one.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }
}
