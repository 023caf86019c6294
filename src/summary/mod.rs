//! Result summarization.
//!
//! Narrates an [`ExecutionResult`] with the text generator. The prompt holds
//! the literal result rows as TSV and nothing else about the data, so the
//! narrative can only draw on returned values. [`unsupported_figures`] checks
//! that after the fact.

use regex::Regex;
use std::fmt::Write as _;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::debug;

use crate::engine::Value;
use crate::error::{Result, TripSqlError};
use crate::llm::{CompletionOptions, LlmClient, Message};
use crate::query::{ExecutionResult, Question};

const SYSTEM_PROMPT: &str = "You are a data analyst. Write a crisp, 2-3 sentence insight summary \
for executives. Use only values present in the result rows. Avoid speculation.";

/// Narrates query results.
#[derive(Clone)]
pub struct Summarizer {
    client: Arc<dyn LlmClient>,
    options: CompletionOptions,
    timeout: Duration,
    preview_rows: usize,
}

impl Summarizer {
    pub fn new(
        client: Arc<dyn LlmClient>,
        options: CompletionOptions,
        timeout: Duration,
        preview_rows: usize,
    ) -> Self {
        Self {
            client,
            options,
            timeout,
            preview_rows,
        }
    }

    /// Produces a short narrative of `result` for `question`.
    ///
    /// Fails with `SummarizationFailed` on any generator error or timeout,
    /// or when the generator returns blank text.
    pub async fn summarize(&self, question: &Question, result: &ExecutionResult) -> Result<String> {
        let messages = summary_messages(question, result, self.preview_rows);

        let text = tokio::time::timeout(self.timeout, self.client.complete(&messages, &self.options))
            .await
            .map_err(|_| {
                TripSqlError::summarization_failed(format!(
                    "summarizer did not respond within {}s",
                    self.timeout.as_secs_f64()
                ))
            })?
            .map_err(|e| TripSqlError::summarization_failed(e.message().to_string()))?;

        let narrative = text.trim();
        if narrative.is_empty() {
            return Err(TripSqlError::summarization_failed("summarizer returned no text"));
        }
        debug!(chars = narrative.len(), "Summary generated");
        Ok(narrative.to_string())
    }
}

/// Builds the summarization conversation.
pub fn summary_messages(
    question: &Question,
    result: &ExecutionResult,
    preview_rows: usize,
) -> Vec<Message> {
    let shown = result.rows.len().min(preview_rows);
    let mut user = String::new();
    let _ = writeln!(user, "Question: {}", question.text);
    let _ = writeln!(user);
    let _ = writeln!(
        user,
        "Rows returned: {} (truncated: {})",
        result.row_count,
        if result.truncated { "yes" } else { "no" }
    );
    let _ = writeln!(user, "Result preview (TSV, first {} rows):", shown);
    user.push_str(&preview_tsv(result, shown));
    user.push_str("\nWrite a concise insight summary. Avoid speculation.");

    vec![Message::system(SYSTEM_PROMPT), Message::user(user)]
}

/// Renders a header line and the first `limit` rows as TSV. NULL is empty.
pub fn preview_tsv(result: &ExecutionResult, limit: usize) -> String {
    let mut out = result
        .columns
        .iter()
        .map(|c| tsv_field(&c.name))
        .collect::<Vec<_>>()
        .join("\t");
    out.push('\n');
    for row in result.rows.iter().take(limit) {
        let line = row
            .iter()
            .map(|v| tsv_field(&v.to_display_string()))
            .collect::<Vec<_>>()
            .join("\t");
        out.push_str(&line);
        out.push('\n');
    }
    out
}

fn tsv_field(raw: &str) -> String {
    raw.replace(['\t', '\n', '\r'], " ")
}

fn figure_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"-?\d[\d,]*(?:\.\d+)?")
            .unwrap_or_else(|e| panic!("invalid figure pattern: {}", e))
    })
}

/// Returns numbers in `narrative` that no result cell, row count, or the
/// question itself accounts for.
///
/// A figure matches a numeric cell when it equals the cell rounded to the
/// figure's own precision, so "65.3" is supported by 65.27.
pub fn unsupported_figures(narrative: &str, question: &Question, result: &ExecutionResult) -> Vec<String> {
    let mut known: Vec<f64> = result
        .rows
        .iter()
        .flatten()
        .filter_map(|v| match v {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::String(s) => s.trim().parse().ok(),
            Value::Null | Value::Bool(_) => None,
        })
        .collect();
    known.push(result.row_count as f64);
    if let Some(total) = result.total_rows_seen {
        known.push(total as f64);
    }

    let text_cells: Vec<String> = result
        .rows
        .iter()
        .flatten()
        .filter_map(|v| match v {
            Value::String(s) => Some(s.clone()),
            _ => None,
        })
        .collect();

    let mut unsupported = Vec::new();
    for m in figure_pattern().find_iter(narrative) {
        let raw = m.as_str().trim_end_matches(',');
        if question.text.contains(raw) || text_cells.iter().any(|s| s.contains(raw)) {
            continue;
        }
        let cleaned = raw.replace(',', "");
        let Ok(figure) = cleaned.parse::<f64>() else {
            continue;
        };
        let decimals = cleaned.split_once('.').map_or(0, |(_, frac)| frac.len());
        let tolerance = 0.5 * 10f64.powi(-(decimals as i32)) + f64::EPSILON;
        let supported = known.iter().any(|k| {
            (k - figure).abs() <= tolerance || (k.abs() <= 1.0 && (k * 100.0 - figure).abs() <= tolerance)
        });
        if !supported {
            unsupported.push(raw.to_string());
        }
    }
    unsupported
}
