//! Prompt construction for SQL generation.
//!
//! Builds the message list sent to the generator from a question and the
//! request's catalog snapshot. Only allow-listed tables are shown. The output
//! depends only on its inputs.

mod select;
mod templates;

pub use select::select_tables;
pub use templates::{FEW_SHOTS, QUESTION_MARKER, RETURN_ONLY_SQL, SYSTEM_RULES};

use serde::Serialize;

use crate::catalog::{AllowList, CatalogSnapshot, SchemaDescriptor};
use crate::error::{Result, TripSqlError};
use crate::llm::Message;
use crate::query::Question;

/// A generation request ready for the text generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptPayload {
    pub request_id: String,
    pub messages: Vec<Message>,
    /// Qualified names of the tables included in the prompt.
    pub selected_tables: Vec<String>,
    pub schema_version: u64,
    /// 0 for the first prompt, incremented by each revision.
    pub revision: u32,
}

/// Assembles generation prompts.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    allow_list: AllowList,
    core_tables: Vec<String>,
    char_budget: usize,
    row_cap: usize,
}

impl PromptBuilder {
    pub fn new(
        allow_list: AllowList,
        core_tables: Vec<String>,
        char_budget: usize,
        row_cap: usize,
    ) -> Self {
        Self {
            allow_list,
            core_tables,
            char_budget,
            row_cap,
        }
    }

    /// Builds the first prompt for `question`.
    ///
    /// Fails with `SchemaEmpty` when the snapshot has no tables, or none that
    /// the allow-list permits.
    pub fn build(&self, question: &Question, snapshot: &CatalogSnapshot) -> Result<PromptPayload> {
        if snapshot.is_empty() {
            return Err(TripSqlError::schema_empty(format!(
                "Catalog version {} has no tables",
                snapshot.version
            )));
        }

        let permitted: Vec<SchemaDescriptor> = snapshot
            .tables
            .iter()
            .filter(|t| self.allow_list.permits(Some(&t.schema), &t.name))
            .cloned()
            .collect();
        if permitted.is_empty() {
            return Err(TripSqlError::schema_empty(format!(
                "No catalog table is in the allow-list ({})",
                self.allow_list
            )));
        }

        let extra_terms: &[&str] = if question.filters.borough.is_some() {
            &["borough"]
        } else {
            &[]
        };
        let selected = select_tables(
            &question.text,
            extra_terms,
            &permitted,
            &self.core_tables,
            self.char_budget,
        );

        let schema_text = selected
            .iter()
            .map(|t| t.format_for_llm())
            .collect::<Vec<_>>()
            .join("\n");

        let mut messages = Vec::with_capacity(FEW_SHOTS.len() * 2 + 2);
        messages.push(Message::system(
            SYSTEM_RULES.replace("{row_cap}", &self.row_cap.to_string()),
        ));
        for (example_question, example_sql) in FEW_SHOTS {
            messages.push(Message::user(*example_question));
            messages.push(Message::assistant(*example_sql));
        }
        messages.push(Message::user(self.question_turn(question, &schema_text)));

        Ok(PromptPayload {
            request_id: question.request_id.clone(),
            messages,
            selected_tables: selected.iter().map(|t| t.qualified_name()).collect(),
            schema_version: snapshot.version,
            revision: 0,
        })
    }

    /// Extends `payload` with the rejected SQL and the reason, asking for a
    /// corrected query.
    ///
    /// `previous_sql` is `None` when the last response held no usable
    /// statement; a placeholder turn keeps user and assistant turns alternating.
    pub fn revise(
        &self,
        payload: &PromptPayload,
        question: &Question,
        previous_sql: Option<&str>,
        reason: &TripSqlError,
    ) -> PromptPayload {
        let mut messages = payload.messages.clone();
        messages.push(Message::assistant(
            previous_sql.unwrap_or("(no single SQL statement)"),
        ));
        messages.push(Message::user(format!(
            "That query was rejected ({}): {}\n\
             Write a corrected query that avoids the problem. Use only the tables and columns in the schema.\n\n\
             {}\n{}\n\n{}",
            reason.kind(),
            reason.message(),
            QUESTION_MARKER,
            question.text,
            RETURN_ONLY_SQL
        )));

        PromptPayload {
            request_id: payload.request_id.clone(),
            messages,
            selected_tables: payload.selected_tables.clone(),
            schema_version: payload.schema_version,
            revision: payload.revision + 1,
        }
    }

    fn question_turn(&self, question: &Question, schema_text: &str) -> String {
        let mut turn = format!("You will write a single SQL query.\nSchema:\n{}\n", schema_text);

        let constraints = question.filters.describe();
        if !constraints.is_empty() {
            turn.push_str("\nConstraints:\n");
            for line in constraints {
                turn.push_str("- ");
                turn.push_str(&line);
                turn.push('\n');
            }
        }

        turn.push_str(&format!(
            "\n{}\n{}\n\n{}",
            QUESTION_MARKER, question.text, RETURN_ONLY_SQL
        ));
        turn
    }
}
