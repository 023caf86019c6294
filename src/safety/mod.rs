//! SQL validation.
//!
//! Deterministic checks applied to every candidate before execution,
//! whether it came from the generator or was written by hand. The checks
//! short-circuit in this order:
//!
//! 1. A single read-only query with no write or DDL keyword (`UnsafeStatement`).
//! 2. Every table is in the allow-list (`ForbiddenTable`).
//! 3. Every table and column exists in the snapshot (`UnknownReference`),
//!    and no unqualified column is provided by two tables (`AmbiguousReference`).
//! 4. The result is bounded: a missing limit is injected at the row cap and
//!    a larger one is clamped.

mod keywords;
mod limit;
mod resolve;

pub use keywords::{find_write_keyword, WRITE_KEYWORDS};
pub use limit::enforce_limit;

use sqlparser::ast::Statement;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use tracing::debug;

use crate::catalog::{AllowList, CatalogSnapshot};
use crate::error::{Result, TripSqlError};
use crate::query::QueryCandidate;

use resolve::{check_allow_list, Resolver};

/// The outcome of a successful validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSql {
    /// The statement to execute, with the row limit enforced.
    pub sql: String,
    /// Top-level output names (aliases and plain column names).
    pub output_names: Vec<String>,
    /// True if the limit was injected or clamped.
    pub limit_applied: bool,
}

/// Validates SQL against a catalog snapshot and an allow-list.
#[derive(Debug, Clone)]
pub struct SqlValidator {
    allow_list: AllowList,
    row_cap: usize,
}

impl SqlValidator {
    pub fn new(allow_list: AllowList, row_cap: usize) -> Self {
        Self {
            allow_list,
            row_cap,
        }
    }

    pub fn row_cap(&self) -> usize {
        self.row_cap
    }

    /// Validates `candidate` and stamps it `Valid` or `Rejected`.
    pub fn validate(&self, mut candidate: QueryCandidate, snapshot: &CatalogSnapshot) -> QueryCandidate {
        match self.check(&candidate.sql, snapshot) {
            Ok(validated) => candidate.mark_valid(validated.sql, validated.output_names),
            Err(reason) => {
                debug!(kind = %reason.kind(), "Candidate rejected: {}", reason.message());
                candidate.mark_rejected(reason);
            }
        }
        candidate
    }

    /// Runs the checks on raw SQL text.
    pub fn check(&self, sql: &str, snapshot: &CatalogSnapshot) -> Result<ValidatedSql> {
        let dialect = GenericDialect {};
        let mut statements = Parser::parse_sql(&dialect, sql)
            .map_err(|e| TripSqlError::unsafe_statement(format!("Could not parse SQL: {}", e)))?;

        if statements.len() != 1 {
            return Err(TripSqlError::unsafe_statement(format!(
                "Expected a single statement, found {}",
                statements.len()
            )));
        }

        if let Some(keyword) = find_write_keyword(sql) {
            return Err(TripSqlError::unsafe_statement(format!(
                "{} is not allowed; only read-only queries may run",
                keyword
            )));
        }

        let mut statement = statements.remove(0);
        let Statement::Query(query) = &mut statement else {
            return Err(TripSqlError::unsafe_statement(format!(
                "Only SELECT queries are allowed, found {}",
                statement_kind(&statement)
            )));
        };

        check_allow_list(query, &self.allow_list)?;
        let output_names =
            Resolver::new(snapshot, self.allow_list.default_schema()).check_query(query)?;

        let limit_applied = enforce_limit(query, self.row_cap);
        let sql = if limit_applied {
            statement.to_string()
        } else {
            sql.trim().trim_end_matches(';').trim_end().to_string()
        };

        Ok(ValidatedSql {
            sql,
            output_names,
            limit_applied,
        })
    }
}

/// First keyword of the rendered statement, for messages.
fn statement_kind(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .next()
        .unwrap_or("statement")
        .to_uppercase()
}
