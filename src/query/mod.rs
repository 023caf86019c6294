//! Per-request data model and query execution.
//!
//! A [`Question`] comes in, the generator turns it into a [`QueryCandidate`],
//! and the [`QueryExecutor`] runs the candidate once the validator marks it
//! valid.

mod candidate;
mod executor;
mod question;

pub use candidate::{QueryCandidate, ValidationStatus};
pub use executor::{ExecutionResult, QueryExecutor};
pub use question::{next_request_id, DateRange, Question, QuestionFilters};
