//! The question-answering pipeline.
//!
//! [`Orchestrator`] drives a request through the stages tracked by
//! [`StageTracker`] and shapes the outcome into an [`Answer`].

mod answer;
mod orchestrator;
mod request;
mod state;

pub use answer::{Answer, AnswerStatus};
pub use orchestrator::Orchestrator;
pub use request::parse_request;
pub use state::{RequestStage, StageTracker};
