//! Per-request stage tracking.

use serde::Serialize;
use std::fmt;

use crate::error::{Result, TripSqlError};

/// Where a request is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestStage {
    Received,
    Generating,
    Validating,
    Executing,
    Summarizing,
    Complete,
    Failed,
}

impl RequestStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Returns true if a request may move from `self` to `next`.
    ///
    /// Stages only move forward, except that a rejected candidate sends the
    /// request from validation back to generation. Any live stage can fail.
    pub fn can_advance_to(self, next: RequestStage) -> bool {
        use RequestStage::*;
        match (self, next) {
            (Complete | Failed, _) => false,
            (_, Failed) => true,
            (Received, Generating)
            | (Generating, Validating)
            | (Validating, Generating)
            | (Validating, Executing)
            | (Executing, Summarizing)
            | (Summarizing, Complete) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RequestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "RECEIVED",
            Self::Generating => "GENERATING",
            Self::Validating => "VALIDATING",
            Self::Executing => "EXECUTING",
            Self::Summarizing => "SUMMARIZING",
            Self::Complete => "COMPLETE",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Ordered stage history of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageTracker {
    history: Vec<RequestStage>,
}

impl StageTracker {
    pub fn new() -> Self {
        Self {
            history: vec![RequestStage::Received],
        }
    }

    pub fn current(&self) -> RequestStage {
        self.history
            .last()
            .copied()
            .unwrap_or(RequestStage::Received)
    }

    /// Moves to `next`, refusing transitions the state machine does not allow.
    pub fn advance(&mut self, next: RequestStage) -> Result<()> {
        let current = self.current();
        if !current.can_advance_to(next) {
            return Err(TripSqlError::internal(format!(
                "illegal stage transition {} -> {}",
                current, next
            )));
        }
        tracing::debug!(from = %current, to = %next, "Stage transition");
        self.history.push(next);
        Ok(())
    }

    /// Marks the request failed unless it already reached a terminal stage.
    pub fn fail(&mut self) {
        if !self.current().is_terminal() {
            self.history.push(RequestStage::Failed);
        }
    }

    pub fn history(&self) -> &[RequestStage] {
        &self.history
    }

    pub fn into_history(self) -> Vec<RequestStage> {
        self.history
    }
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RequestStage::*;

    #[test]
    fn test_happy_path() {
        let mut tracker = StageTracker::new();
        for stage in [Generating, Validating, Executing, Summarizing, Complete] {
            tracker.advance(stage).unwrap();
        }
        assert_eq!(
            tracker.history(),
            &[Received, Generating, Validating, Executing, Summarizing, Complete]
        );
    }

    #[test]
    fn test_regeneration_loops_back() {
        let mut tracker = StageTracker::new();
        tracker.advance(Generating).unwrap();
        tracker.advance(Validating).unwrap();
        tracker.advance(Generating).unwrap();
        tracker.advance(Validating).unwrap();
        assert_eq!(tracker.current(), Validating);
    }

    #[test]
    fn test_no_skipping_or_going_back() {
        assert!(!Received.can_advance_to(Executing));
        assert!(!Executing.can_advance_to(Generating));
        assert!(!Summarizing.can_advance_to(Executing));

        let mut tracker = StageTracker::new();
        let err = tracker.advance(Validating).unwrap_err();
        assert!(err.to_string().contains("RECEIVED -> VALIDATING"));
    }

    #[test]
    fn test_terminal_stages_are_final() {
        let mut tracker = StageTracker::new();
        tracker.advance(Generating).unwrap();
        tracker.fail();
        tracker.fail();
        assert_eq!(tracker.history(), &[Received, Generating, Failed]);
        assert!(tracker.advance(Validating).is_err());
    }

    #[test]
    fn test_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Summarizing).unwrap(), "\"SUMMARIZING\"");
    }
}
