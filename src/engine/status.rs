// src/engine/status.rs

//! Run status and its one-way state machine.
//!
//! ```text
//! STARTED ──▶ ABORTED
//!         ├─▶ FAILED
//!         └─▶ DONE(result)
//! ```
//!
//! Once a terminal status is set it never changes again.

use std::fmt;

use tracing::debug;

use crate::types::FAILED_SENTINEL;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// Transient; the run is in progress.
    Started,
    /// The abort probe asked for cancellation.
    Aborted,
    /// The job raised, or the run hit an unclassified fault.
    Failed,
    /// The job returned; carries its stringified result.
    Done(String),
}

impl RunStatus {
    /// Classify the text received on the control channel.
    pub fn from_result_text(text: &str) -> Self {
        if text == FAILED_SENTINEL {
            RunStatus::Failed
        } else {
            RunStatus::Done(text.to_string())
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Started)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Started => f.write_str("STARTED"),
            RunStatus::Aborted => f.write_str("ABORTED"),
            RunStatus::Failed => f.write_str("FAILED"),
            RunStatus::Done(result) => f.write_str(result),
        }
    }
}

/// Holds the current status and only ever moves it forward.
#[derive(Debug)]
pub struct StatusMachine {
    current: RunStatus,
}

impl Default for StatusMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusMachine {
    pub fn new() -> Self {
        Self {
            current: RunStatus::Started,
        }
    }

    pub fn current(&self) -> &RunStatus {
        &self.current
    }

    /// Move to a terminal status.
    ///
    /// Returns `false` (and keeps the current status) if the run already
    /// reached a terminal status or `next` is not terminal.
    pub fn finish(&mut self, next: RunStatus) -> bool {
        if self.current.is_terminal() || !next.is_terminal() {
            debug!(current = %self.current, rejected = %next, "ignoring status transition");
            return false;
        }
        self.current = next;
        true
    }

    /// Final status handed back to the caller; a run never ends `STARTED`.
    pub fn into_status(self) -> RunStatus {
        match self.current {
            RunStatus::Started => RunStatus::Failed,
            terminal => terminal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_sentinel_maps_to_failed() {
        assert_eq!(RunStatus::from_result_text("FAILED"), RunStatus::Failed);
        assert_eq!(RunStatus::from_result_text("42"), RunStatus::Done("42".into()));
        assert_eq!(RunStatus::from_result_text(""), RunStatus::Done(String::new()));
    }

    #[test]
    fn display_matches_wire_text() {
        assert_eq!(RunStatus::Started.to_string(), "STARTED");
        assert_eq!(RunStatus::Aborted.to_string(), "ABORTED");
        assert_eq!(RunStatus::Failed.to_string(), "FAILED");
        assert_eq!(RunStatus::Done("None".into()).to_string(), "None");
    }

    #[test]
    fn terminal_status_is_sticky() {
        let mut machine = StatusMachine::new();
        assert_eq!(machine.current(), &RunStatus::Started);

        assert!(machine.finish(RunStatus::Aborted));
        assert!(!machine.finish(RunStatus::Failed));
        assert!(!machine.finish(RunStatus::Done("1".into())));
        assert_eq!(machine.into_status(), RunStatus::Aborted);
    }

    #[test]
    fn cannot_move_back_to_started() {
        let mut machine = StatusMachine::new();
        assert!(!machine.finish(RunStatus::Started));
        assert_eq!(machine.current(), &RunStatus::Started);
    }

    #[test]
    fn unfinished_machine_reports_failed() {
        assert_eq!(StatusMachine::new().into_status(), RunStatus::Failed);
    }
}
