// SPDX-License-Identifier: MIT OR Apache-2.0
//! Child-process lifecycle state machine: Idle → Launching → Running → Ended.

use serde::{Deserialize, Serialize};
use sp_error::{ProcessError, Result};
use std::fmt;

/// Lifecycle state of a scriptable process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProcessState {
    /// Created, not yet started.
    Idle,
    /// `start` is building metadata and creating the process.
    Launching,
    /// The child exists.
    Running {
        /// OS process identifier.
        pid: u32,
    },
    /// The OS reported the child's termination.
    Ended {
        /// OS process identifier.
        pid: u32,
    },
    /// Metadata construction or process creation failed.
    Failed,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Launching => f.write_str("launching"),
            Self::Running { pid } => write!(f, "running(pid={pid})"),
            Self::Ended { pid } => write!(f, "ended(pid={pid})"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// Record of a single state transition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LifecycleTransition {
    /// State before the transition.
    pub from: ProcessState,
    /// State after the transition.
    pub to: ProcessState,
    /// RFC 3339 timestamp.
    pub timestamp: String,
}

/// Enforces the one-way lifecycle of a single child process.
#[derive(Debug)]
pub struct Lifecycle {
    state: ProcessState,
    history: Vec<LifecycleTransition>,
}

impl Lifecycle {
    /// A lifecycle in [`ProcessState::Idle`].
    pub fn new() -> Self {
        Self {
            state: ProcessState::Idle,
            history: Vec::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Transition history, oldest first.
    pub fn history(&self) -> &[LifecycleTransition] {
        &self.history
    }

    /// Whether `to` is reachable from the current state.
    pub fn can_transition(&self, to: &ProcessState) -> bool {
        matches!(
            (&self.state, to),
            (ProcessState::Idle, ProcessState::Launching)
                | (ProcessState::Launching, ProcessState::Running { .. })
                | (ProcessState::Launching, ProcessState::Failed)
        ) || matches!(
            (&self.state, to),
            (ProcessState::Running { pid: a }, ProcessState::Ended { pid: b }) if a == b
        )
    }

    /// Move to `to`, or fail with `InvalidConfiguration`.
    pub fn transition(&mut self, to: ProcessState) -> Result<()> {
        if !self.can_transition(&to) {
            return Err(ProcessError::invalid(format!(
                "invalid lifecycle transition from {} to {to}",
                self.state
            )));
        }
        self.history.push(LifecycleTransition {
            from: self.state,
            to,
            timestamp: chrono::Utc::now().to_rfc3339(),
        });
        self.state = to;
        Ok(())
    }

    /// Idle → Launching. The only entry point, so a second `start` fails.
    pub fn begin_launch(&mut self) -> Result<()> {
        if self.state != ProcessState::Idle {
            return Err(ProcessError::invalid(format!(
                "process already started (state: {})",
                self.state
            )));
        }
        self.transition(ProcessState::Launching)
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_records_history() {
        let mut lc = Lifecycle::new();
        lc.begin_launch().unwrap();
        lc.transition(ProcessState::Running { pid: 42 }).unwrap();
        lc.transition(ProcessState::Ended { pid: 42 }).unwrap();
        assert_eq!(lc.state(), ProcessState::Ended { pid: 42 });
        assert_eq!(lc.history().len(), 3);
        assert_eq!(lc.history()[0].from, ProcessState::Idle);
    }

    #[test]
    fn second_launch_is_rejected() {
        let mut lc = Lifecycle::new();
        lc.begin_launch().unwrap();
        let err = lc.begin_launch().unwrap_err();
        assert_eq!(err.code(), sp_error::ErrorCode::InvalidConfiguration);
    }

    #[test]
    fn ended_pid_must_match() {
        let mut lc = Lifecycle::new();
        lc.begin_launch().unwrap();
        lc.transition(ProcessState::Running { pid: 1 }).unwrap();
        assert!(!lc.can_transition(&ProcessState::Ended { pid: 2 }));
    }

    #[test]
    fn failed_is_terminal() {
        let mut lc = Lifecycle::new();
        lc.begin_launch().unwrap();
        lc.transition(ProcessState::Failed).unwrap();
        assert!(lc.begin_launch().is_err());
        assert!(lc.transition(ProcessState::Running { pid: 3 }).is_err());
    }

    #[test]
    fn state_serializes_tagged() {
        let json = serde_json::to_string(&ProcessState::Running { pid: 7 }).unwrap();
        assert_eq!(json, r#"{"state":"running","pid":7}"#);
        assert_eq!(ProcessState::Ended { pid: 7 }.to_string(), "ended(pid=7)");
    }
}
