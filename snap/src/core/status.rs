//! Derived session status shown by `list` and `status`.

use std::fmt;

use crate::core::state::WorkflowState;

/// What is known about a session's `state.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateProbe {
    Absent,
    Unparseable,
    Loaded(WorkflowState),
}

impl StateProbe {
    pub fn completed_count(&self) -> usize {
        match self {
            StateProbe::Loaded(state) => state.completed_task_ids.len(),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Unknown,
    Planning,
    NoTasks,
    Complete,
    Paused { step: u32 },
    Idle,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Unknown => f.write_str("unknown"),
            SessionStatus::Planning => f.write_str("planning"),
            SessionStatus::NoTasks => f.write_str("no tasks"),
            SessionStatus::Complete => f.write_str("complete"),
            SessionStatus::Paused { step } => write!(f, "paused at step {step}"),
            SessionStatus::Idle => f.write_str("idle"),
        }
    }
}

/// Derive a status; the first matching rule wins.
pub fn derive_status(task_count: usize, probe: &StateProbe, plan_started: bool) -> SessionStatus {
    let completed = probe.completed_count();
    if matches!(probe, StateProbe::Unparseable) {
        return SessionStatus::Unknown;
    }
    if plan_started && completed == 0 {
        return SessionStatus::Planning;
    }
    if task_count == 0 && !plan_started {
        return SessionStatus::NoTasks;
    }
    if task_count > 0 && completed >= task_count {
        return SessionStatus::Complete;
    }
    if let StateProbe::Loaded(state) = probe
        && state.has_active_task()
        && state.current_step > 0
    {
        return SessionStatus::Paused {
            step: state.current_step,
        };
    }
    SessionStatus::Idle
}
