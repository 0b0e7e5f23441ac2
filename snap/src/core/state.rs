//! Per-session workflow state and its invariants.
//!
//! The runner is the only writer. Every mutation goes through the methods
//! here so that a saved state always satisfies [`WorkflowState::validate`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::steps::TOTAL_STEPS;
use crate::core::tasks::{Task, parse_task_filename};

/// Persisted workflow position (`<session>/state.json`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowState {
    /// Resolved tasks directory at time of save.
    pub tasks_dir: String,
    /// Active task id (`TASK2`), empty when idle.
    #[serde(default)]
    pub current_task_id: String,
    /// Active task filename, empty when idle.
    #[serde(default)]
    pub current_task_file: String,
    /// 1-indexed step within the pipeline; `total_steps + 1` means all steps ran.
    pub current_step: u32,
    /// Pipeline length when this record was written.
    pub total_steps: u32,
    /// Tasks fully implemented, in completion order.
    #[serde(default)]
    pub completed_task_ids: Vec<String>,
    pub last_updated: DateTime<Utc>,
    /// Message from the last failed step; cleared on step success.
    #[serde(default)]
    pub last_error: String,
    /// Resolved PRD path, for display.
    pub prd_path: String,
}

impl WorkflowState {
    pub fn new(tasks_dir: impl Into<String>, prd_path: impl Into<String>) -> Self {
        Self {
            tasks_dir: tasks_dir.into(),
            current_task_id: String::new(),
            current_task_file: String::new(),
            current_step: 1,
            total_steps: TOTAL_STEPS,
            completed_task_ids: Vec::new(),
            last_updated: Utc::now(),
            last_error: String::new(),
            prd_path: prd_path.into(),
        }
    }

    /// True when a task is in progress.
    pub fn has_active_task(&self) -> bool {
        !self.current_task_id.is_empty()
    }

    pub fn is_completed(&self, task_id: &str) -> bool {
        self.completed_task_ids.iter().any(|id| id == task_id)
    }

    /// Check every invariant; returns all violations.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.tasks_dir.trim().is_empty() {
            errors.push("tasks_dir must not be empty".to_string());
        }
        if self.prd_path.trim().is_empty() {
            errors.push("prd_path must not be empty".to_string());
        }
        if self.total_steps == 0 {
            errors.push("total_steps must be > 0".to_string());
        }
        if self.current_step < 1 || self.current_step > self.total_steps.saturating_add(1) {
            errors.push(format!(
                "current_step {} out of range 1..={}",
                self.current_step,
                self.total_steps.saturating_add(1)
            ));
        }
        let mut seen: Vec<&str> = Vec::with_capacity(self.completed_task_ids.len());
        for id in &self.completed_task_ids {
            if seen.contains(&id.as_str()) {
                errors.push(format!("duplicate completed task id {id}"));
            }
            seen.push(id);
        }
        if self.has_active_task() && self.is_completed(&self.current_task_id) {
            errors.push(format!(
                "current task {} is already in completed_task_ids",
                self.current_task_id
            ));
        }
        if !self.has_active_task() && !self.current_task_file.is_empty() {
            errors.push(format!(
                "current_task_file {} set without current_task_id",
                self.current_task_file
            ));
        }
        if self.has_active_task() && !self.current_task_file.is_empty() {
            match parse_task_filename(&self.current_task_file) {
                Some(task) if task.id == self.current_task_id => {}
                _ => errors.push(format!(
                    "current_task_file {} does not match current_task_id {}",
                    self.current_task_file, self.current_task_id
                )),
            }
        }
        errors
    }

    /// Bump `last_updated`, never moving it backwards.
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.last_updated {
            self.last_updated = now;
        }
    }

    /// Make `task` the active task at step 1.
    pub fn start_task(&mut self, task: &Task) {
        self.current_task_id = task.id.clone();
        self.current_task_file = task.filename.clone();
        self.current_step = 1;
        self.last_error.clear();
        self.touch();
    }

    /// Advance past a successful step.
    pub fn mark_step_complete(&mut self) {
        self.current_step += 1;
        self.last_error.clear();
        self.touch();
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.last_error = message.into();
        self.touch();
    }

    /// Move the active task to `completed_task_ids` and return to idle.
    pub fn complete_task(&mut self) {
        let id = std::mem::take(&mut self.current_task_id);
        if !id.is_empty() && !self.is_completed(&id) {
            self.completed_task_ids.push(id);
        }
        self.current_task_file.clear();
        self.current_step = 1;
        self.last_error.clear();
        self.touch();
    }

    /// Adopt the runner's pipeline length for records written by older versions.
    ///
    /// A task that had finished every step under the old length stays finished,
    /// and a position past the new table is treated as finished.
    pub fn upgrade_total_steps(&mut self, total: u32) -> bool {
        if self.total_steps == total {
            return false;
        }
        let finished = self.current_step > self.total_steps;
        if finished || self.current_step > total.saturating_add(1) {
            self.current_step = total.saturating_add(1);
        }
        self.total_steps = total;
        true
    }
}
