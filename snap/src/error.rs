//! Semantic error kinds surfaced by snap.
//!
//! Everything propagates as `anyhow::Error`; these types exist so callers can
//! classify a failure with `downcast_ref` (exit codes, reset policies) without
//! parsing messages.

use std::path::PathBuf;

use thiserror::Error;

/// Session store failures. Messages are shown to the user verbatim.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error(
        "invalid session name '{0}': use 1-64 characters from [A-Za-z0-9_-]"
    )]
    InvalidName(String),
    #[error("session '{0}' already exists")]
    Exists(String),
    #[error("session '{0}' not found")]
    NotFound(String),
}

/// Workflow state persistence failures.
#[derive(Debug, Error)]
pub enum StateError {
    /// The file exists but is not parseable as a workflow state.
    #[error("state file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    /// The file parsed but violates a state invariant.
    #[error(
        "invalid workflow state in {path}: {reason} (use --fresh to reset or --show-state to inspect)"
    )]
    Invalid { path: PathBuf, reason: String },
}

/// Non-zero exit of the agent subprocess.
#[derive(Debug, Error)]
#[error("{program} exited with {status}{}", stderr_suffix(.stderr_tail))]
pub struct ExecError {
    pub program: String,
    /// Rendered exit status (`status 2`, `signal 9`).
    pub status: String,
    /// Last lines of the child's stderr, possibly empty.
    pub stderr_tail: String,
}

fn stderr_suffix(tail: &str) -> String {
    if tail.trim().is_empty() {
        String::new()
    } else {
        format!(": {}", tail.trim())
    }
}

/// The shared cancellation token fired (SIGINT/SIGTERM).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("cancelled")]
pub struct Cancelled;

/// No `TASK<n>.md` files were found where the runner expected them.
#[derive(Debug, Error)]
#[error("{}", render_task_dir_empty(.path, .hints))]
pub struct TaskDirEmpty {
    pub path: PathBuf,
    pub hints: Vec<String>,
}

fn render_task_dir_empty(path: &std::path::Path, hints: &[String]) -> String {
    let mut msg = format!("no task files found in {}", path.display());
    msg.push_str("\n\nExpected files named TASK<n>.md (e.g. TASK1.md, TASK2.md).");
    if !hints.is_empty() {
        msg.push_str("\n\nHints:");
        for hint in hints {
            msg.push_str(&format!("\n  - {hint}"));
        }
    }
    msg.push_str("\n\nTo get started:");
    msg.push_str("\n  1. Run `snap plan` to generate task files interactively, or");
    msg.push_str("\n  2. Create TASK1.md, TASK2.md, ... in the tasks directory by hand.");
    msg
}

/// True if `err` (or anything in its chain) is a cancellation.
pub fn is_cancelled(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.downcast_ref::<Cancelled>().is_some())
}
