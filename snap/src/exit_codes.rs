//! Stable exit codes for snap CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Command failed (invalid input, session conflicts, agent failures, ...).
pub const ERROR: i32 = 1;
/// Interrupted by SIGINT/SIGTERM (128 + SIGINT).
pub const CANCELLED: i32 = 130;

/// Map a top-level command error to its exit code.
pub fn for_error(err: &anyhow::Error) -> i32 {
    if crate::error::is_cancelled(err) {
        CANCELLED
    } else {
        ERROR
    }
}
