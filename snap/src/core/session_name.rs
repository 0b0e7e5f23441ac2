//! Session name validation.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::SessionError;

/// Maximum session name length in bytes (names are ASCII-only).
pub const MAX_NAME_LEN: usize = 64;

/// Name used when `plan` runs in a project with no sessions.
pub const DEFAULT_SESSION: &str = "default";

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("session name regex"));

/// Validate a session name against `^[A-Za-z0-9_-]{1,64}$`.
pub fn validate_name(name: &str) -> Result<(), SessionError> {
    if NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(SessionError::InvalidName(name.to_string()))
    }
}
