//! Shared deterministic types for snap core logic.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which model class the provider adapter should select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelHint {
    Fast,
    Thinking,
}

impl fmt::Display for ModelHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelHint::Fast => f.write_str("fast"),
            ModelHint::Thinking => f.write_str("thinking"),
        }
    }
}

/// Argument that asks the agent to continue its previous conversation.
pub const CONTINUE_FLAG: &str = "-c";

/// Build an agent argument list: optional continue sentinel, prompt last.
pub fn agent_args(prompt: impl Into<String>, continue_conversation: bool) -> Vec<String> {
    let mut args = Vec::with_capacity(2);
    if continue_conversation {
        args.push(CONTINUE_FLAG.to_string());
    }
    args.push(prompt.into());
    args
}

/// True if `args` carries the continue sentinel anywhere.
pub fn continues_conversation(args: &[String]) -> bool {
    args.iter().any(|arg| arg == CONTINUE_FLAG)
}
