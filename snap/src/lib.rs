//! Resumable orchestration of a coding-agent CLI over planned tasks.
//!
//! The crate keeps a strict separation:
//!
//! - **[`core`]**: Pure logic (state invariants, step table, task selection,
//!   status derivation). No I/O.
//! - **[`io`]**: Side-effecting adapters (session and state stores, agent
//!   subprocesses, git snapshots, prompts, terminal).
//!
//! Orchestration modules ([`plan`], [`workflow`], [`queue`], [`cli`]) combine
//! the two to implement CLI commands.

pub mod cancel;
pub mod cli;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod plan;
pub mod queue;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod workflow;
