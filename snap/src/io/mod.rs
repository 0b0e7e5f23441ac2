//! Side-effecting adapters: filesystem, git, subprocesses and the terminal.

pub mod config;
pub mod executor;
pub mod git;
pub mod input;
pub mod output;
pub mod paths;
pub mod process;
pub mod prompt;
pub mod session_store;
pub mod signals;
pub mod state_store;
pub mod task_scan;
