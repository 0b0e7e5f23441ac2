//! Deterministic, pure logic shared by snap.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod elapsed;
pub mod session_name;
pub mod state;
pub mod status;
pub mod steps;
pub mod tasks;
pub mod types;
