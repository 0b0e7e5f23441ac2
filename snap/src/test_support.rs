//! Test-only helpers: scripted agents, recording snapshotters and temp projects.

use std::collections::VecDeque;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::process::Command;
use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::cancel::CancelToken;
use crate::core::types::{ModelHint, continues_conversation};
use crate::io::executor::Executor;
use crate::io::git::Snapshotter;
use crate::io::input::LineReader;
use crate::io::paths::SessionPaths;
use crate::io::session_store::SessionStore;

/// In-memory sink shared between an `Output` and the test.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn contents(&self) -> String {
        let bytes = self.bytes.lock().expect("buffer lock");
        String::from_utf8_lossy(&bytes).to_string()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.lock().expect("buffer lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// One recorded agent invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecCall {
    pub model: ModelHint,
    pub args: Vec<String>,
}

impl ExecCall {
    pub fn prompt(&self) -> &str {
        self.args.last().map(String::as_str).unwrap_or("")
    }

    pub fn continues(&self) -> bool {
        continues_conversation(&self.args)
    }
}

type Script = dyn Fn(&ExecCall) -> Result<()> + Send + Sync;

/// Executor that records calls and answers from a closure.
///
/// The cancel token is checked before the closure runs, so a closure that
/// cancels makes the next call fail with `Cancelled`.
pub struct ScriptedExecutor {
    script: Box<Script>,
    calls: Mutex<Vec<ExecCall>>,
}

impl ScriptedExecutor {
    pub fn new(script: impl Fn(&ExecCall) -> Result<()> + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every call succeeds.
    pub fn ok() -> Self {
        Self::new(|_| Ok(()))
    }

    pub fn calls(&self) -> Vec<ExecCall> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl Executor for ScriptedExecutor {
    fn run(
        &self,
        cancel: &CancelToken,
        out: &mut dyn Write,
        model: ModelHint,
        args: &[String],
    ) -> Result<()> {
        cancel.check()?;
        let call = ExecCall {
            model,
            args: args.to_vec(),
        };
        self.calls.lock().expect("calls lock").push(call.clone());
        writeln!(out, "agent: ok")?;
        (self.script)(&call)
    }
}

/// Snapshotter that records messages instead of touching git.
#[derive(Debug, Default)]
pub struct RecordingSnapshotter {
    messages: Mutex<Vec<String>>,
}

impl RecordingSnapshotter {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().expect("messages lock").clone()
    }
}

impl Snapshotter for RecordingSnapshotter {
    fn capture(&self, cancel: &CancelToken, message: &str) -> Result<bool> {
        cancel.check()?;
        self.messages
            .lock()
            .expect("messages lock")
            .push(message.to_string());
        Ok(true)
    }
}

/// Line reader over a fixed list of lines.
#[derive(Debug, Default)]
pub struct ScriptedLines {
    lines: VecDeque<String>,
}

impl ScriptedLines {
    pub fn new(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
        }
    }
}

impl LineReader for ScriptedLines {
    fn next_line(&mut self, cancel: &CancelToken) -> Result<Option<String>> {
        cancel.check()?;
        Ok(self.lines.pop_front())
    }
}

/// Temp project directory with a session store rooted in it.
pub struct TestProject {
    pub dir: tempfile::TempDir,
    pub store: SessionStore,
}

impl TestProject {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(dir.path());
        Self { dir, store }
    }

    /// Same as `new`, with a git repository holding one commit.
    pub fn with_git() -> Self {
        let project = Self::new();
        init_git_repo(project.root());
        project
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Create a session with `TASK<n>.md` for each number.
    pub fn session_with_tasks(&self, name: &str, numbers: &[u32]) -> SessionPaths {
        let paths = self.store.create(name).expect("create session");
        for n in numbers {
            fs::write(
                paths.tasks_dir.join(format!("TASK{n}.md")),
                format!("# Task {n}\n"),
            )
            .expect("write task");
        }
        paths
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// `git init` with a committed README.md.
pub fn init_git_repo(root: &Path) {
    let git = |args: &[&str]| {
        let status = Command::new("git")
            .args(args)
            .current_dir(root)
            .status()
            .expect("spawn git");
        assert!(status.success(), "git {} failed", args.join(" "));
    };
    git(&["init", "-q"]);
    git(&["config", "user.email", "test@example.com"]);
    git(&["config", "user.name", "test"]);
    git(&["config", "commit.gpgsign", "false"]);
    fs::write(root.join("README.md"), "hi\n").expect("write");
    git(&["add", "README.md"]);
    git(&["commit", "-q", "-m", "init"]);
}

/// Write an executable shell script named `name` into `bin_dir`.
///
/// Returns a `PATH` value with `bin_dir` first.
#[cfg(unix)]
pub fn write_fake_provider(bin_dir: &Path, name: &str, body: &str) -> String {
    use std::os::unix::fs::PermissionsExt;
    fs::create_dir_all(bin_dir).expect("create bin dir");
    let path = bin_dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write fake provider");
    let mut perms = fs::metadata(&path).expect("meta").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod");

    let current = std::env::var_os("PATH").unwrap_or_default();
    let mut dirs = vec![bin_dir.to_path_buf()];
    dirs.extend(std::env::split_paths(&current));
    std::env::join_paths(dirs)
        .expect("join PATH")
        .to_string_lossy()
        .to_string()
}
