//! Git adapter and working-tree snapshots.
//!
//! Snapshots are stash objects published to the stash reflog without touching
//! the working tree or leaving extra files staged.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::cancel::CancelToken;

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// True if `workdir` is inside a git work tree.
    pub fn is_work_tree(&self) -> bool {
        self.run(&["rev-parse", "--is-inside-work-tree"])
            .map(|out| out.status.success() && String::from_utf8_lossy(&out.stdout).trim() == "true")
            .unwrap_or(false)
    }

    /// Tree object for the current index.
    pub fn write_tree(&self) -> Result<String> {
        Ok(self.run_capture(&["write-tree"])?.trim().to_string())
    }

    /// Stage all changes, untracked files included (respects .gitignore).
    pub fn add_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A"])?;
        Ok(())
    }

    /// Replace the index with `tree` without touching the working tree.
    pub fn read_tree(&self, tree: &str) -> Result<()> {
        self.run_checked(&["read-tree", tree])?;
        Ok(())
    }

    /// Create a stash commit; empty when there is nothing to stash.
    pub fn stash_create(&self, message: &str) -> Result<String> {
        Ok(self
            .run_capture(&["stash", "create", message])?
            .trim()
            .to_string())
    }

    /// Publish a stash commit to `refs/stash`.
    pub fn stash_store(&self, message: &str, commit: &str) -> Result<()> {
        self.run_checked(&["stash", "store", "-m", message, commit])?;
        Ok(())
    }

    /// Subjects of the stash reflog, newest first.
    pub fn stash_list(&self) -> Result<Vec<String>> {
        let out = self.run(&["stash", "list", "--format=%gs"])?;
        if !out.status.success() {
            return Ok(Vec::new());
        }
        Ok(String::from_utf8_lossy(&out.stdout)
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

/// Captures the post-step working tree.
pub trait Snapshotter: Send + Sync {
    /// Returns `Ok(false)` when the tree was clean and nothing was recorded.
    fn capture(&self, cancel: &CancelToken, message: &str) -> Result<bool>;
}

/// Stash-reflog snapshots for a git checkout.
#[derive(Debug, Clone)]
pub struct GitSnapshotter {
    git: Git,
}

impl GitSnapshotter {
    pub fn new(git: Git) -> Self {
        Self { git }
    }
}

impl Snapshotter for GitSnapshotter {
    #[instrument(skip_all, fields(message))]
    fn capture(&self, cancel: &CancelToken, message: &str) -> Result<bool> {
        cancel.check()?;
        let index_tree = self.git.write_tree().context("record index tree")?;

        let created = self
            .git
            .add_all()
            .context("stage working tree")
            .and_then(|()| {
                cancel.check()?;
                self.git.stash_create(message).context("create stash object")
            });

        // The index is restored even when staging failed or we were cancelled.
        let restored = self.git.read_tree(&index_tree).context("restore index");

        let commit = created?;
        restored?;
        if commit.is_empty() {
            debug!("working tree clean, no snapshot");
            return Ok(false);
        }
        self.git
            .stash_store(message, &commit)
            .context("store snapshot")?;
        debug!(commit = %commit, "snapshot stored");
        Ok(true)
    }
}

/// Used outside a git checkout.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSnapshotter;

impl Snapshotter for NoopSnapshotter {
    fn capture(&self, _cancel: &CancelToken, _message: &str) -> Result<bool> {
        Ok(false)
    }
}

/// Git snapshots when `root` is a work tree, otherwise a no-op.
pub fn snapshotter_for(root: &Path) -> Box<dyn Snapshotter> {
    let git = Git::new(root);
    if git.is_work_tree() {
        Box::new(GitSnapshotter::new(git))
    } else {
        warn!(root = %root.display(), "not a git work tree, snapshots disabled");
        Box::new(NoopSnapshotter)
    }
}
