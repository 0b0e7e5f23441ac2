//! Durable storage for the workflow state.
//!
//! Two placements share one implementation: per-session
//! (`<session>/state.json`) and legacy (`.snap/state.json`, used by
//! `run --tasks-dir`). The runner only sees the [`StateManager`] trait.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::debug;

use crate::core::state::WorkflowState;
use crate::core::status::StateProbe;
use crate::error::StateError;
use crate::io::paths::{SessionPaths, SnapPaths};

/// Storage capability the workflow runner depends on.
pub trait StateManager {
    /// `Ok(None)` when no state exists; [`StateError`] when it cannot be used.
    fn load(&self) -> Result<Option<WorkflowState>>;
    /// Validate then atomically replace the stored state.
    fn save(&self, state: &WorkflowState) -> Result<()>;
    /// Remove the stored state; absent is a no-op.
    fn reset(&self) -> Result<()>;
    fn exists(&self) -> bool;
    fn path(&self) -> &Path;
}

/// JSON file store with atomic replace.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
    /// Written next to the state on save (legacy placement only).
    gitignore_path: Option<PathBuf>,
}

impl FileStateStore {
    pub fn for_session(paths: &SessionPaths) -> Self {
        Self {
            path: paths.state_path.clone(),
            gitignore_path: None,
        }
    }

    pub fn legacy(paths: &SnapPaths) -> Self {
        Self {
            path: paths.legacy_state_path.clone(),
            gitignore_path: Some(paths.gitignore_path.clone()),
        }
    }

    /// Parse the stored state without checking invariants.
    ///
    /// Unparseable files still fail with [`StateError::Corrupt`].
    pub fn load_unchecked(&self) -> Result<Option<WorkflowState>> {
        debug!(path = %self.path.display(), "loading workflow state");
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("read state {}", self.path.display()));
            }
        };
        let state: WorkflowState =
            serde_json::from_str(&contents).map_err(|err| StateError::Corrupt {
                path: self.path.clone(),
                reason: err.to_string(),
            })?;
        debug!(
            current_task = %state.current_task_id,
            current_step = state.current_step,
            completed = state.completed_task_ids.len(),
            "workflow state loaded"
        );
        Ok(Some(state))
    }
}

impl StateManager for FileStateStore {
    fn load(&self) -> Result<Option<WorkflowState>> {
        let Some(state) = self.load_unchecked()? else {
            return Ok(None);
        };
        let errors = state.validate();
        if !errors.is_empty() {
            return Err(StateError::Invalid {
                path: self.path.clone(),
                reason: errors.join("; "),
            }
            .into());
        }
        Ok(Some(state))
    }

    fn save(&self, state: &WorkflowState) -> Result<()> {
        let errors = state.validate();
        if !errors.is_empty() {
            return Err(anyhow!(
                "refusing to save invalid state: {}",
                errors.join("; ")
            ));
        }
        debug!(
            path = %self.path.display(),
            current_task = %state.current_task_id,
            current_step = state.current_step,
            "writing workflow state"
        );
        if let Some(gitignore) = &self.gitignore_path {
            ensure_gitignore(gitignore)?;
        }
        let mut buf = serde_json::to_string_pretty(state).context("serialize state")?;
        buf.push('\n');
        write_atomic(&self.path, &buf)
    }

    fn reset(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "workflow state reset");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("remove state {}", self.path.display())),
        }
    }

    fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// Read-only look at a state file for status derivation. Never fails.
pub fn probe_state(path: &Path) -> StateProbe {
    let Ok(contents) = fs::read_to_string(path) else {
        return if path.exists() {
            StateProbe::Unparseable
        } else {
            StateProbe::Absent
        };
    };
    match serde_json::from_str::<WorkflowState>(&contents) {
        Ok(state) => StateProbe::Loaded(state),
        Err(_) => StateProbe::Unparseable,
    }
}

/// Write `.snap/.gitignore` if it is missing or differs.
pub fn ensure_gitignore(path: &Path) -> Result<()> {
    use crate::io::paths::SNAP_GITIGNORE;
    if fs::read_to_string(path).is_ok_and(|existing| existing == SNAP_GITIGNORE) {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(path, SNAP_GITIGNORE).with_context(|| format!("write {}", path.display()))
}

/// Replace `path` via a same-directory temp file, fsync and rename.
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("state path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    let written = (|| -> Result<()> {
        let mut file = fs::File::create(&tmp_path)
            .with_context(|| format!("create temp state {}", tmp_path.display()))?;
        file.write_all(contents.as_bytes())
            .with_context(|| format!("write temp state {}", tmp_path.display()))?;
        file.sync_all()
            .with_context(|| format!("sync temp state {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| format!("replace state {}", path.display()))
    })();
    if written.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    written
}
