//! Named sessions under `<project>/.snap/sessions/`.
//!
//! A session exists iff its directory exists. Every operation except
//! `delete` is idempotent and safe to re-run.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::core::session_name::{DEFAULT_SESSION, validate_name};
use crate::core::status::{SessionStatus, derive_status};
use crate::core::tasks::parse_task_filename;
use crate::error::SessionError;
use crate::io::paths::{ARTIFACT_FILES, SessionPaths, SnapPaths};
use crate::io::state_store::{ensure_gitignore, probe_state};
use crate::io::task_scan::{count_tasks, regular_file_names};

/// Row shown by `snap list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub name: String,
    pub task_count: usize,
    pub completed_count: usize,
    pub status: SessionStatus,
}

/// Session operations scoped to one project root.
#[derive(Debug, Clone)]
pub struct SessionStore {
    paths: SnapPaths,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            paths: SnapPaths::new(root),
        }
    }

    pub fn root(&self) -> &Path {
        &self.paths.root
    }

    pub fn snap_paths(&self) -> &SnapPaths {
        &self.paths
    }

    pub fn session_paths(&self, name: &str) -> SessionPaths {
        self.paths.session(name)
    }

    /// Create `<name>/tasks/`. Fails if the name is invalid or taken.
    pub fn create(&self, name: &str) -> Result<SessionPaths> {
        validate_name(name)?;
        let paths = self.paths.session(name);
        if paths.dir.exists() {
            return Err(SessionError::Exists(name.to_string()).into());
        }
        ensure_gitignore(&self.paths.gitignore_path)?;
        fs::create_dir_all(&paths.tasks_dir)
            .with_context(|| format!("create {}", paths.tasks_dir.display()))?;
        info!(session = name, "session created");
        Ok(paths)
    }

    pub fn exists(&self, name: &str) -> bool {
        validate_name(name).is_ok() && self.paths.session(name).dir.is_dir()
    }

    /// Validate and require an existing session.
    pub fn open(&self, name: &str) -> Result<SessionPaths> {
        validate_name(name)?;
        if !self.exists(name) {
            return Err(SessionError::NotFound(name.to_string()).into());
        }
        Ok(self.paths.session(name))
    }

    /// Session names in lexicographic order.
    pub fn names(&self) -> Result<Vec<String>> {
        let dir = &self.paths.sessions_dir;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
            let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if validate_name(&name).is_ok() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// All sessions with counts and derived status.
    pub fn list(&self) -> Result<Vec<SessionInfo>> {
        Ok(self
            .names()?
            .into_iter()
            .map(|name| self.info(&name))
            .collect())
    }

    /// Counts and derived status for one session.
    pub fn info(&self, name: &str) -> SessionInfo {
        let paths = self.paths.session(name);
        let task_count = count_tasks(&paths.tasks_dir);
        let probe = probe_state(&paths.state_path);
        let plan_started = paths.plan_marker_path.exists();
        SessionInfo {
            name: name.to_string(),
            task_count,
            completed_count: probe.completed_count(),
            status: derive_status(task_count, &probe, plan_started),
        }
    }

    /// Remove the session directory recursively.
    pub fn delete(&self, name: &str) -> Result<()> {
        let paths = self.open(name)?;
        fs::remove_dir_all(&paths.dir)
            .with_context(|| format!("remove {}", paths.dir.display()))?;
        info!(session = name, "session deleted");
        Ok(())
    }

    /// True if the tasks directory holds any planning artifact or task file.
    pub fn has_artifacts(&self, name: &str) -> Result<bool> {
        let paths = self.open(name)?;
        let names = regular_file_names(&paths.tasks_dir)?;
        Ok(names
            .iter()
            .any(|n| ARTIFACT_FILES.contains(&n.as_str()) || parse_task_filename(n).is_some()))
    }

    /// Remove task-dir files, state and plan marker; keep the directories.
    pub fn clean(&self, name: &str) -> Result<()> {
        let paths = self.open(name)?;
        for file in regular_file_names(&paths.tasks_dir)? {
            remove_if_present(&paths.tasks_dir.join(file))?;
        }
        remove_if_present(&paths.state_path)?;
        remove_if_present(&paths.plan_marker_path)?;
        debug!(session = name, "session cleaned");
        Ok(())
    }

    /// Create `default` unless it already exists.
    pub fn ensure_default(&self) -> Result<SessionPaths> {
        if self.exists(DEFAULT_SESSION) {
            let paths = self.paths.session(DEFAULT_SESSION);
            fs::create_dir_all(&paths.tasks_dir)
                .with_context(|| format!("create {}", paths.tasks_dir.display()))?;
            return Ok(paths);
        }
        self.create(DEFAULT_SESSION)
    }

    /// Write the zero-byte `.plan-started` marker.
    pub fn mark_plan_started(&self, name: &str) -> Result<()> {
        let paths = self.open(name)?;
        fs::write(&paths.plan_marker_path, b"")
            .with_context(|| format!("write {}", paths.plan_marker_path.display()))
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::WorkflowState;

    fn session_error(err: &anyhow::Error) -> Option<&SessionError> {
        err.downcast_ref::<SessionError>()
    }

    #[test]
    fn create_makes_tasks_dir_and_gitignore() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(temp.path());
        let paths = store.create("auth").expect("create");
        assert!(paths.tasks_dir.is_dir());
        assert!(store.exists("auth"));
        let gitignore =
            fs::read_to_string(temp.path().join(".snap/.gitignore")).expect("gitignore");
        assert_eq!(gitignore, "*\n!.gitignore\n");
    }

    #[test]
    fn create_rejects_invalid_and_duplicate_names() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(temp.path());
        let err = store.create("bad name").unwrap_err();
        assert_eq!(
            session_error(&err),
            Some(&SessionError::InvalidName("bad name".to_string()))
        );
        store.create("auth").expect("create");
        let err = store.create("auth").unwrap_err();
        assert_eq!(session_error(&err), Some(&SessionError::Exists("auth".to_string())));
    }

    #[test]
    fn list_is_sorted_with_counts_and_status() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(temp.path());
        let api = store.create("api").expect("api");
        store.create("auth").expect("auth");
        fs::write(api.tasks_dir.join("TASK1.md"), "").expect("write");
        fs::write(api.tasks_dir.join("TASK2.md"), "").expect("write");
        let mut state = WorkflowState::new(api.tasks_dir.display().to_string(), "PRD.md");
        state.completed_task_ids.push("TASK1".to_string());
        fs::write(&api.state_path, serde_json::to_string(&state).expect("json")).expect("write");

        let sessions = store.list().expect("list");
        let names: Vec<&str> = sessions.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["api", "auth"]);
        assert_eq!(sessions[0].task_count, 2);
        assert_eq!(sessions[0].completed_count, 1);
        assert_eq!(sessions[0].status, SessionStatus::Idle);
        assert_eq!(sessions[1].status, SessionStatus::NoTasks);
    }

    #[test]
    fn delete_then_delete_again_is_not_found() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(temp.path());
        store.create("auth").expect("create");
        store.delete("auth").expect("delete");
        assert!(!store.exists("auth"));
        let err = store.delete("auth").unwrap_err();
        assert_eq!(session_error(&err), Some(&SessionError::NotFound("auth".to_string())));
    }

    #[test]
    fn has_artifacts_recognizes_known_files_only() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(temp.path());
        let paths = store.create("auth").expect("create");
        fs::write(paths.tasks_dir.join("notes.txt"), "").expect("write");
        fs::write(paths.tasks_dir.join("task1.md"), "").expect("write");
        assert!(!store.has_artifacts("auth").expect("probe"));
        fs::write(paths.tasks_dir.join("TASK1.md"), "").expect("write");
        assert!(store.has_artifacts("auth").expect("probe"));
    }

    #[test]
    fn clean_is_idempotent_and_keeps_directories() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(temp.path());
        let paths = store.create("auth").expect("create");
        fs::write(paths.tasks_dir.join("PRD.md"), "prd").expect("write");
        fs::write(paths.tasks_dir.join("TASK1.md"), "t").expect("write");
        fs::create_dir(paths.tasks_dir.join("assets")).expect("mkdir");
        fs::write(&paths.state_path, "{}").expect("write");
        store.mark_plan_started("auth").expect("marker");

        store.clean("auth").expect("clean");
        store.clean("auth").expect("clean twice");

        assert!(paths.tasks_dir.is_dir());
        assert!(paths.tasks_dir.join("assets").is_dir());
        assert!(regular_file_names(&paths.tasks_dir).expect("names").is_empty());
        assert!(!paths.state_path.exists());
        assert!(!paths.plan_marker_path.exists());
    }

    #[test]
    fn ensure_default_is_idempotent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(temp.path());
        let first = store.ensure_default().expect("first");
        fs::write(first.tasks_dir.join("PRD.md"), "keep").expect("write");
        let second = store.ensure_default().expect("second");
        assert_eq!(first.dir, second.dir);
        assert_eq!(store.names().expect("names"), vec!["default".to_string()]);
        assert_eq!(
            fs::read_to_string(second.tasks_dir.join("PRD.md")).expect("read"),
            "keep"
        );
    }

    #[test]
    fn plan_marker_marks_session_planning() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(temp.path());
        store.create("auth").expect("create");
        store.mark_plan_started("auth").expect("marker");
        let marker = store.session_paths("auth").plan_marker_path;
        assert_eq!(fs::metadata(marker).expect("meta").len(), 0);
        assert_eq!(store.info("auth").status, SessionStatus::Planning);
    }
}
