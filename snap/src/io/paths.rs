//! Canonical on-disk locations under `<project>/.snap/`.

use std::path::{Path, PathBuf};

/// Contents of `.snap/.gitignore`: ignore everything except itself.
pub const SNAP_GITIGNORE: &str = "*\n!.gitignore\n";

pub const PRD_FILE: &str = "PRD.md";
pub const TECHNOLOGY_FILE: &str = "TECHNOLOGY.md";
pub const DESIGN_FILE: &str = "DESIGN.md";
pub const TASKS_FILE: &str = "TASKS.md";

/// Planning artifacts recognized by name (besides `TASK<n>.md`).
pub const ARTIFACT_FILES: [&str; 4] = [PRD_FILE, TECHNOLOGY_FILE, DESIGN_FILE, TASKS_FILE];

/// Project-level paths.
#[derive(Debug, Clone)]
pub struct SnapPaths {
    pub root: PathBuf,
    pub snap_dir: PathBuf,
    pub gitignore_path: PathBuf,
    pub config_path: PathBuf,
    pub sessions_dir: PathBuf,
    /// State file used when running without a session (`run --tasks-dir`).
    pub legacy_state_path: PathBuf,
}

impl SnapPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let snap_dir = root.join(".snap");
        Self {
            root,
            gitignore_path: snap_dir.join(".gitignore"),
            config_path: snap_dir.join("config.toml"),
            sessions_dir: snap_dir.join("sessions"),
            legacy_state_path: snap_dir.join("state.json"),
            snap_dir,
        }
    }

    pub fn session(&self, name: &str) -> SessionPaths {
        SessionPaths::new(&self.root, name)
    }
}

/// Paths for one named session.
#[derive(Debug, Clone)]
pub struct SessionPaths {
    pub name: String,
    pub dir: PathBuf,
    pub tasks_dir: PathBuf,
    pub state_path: PathBuf,
    pub plan_marker_path: PathBuf,
}

impl SessionPaths {
    pub fn new(root: &Path, name: &str) -> Self {
        let dir = root.join(".snap").join("sessions").join(name);
        Self {
            name: name.to_string(),
            tasks_dir: dir.join("tasks"),
            state_path: dir.join("state.json"),
            plan_marker_path: dir.join(".plan-started"),
            dir,
        }
    }

    pub fn prd_path(&self) -> PathBuf {
        self.tasks_dir.join(PRD_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_paths_follow_layout() {
        let paths = SnapPaths::new("/p").session("auth");
        assert_eq!(paths.dir, Path::new("/p/.snap/sessions/auth"));
        assert_eq!(paths.tasks_dir, Path::new("/p/.snap/sessions/auth/tasks"));
        assert_eq!(paths.state_path, Path::new("/p/.snap/sessions/auth/state.json"));
        assert_eq!(paths.plan_marker_path, Path::new("/p/.snap/sessions/auth/.plan-started"));
        assert_eq!(paths.prd_path(), Path::new("/p/.snap/sessions/auth/tasks/PRD.md"));
    }

    #[test]
    fn project_paths_are_stable() {
        let paths = SnapPaths::new("/p");
        assert_eq!(paths.gitignore_path, Path::new("/p/.snap/.gitignore"));
        assert_eq!(paths.config_path, Path::new("/p/.snap/config.toml"));
        assert_eq!(paths.legacy_state_path, Path::new("/p/.snap/state.json"));
    }
}
