//! Filesystem side of task discovery.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::tasks::{Task, collect_tasks, prd_has_task_headers, suggest_canonical_name};
use crate::error::TaskDirEmpty;
use crate::io::paths::PRD_FILE;

/// Regular-file names directly under `dir`, sorted. Missing dir = empty.
pub fn regular_file_names(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        let file_type = entry
            .file_type()
            .with_context(|| format!("stat {}", entry.path().display()))?;
        if !file_type.is_file() {
            continue;
        }
        names.push(entry.file_name().to_string_lossy().to_string());
    }
    names.sort();
    Ok(names)
}

/// Enumerate `TASK<n>.md` files in ascending numeric order.
pub fn scan_tasks(dir: &Path) -> Result<Vec<Task>> {
    let names = regular_file_names(dir)?;
    let tasks = collect_tasks(names.iter().map(String::as_str))
        .with_context(|| format!("scan tasks in {}", dir.display()))?;
    debug!(dir = %dir.display(), count = tasks.len(), "scanned tasks");
    Ok(tasks)
}

/// Count strict task files, treating a conflicting directory as unreadable (0).
pub fn count_tasks(dir: &Path) -> usize {
    scan_tasks(dir).map(|tasks| tasks.len()).unwrap_or(0)
}

/// User-facing hints for a tasks directory without task files.
pub fn diagnose_empty_task_dir(dir: &Path) -> Vec<String> {
    let mut hints = Vec::new();
    if !dir.is_dir() {
        hints.push(format!("directory {} does not exist", dir.display()));
        return hints;
    }
    for name in regular_file_names(dir).unwrap_or_default() {
        if let Some(canonical) = suggest_canonical_name(&name) {
            hints.push(format!(
                "found {name}; task files are case-sensitive, rename it to {canonical}"
            ));
        }
    }
    let prd = dir.join(PRD_FILE);
    if fs::read_to_string(&prd).is_ok_and(|text| prd_has_task_headers(&text)) {
        hints.push(format!(
            "{} contains `## TASK<n>:` sections; split each into its own TASK<n>.md file",
            prd.display()
        ));
    }
    hints
}

/// Build the structured error for an empty tasks directory.
pub fn task_dir_empty(dir: &Path) -> TaskDirEmpty {
    TaskDirEmpty {
        path: dir.to_path_buf(),
        hints: diagnose_empty_task_dir(dir),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_directories_and_other_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path();
        fs::create_dir(dir.join("TASK3.md")).expect("dir named like a task");
        fs::write(dir.join("TASK2.md"), "two").expect("write");
        fs::write(dir.join("TASK1.md"), "one").expect("write");
        fs::write(dir.join("PRD.md"), "prd").expect("write");

        let tasks = scan_tasks(dir).expect("scan");
        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["TASK1", "TASK2"]);
        assert_eq!(count_tasks(dir), 2);
    }

    #[test]
    fn conflicting_numbers_fail_scan() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("TASK1.md"), "").expect("write");
        fs::write(temp.path().join("TASK01.md"), "").expect("write");
        let err = scan_tasks(temp.path()).unwrap_err();
        assert!(format!("{err:#}").contains("conflicting task files"));
    }

    #[test]
    fn missing_dir_scans_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(scan_tasks(&temp.path().join("nope")).expect("scan").is_empty());
    }

    #[test]
    fn diagnoses_case_mismatch_and_prd_headers() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path();
        fs::write(dir.join("task1.md"), "").expect("write");
        fs::write(dir.join("PRD.md"), "# PRD\n## TASK1: Login\n").expect("write");

        let hints = diagnose_empty_task_dir(dir);
        assert_eq!(hints.len(), 2, "{hints:?}");
        assert!(hints[0].contains("rename it to TASK1.md"));
        assert!(hints[1].contains("## TASK<n>:"));

        let msg = task_dir_empty(dir).to_string();
        assert!(msg.contains("To get started:"));
    }
}
