//! CLI tests for session management: `new`, `list`, `delete`, and the
//! session-resolution and plan-conflict errors.
//!
//! None of these commands reach the agent, so no provider is needed on PATH.

use std::fs;
use std::process::{Command, Output};

use snap::exit_codes;
use snap::test_support::TestProject;

fn snap(project: &TestProject, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_snap"))
        .current_dir(project.root())
        .env_remove("SNAP_PROVIDER")
        .env("NO_COLOR", "1")
        .args(args)
        .output()
        .expect("spawn snap")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn new_list_delete_round_trip() {
    let project = TestProject::new();

    let created = snap(&project, &["new", "auth"]);
    assert_eq!(created.status.code(), Some(exit_codes::OK));
    assert!(stdout(&created).contains("Created session 'auth'"));
    assert!(project.root().join(".snap/sessions/auth/tasks").is_dir());
    assert_eq!(
        fs::read_to_string(project.root().join(".snap/.gitignore")).expect("gitignore"),
        "*\n!.gitignore\n"
    );

    let listed = snap(&project, &["list"]);
    let text = stdout(&listed);
    assert!(text.starts_with("NAME"));
    assert!(text.contains("auth"));
    assert!(text.contains("no tasks"));

    let deleted = snap(&project, &["delete", "auth", "--force"]);
    assert_eq!(deleted.status.code(), Some(exit_codes::OK));
    assert!(!project.store.exists("auth"));

    let again = snap(&project, &["delete", "auth", "--force"]);
    assert_eq!(again.status.code(), Some(exit_codes::ERROR));
    assert!(stderr(&again).contains("session 'auth' not found"));
}

#[test]
fn new_rejects_invalid_and_duplicate_names() {
    let project = TestProject::new();
    let bad = snap(&project, &["new", "has space"]);
    assert_eq!(bad.status.code(), Some(exit_codes::ERROR));
    assert!(stderr(&bad).contains("invalid session name"));

    assert!(snap(&project, &["new", "auth"]).status.success());
    let dup = snap(&project, &["new", "auth"]);
    assert_eq!(dup.status.code(), Some(exit_codes::ERROR));
    assert!(stderr(&dup).contains("already exists"));
}

#[test]
fn delete_without_force_refuses_when_not_interactive() {
    let project = TestProject::new();
    project.session_with_tasks("auth", &[1]);
    let output = snap(&project, &["delete", "auth"]);
    assert_eq!(output.status.code(), Some(exit_codes::ERROR));
    assert!(stderr(&output).contains("--force"));
    assert!(project.store.exists("auth"));
}

/// A session that already has `TASK1.md` cannot be re-planned without
/// `--force` when stdin is not a terminal.
#[test]
fn plan_refuses_session_with_artifacts() {
    let project = TestProject::new();
    project.session_with_tasks("auth", &[1]);

    let output = snap(&project, &["plan", "auth"]);
    assert_ne!(output.status.code(), Some(exit_codes::OK));
    let err = stderr(&output);
    assert!(err.contains("already has planning artifacts"));
    assert!(err.contains("snap delete auth"));
    assert!(err.contains("snap new"));
}

#[test]
fn bare_run_with_several_sessions_asks_for_a_name() {
    let project = TestProject::new();
    project.session_with_tasks("auth", &[1]);
    project.session_with_tasks("api", &[1]);

    let output = snap(&project, &["run"]);
    assert_eq!(output.status.code(), Some(exit_codes::ERROR));
    let err = stderr(&output);
    assert!(err.contains("multiple sessions found"));
    assert!(err.contains("auth"));
    assert!(err.contains("api"));
    assert!(err.contains("snap run <name>"));
}

#[test]
fn status_reports_task_checklist() {
    let project = TestProject::new();
    project.session_with_tasks("auth", &[1, 2]);
    let output = snap(&project, &["status"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let text = stdout(&output);
    assert!(text.contains("Session: auth"));
    assert!(text.contains("Status: idle"));
    assert!(text.contains("  [ ] TASK1\n  [ ] TASK2"));
}

#[test]
fn show_state_works_without_a_provider() {
    let project = TestProject::new();
    project.session_with_tasks("auth", &[1]);
    let output = snap(&project, &["run", "auth", "--show-state"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(stdout(&output).contains("No saved state"));
}
