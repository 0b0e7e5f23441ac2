//! CLI tests for `snap plan` against a fake `claude` on PATH.
#![cfg(unix)]

use std::io::Write;
use std::process::{Command, Stdio};

use snap::exit_codes;
use snap::test_support::{TestProject, write_fake_provider};

/// Empty project, piped `/done`: the default session is created, both phases
/// run, and the planning marker is left behind.
#[test]
fn plan_in_empty_project_creates_default_session() {
    let project = TestProject::new();
    let path = write_fake_provider(
        &project.root().join("bin"),
        "claude",
        "echo 'Noted, thanks.'",
    );

    let mut child = Command::new(env!("CARGO_BIN_EXE_snap"))
        .current_dir(project.root())
        .env("PATH", path)
        .env_remove("SNAP_PROVIDER")
        .arg("plan")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn snap plan");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(b"/done\n")
        .expect("write stdin");
    let output = child.wait_with_output().expect("wait");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        output.status.code(),
        Some(exit_codes::OK),
        "stdout: {stdout}\nstderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout.contains("Planning session 'default'"));
    for header in [
        "Step 1/4 Generate PRD",
        "Step 2/4 Technology & design",
        "Step 3/4 Analyze tasks",
        "Step 4/4 Generate tasks",
    ] {
        assert!(stdout.contains(header), "missing {header}");
    }
    let last = stdout.lines().last().unwrap_or_default();
    assert!(last.contains("Planning complete"), "last line: {last}");

    let session = project.store.session_paths("default");
    assert!(session.dir.is_dir());
    assert!(session.plan_marker_path.is_file());
}

#[test]
fn plan_fails_fast_without_provider() {
    let project = TestProject::new();
    let output = Command::new(env!("CARGO_BIN_EXE_snap"))
        .current_dir(project.root())
        .env("PATH", project.root().join("empty-bin"))
        .env_remove("SNAP_PROVIDER")
        .arg("plan")
        .stdin(Stdio::null())
        .output()
        .expect("spawn snap plan");
    assert_eq!(output.status.code(), Some(exit_codes::ERROR));
    assert!(String::from_utf8_lossy(&output.stderr).contains("`claude` not found on PATH"));
    assert!(!project.store.exists("default"), "failed preflight left a session");
}

#[test]
fn plan_named_session_is_not_created_without_provider() {
    let project = TestProject::new();
    let output = Command::new(env!("CARGO_BIN_EXE_snap"))
        .current_dir(project.root())
        .env("PATH", project.root().join("empty-bin"))
        .env_remove("SNAP_PROVIDER")
        .args(["plan", "auth"])
        .stdin(Stdio::null())
        .output()
        .expect("spawn snap plan");
    assert_eq!(output.status.code(), Some(exit_codes::ERROR));
    assert!(!project.store.exists("auth"));
    assert!(!project.root().join(".snap/sessions").exists());
}
