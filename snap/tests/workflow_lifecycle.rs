//! Runner lifecycle tests against a real git checkout.
//!
//! These drive `Runner::run` with a scripted agent to verify snapshot
//! publication, index preservation, and checkpointing across a full task.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use snap::cancel::CancelToken;
use snap::core::steps::{STEPS, TOTAL_STEPS, snapshot_message, step};
use snap::io::git::{Git, GitSnapshotter};
use snap::io::output::{Output, Style};
use snap::io::paths::SessionPaths;
use snap::io::state_store::{FileStateStore, StateManager};
use snap::queue::DirectiveQueue;
use snap::test_support::{RecordingSnapshotter, ScriptedExecutor, SharedBuffer, TestProject};
use snap::workflow::{RunConfig, Runner, RunnerDeps};

fn run_config(paths: &SessionPaths) -> RunConfig {
    RunConfig {
        tasks_dir: paths.tasks_dir.clone(),
        prd_path: paths.prd_path(),
        fresh_start: false,
        provider_name: "claude".to_string(),
        is_tty: false,
        display_name: paths.name.clone(),
        describe_tasks: false,
    }
}

fn git_output(root: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(args)
        .current_dir(root)
        .output()
        .expect("spawn git");
    assert!(out.status.success(), "git {} failed", args.join(" "));
    String::from_utf8_lossy(&out.stdout).to_string()
}

/// Agent that appends a line to README.md on every call.
fn readme_editor(root: PathBuf) -> ScriptedExecutor {
    let counter = AtomicU32::new(0);
    ScriptedExecutor::new(move |_call| {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        let mut file = OpenOptions::new()
            .append(true)
            .open(root.join("README.md"))?;
        writeln!(file, "edit {n}")?;
        Ok(())
    })
}

/// One full iteration: one stash entry per non-commit step, in order, with
/// untracked files still untracked and staged files still staged.
#[test]
fn full_iteration_snapshots_each_non_commit_step() {
    let project = TestProject::with_git();
    let root = project.root().to_path_buf();
    let paths = project.session_with_tasks("auth", &[1]);

    fs::write(root.join("untracked.txt"), "scratch\n").expect("write");
    fs::write(root.join("staged.txt"), "staged\n").expect("write");
    git_output(&root, &["add", "staged.txt"]);

    let executor = readme_editor(root.clone());
    let snapshotter = GitSnapshotter::new(Git::new(&root));
    let store = FileStateStore::for_session(&paths);
    let queue = DirectiveQueue::new();
    let cancel = CancelToken::new();
    let buf = SharedBuffer::default();
    let out = Output::new(Box::new(buf.clone()));

    Runner::new(
        run_config(&paths),
        RunnerDeps {
            executor: &executor,
            snapshotter: &snapshotter,
            state: &store,
            queue: &queue,
            cancel: &cancel,
            out: &out,
            style: Style::plain(),
        },
    )
    .run()
    .expect("run");

    assert_eq!(executor.calls().len(), STEPS.len());

    let expected: Vec<String> = (1..=TOTAL_STEPS)
        .filter_map(|i| step(i).map(|def| (i, def)))
        .filter(|(_, def)| !def.is_commit())
        .map(|(i, def)| snapshot_message("TASK1", i, def))
        .rev()
        .collect();
    let stashes = Git::new(&root).stash_list().expect("stash list");
    assert_eq!(stashes, expected);

    let status = git_output(&root, &["status", "--porcelain"]);
    assert!(status.lines().any(|l| l == "?? untracked.txt"), "status: {status}");
    assert!(status.lines().any(|l| l == "A  staged.txt"), "status: {status}");
    assert!(status.lines().any(|l| l == " M README.md"), "status: {status}");

    assert!(!store.exists(), "state is reset once every task is done");
    assert!(buf.contents().contains("All 1 tasks complete"));
}

/// Every checkpoint leaves `current_step` at the next step with no error.
#[test]
fn state_checkpoints_after_every_step() {
    let project = TestProject::new();
    let paths = project.session_with_tasks("auth", &[1, 2]);
    let store = FileStateStore::for_session(&paths);
    let observed: Arc<Mutex<Vec<(String, u64)>>> = Arc::default();

    let state_path = paths.state_path.clone();
    let sink = Arc::clone(&observed);
    let executor = ScriptedExecutor::new(move |_call| {
        // The previous checkpoint is on disk before this call starts.
        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&state_path)?)?;
        assert_eq!(value["last_error"], "");
        sink.lock().expect("observed lock").push((
            value["current_task_id"].as_str().unwrap_or_default().to_string(),
            value["current_step"].as_u64().unwrap_or_default(),
        ));
        Ok(())
    });

    let snapshots = RecordingSnapshotter::default();
    let queue = DirectiveQueue::new();
    let cancel = CancelToken::new();
    let out = Output::new(Box::new(SharedBuffer::default()));
    Runner::new(
        run_config(&paths),
        RunnerDeps {
            executor: &executor,
            snapshotter: &snapshots,
            state: &store,
            queue: &queue,
            cancel: &cancel,
            out: &out,
            style: Style::plain(),
        },
    )
    .run()
    .expect("run");

    let expected: Vec<(String, u64)> = ["TASK1", "TASK2"]
        .iter()
        .flat_map(|id| (1..=u64::from(TOTAL_STEPS)).map(move |s| (id.to_string(), s)))
        .collect();
    assert_eq!(*observed.lock().expect("observed lock"), expected);
    assert_eq!(snapshots.messages().len(), 16);
    assert!(!store.exists());
}

/// A step failure leaves a resumable checkpoint; the next run resumes there.
#[test]
fn failed_run_resumes_at_the_failed_step() {
    let project = TestProject::new();
    let paths = project.session_with_tasks("auth", &[1]);
    let store = FileStateStore::for_session(&paths);
    let snapshots = RecordingSnapshotter::default();
    let queue = DirectiveQueue::new();
    let cancel = CancelToken::new();
    let buf = SharedBuffer::default();
    let out = Output::new(Box::new(buf.clone()));

    let failing = ScriptedExecutor::new(|call| {
        if call.prompt().contains("Update the project documentation") {
            anyhow::bail!("agent exited with status 1");
        }
        Ok(())
    });
    let err = Runner::new(
        run_config(&paths),
        RunnerDeps {
            executor: &failing,
            snapshotter: &snapshots,
            state: &store,
            queue: &queue,
            cancel: &cancel,
            out: &out,
            style: Style::plain(),
        },
    )
    .run()
    .expect_err("step 7 fails");
    assert!(format!("{err:#}").contains("TASK1 step 7/10 (Update docs)"));
    let saved = store.load().expect("load").expect("state");
    assert_eq!(saved.current_step, 7);
    assert!(saved.last_error.contains("agent exited with status 1"));

    let healthy = ScriptedExecutor::ok();
    Runner::new(
        run_config(&paths),
        RunnerDeps {
            executor: &healthy,
            snapshotter: &snapshots,
            state: &store,
            queue: &queue,
            cancel: &cancel,
            out: &out,
            style: Style::plain(),
        },
    )
    .run()
    .expect("resume");
    assert_eq!(healthy.calls().len(), 4);
    assert!(buf.contents().contains("resuming TASK1 from step 7"));
    assert!(!store.exists());
}
