//! Command implementations behind the `snap` binary.
//!
//! Each command resolves its session, loads config, and wires the stores and
//! adapters into the planner or runner. Argument parsing lives in `main.rs`.

use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, info, instrument, warn};

use crate::cancel::CancelToken;
use crate::core::state::WorkflowState;
use crate::core::steps::step;
use crate::core::tasks::Task;
use crate::io::config::{SnapConfig, load_effective_config};
use crate::io::executor::{CliExecutor, preflight};
use crate::io::git::snapshotter_for;
use crate::io::input::{LineReader, choose, confirm, spawn_directive_reader};
use crate::io::output::{Output, Style};
use crate::io::paths::SessionPaths;
use crate::io::session_store::{SessionInfo, SessionStore};
use crate::io::signals::install_signal_handler;
use crate::io::state_store::{FileStateStore, StateManager, probe_state};
use crate::io::task_scan::{count_tasks, scan_tasks};
use crate::plan::{PlanConfig, Planner};
use crate::queue::DirectiveQueue;
use crate::workflow::{RunConfig, Runner, RunnerDeps};

#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    pub name: Option<String>,
    /// Brief file; skips the requirements conversation.
    pub from: Option<PathBuf>,
    /// Clean existing artifacts without asking.
    pub force: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub name: Option<String>,
    pub fresh: bool,
    pub show_state: bool,
    pub json: bool,
    /// Run against a bare tasks directory instead of a session.
    pub tasks_dir: Option<PathBuf>,
    pub prd: Option<PathBuf>,
}

/// A session chosen for planning, after the conflict guard.
#[derive(Debug, Clone)]
pub struct PlanTarget {
    pub paths: SessionPaths,
    /// `.plan-started` existed, so the requirements conversation continues.
    pub resume: bool,
    pub brief: Option<String>,
}

/// Effective config plus an executor whose binary passed preflight.
pub struct Agent {
    config: SnapConfig,
    executor: CliExecutor,
}

/// Shared handles for one CLI invocation.
pub struct App {
    store: SessionStore,
    out: Output,
    style: Style,
    cancel: CancelToken,
    /// Both stdin and stdout are terminals.
    interactive: bool,
}

impl App {
    pub fn new(
        root: impl Into<PathBuf>,
        out: Output,
        style: Style,
        cancel: CancelToken,
        interactive: bool,
    ) -> Self {
        Self {
            store: SessionStore::new(root),
            out,
            style,
            cancel,
            interactive,
        }
    }

    fn root(&self) -> &Path {
        self.store.root()
    }

    fn config(&self) -> Result<SnapConfig> {
        load_effective_config(&self.store.snap_paths().config_path)
    }

    /// Route SIGINT/SIGTERM into the cancel token for long-running commands.
    fn watch_signals(&self) -> Result<()> {
        install_signal_handler(self.cancel.clone(), self.out.direct())
    }

    /// Load config and check the provider binary before anything is written.
    pub fn agent(&self) -> Result<Agent> {
        let config = self.config()?;
        let binary = preflight(config.provider)?;
        debug!(binary = %binary.display(), "provider found");
        let executor = CliExecutor::new(
            config.provider,
            config.model_names(),
            self.root(),
            config.stderr_limit_bytes,
        );
        Ok(Agent { config, executor })
    }

    pub fn new_session(&self, name: &str) -> Result<()> {
        let paths = self.store.create(name)?;
        self.out.line(self.style.success(&format!("Created session '{name}'")));
        self.out.line(format!("  tasks: {}", paths.tasks_dir.display()));
        self.out.line(format!("Next: snap plan {name}"));
        Ok(())
    }

    pub fn list(&self) -> Result<()> {
        let sessions = self.store.list()?;
        if sessions.is_empty() {
            self.out.line("No sessions. Create one with: snap new <name>");
            return Ok(());
        }
        for line in render_session_table(&sessions) {
            self.out.line(line);
        }
        Ok(())
    }

    pub fn delete(&self, name: &str, force: bool, input: &mut dyn BufRead) -> Result<()> {
        let paths = self.store.open(name)?;
        if !force {
            if !self.interactive {
                bail!("refusing to delete session '{name}' without confirmation; pass --force");
            }
            let mut out = self.out.clone();
            let prompt = format!("Delete session '{name}' and everything in {}?", paths.dir.display());
            if !confirm(input, &mut out, &prompt)? {
                self.out.line("Aborted");
                return Ok(());
            }
        }
        self.store.delete(name)?;
        info!(session = name, "session deleted");
        self.out.line(self.style.success(&format!("Deleted session '{name}'")));
        Ok(())
    }

    pub fn status(&self, name: Option<&str>) -> Result<()> {
        let paths = resolve_session(&self.store, name, "status")?;
        let info = self.store.info(&paths.name);
        for line in render_status(&info, &paths)? {
            self.out.line(line);
        }
        Ok(())
    }

    /// Pick (or create) the session to plan and apply the artifact guard.
    ///
    /// `input` is only read in interactive mode. Callers run [`App::agent`]
    /// first so a missing provider never leaves a new session behind.
    pub fn prepare_plan(&self, opts: &PlanOptions, input: &mut dyn BufRead) -> Result<PlanTarget> {
        let mut paths = self.plan_session(opts.name.as_deref())?;
        let name = paths.name.clone();

        if self.store.has_artifacts(&name)? {
            if opts.force {
                self.store.clean(&name)?;
                self.out.line(format!("Cleaned planning artifacts from '{name}'"));
            } else if self.interactive {
                paths = self.resolve_plan_conflict(&name, input)?;
            } else {
                return Err(plan_conflict(&name, &paths));
            }
        }

        let brief = match &opts.from {
            Some(path) => {
                let path = self.root().join(path);
                let text = fs::read_to_string(&path)
                    .with_context(|| format!("read brief {}", path.display()))?;
                if text.trim().is_empty() {
                    bail!("brief {} is empty", path.display());
                }
                Some(text)
            }
            None => None,
        };

        Ok(PlanTarget {
            resume: paths.plan_marker_path.exists(),
            paths,
            brief,
        })
    }

    fn plan_session(&self, name: Option<&str>) -> Result<SessionPaths> {
        match name {
            Some(name) if self.store.exists(name) => self.store.open(name),
            Some(name) => {
                let paths = self.store.create(name)?;
                self.out.line(format!("Created session '{name}'"));
                Ok(paths)
            }
            None => match self.store.names()?.as_slice() {
                [] => self.store.ensure_default(),
                [only] => self.store.open(only),
                names => Err(multiple_sessions(names, "plan")),
            },
        }
    }

    fn resolve_plan_conflict(&self, name: &str, input: &mut dyn BufRead) -> Result<SessionPaths> {
        let mut out = self.out.clone();
        let choice = choose(
            input,
            &mut out,
            &format!("Session '{name}' already has planning artifacts."),
            &[
                "Clean this session and plan again",
                "Plan into a new session",
                "Cancel",
            ],
        )?;
        match choice {
            0 => {
                self.store.clean(name)?;
                self.store.open(name)
            }
            1 => {
                write!(out, "New session name: ").context("write prompt")?;
                out.flush().context("flush prompt")?;
                let mut answer = String::new();
                input.read_line(&mut answer).context("read session name")?;
                let paths = self.store.create(answer.trim())?;
                self.out.line(format!("Created session '{}'", paths.name));
                Ok(paths)
            }
            _ => bail!("planning cancelled"),
        }
    }

    #[instrument(skip_all, fields(session = %target.paths.name))]
    pub fn plan(
        &self,
        agent: &Agent,
        target: &PlanTarget,
        lines: &mut dyn LineReader,
    ) -> Result<()> {
        let Agent { config, executor } = agent;
        self.watch_signals()?;

        let name = &target.paths.name;
        self.out.line(self.style.header(&format!(
            "Planning session '{name}' | {} | {}",
            config.provider,
            target.paths.tasks_dir.display()
        )));

        let plan_config = PlanConfig {
            tasks_dir: target.paths.tasks_dir.clone(),
            brief: target.brief.clone(),
            resume: target.resume,
            concurrency: config.plan_limit(),
        };
        Planner::new(executor, &self.cancel, &self.out, self.style).run(
            &plan_config,
            lines,
            || self.store.mark_plan_started(name),
        )?;

        let tasks = count_tasks(&target.paths.tasks_dir);
        self.out.line(self.style.success(&format!(
            "Planning complete: {tasks} tasks. Next: snap run {name}"
        )));
        Ok(())
    }

    #[instrument(skip_all, fields(session = ?opts.name, fresh = opts.fresh))]
    pub fn run(&self, opts: &RunOptions) -> Result<()> {
        let (state_store, tasks_dir, display_name) = match &opts.tasks_dir {
            Some(dir) => {
                let dir = self.root().join(dir);
                (
                    FileStateStore::legacy(self.store.snap_paths()),
                    dir.clone(),
                    dir.display().to_string(),
                )
            }
            None => {
                let paths = resolve_session(&self.store, opts.name.as_deref(), "run")?;
                (
                    FileStateStore::for_session(&paths),
                    paths.tasks_dir.clone(),
                    paths.name.clone(),
                )
            }
        };

        if opts.show_state {
            return self.show_state(&state_store, opts.json);
        }

        let prd_path = match &opts.prd {
            Some(prd) => self.root().join(prd),
            None => tasks_dir.join(crate::io::paths::PRD_FILE),
        };

        let Agent { config, executor } = self.agent()?;
        let snapshotter = snapshotter_for(self.root());
        let queue = DirectiveQueue::new();
        self.watch_signals()?;
        if self.interactive {
            spawn_directive_reader(queue.clone(), self.out.clone());
        }

        let run_config = RunConfig {
            tasks_dir,
            prd_path,
            fresh_start: opts.fresh,
            provider_name: config.provider.to_string(),
            is_tty: self.interactive,
            display_name,
            describe_tasks: config.describe_tasks,
        };
        Runner::new(
            run_config,
            RunnerDeps {
                executor: &executor,
                snapshotter: snapshotter.as_ref(),
                state: &state_store,
                queue: &queue,
                cancel: &self.cancel,
                out: &self.out,
                style: self.style,
            },
        )
        .run()
    }

    /// Print the saved state even when it violates an invariant, so the
    /// `--show-state` hint on [`StateError::Invalid`] is usable.
    ///
    /// [`StateError::Invalid`]: crate::error::StateError::Invalid
    fn show_state(&self, store: &FileStateStore, json: bool) -> Result<()> {
        let state = store.load_unchecked()?;
        let problems = state.as_ref().map(WorkflowState::validate).unwrap_or_default();
        for problem in &problems {
            warn!(path = %store.path().display(), problem = %problem, "saved state is invalid");
        }
        if json {
            let text = match &state {
                Some(state) => serde_json::to_string_pretty(state).context("serialize state")?,
                None => "{}".to_string(),
            };
            self.out.line(text);
            return Ok(());
        }
        match state {
            Some(state) => {
                for line in render_state(&state, store.path()) {
                    self.out.line(line);
                }
                if !problems.is_empty() {
                    self.out.line(self.style.failure("Invalid (run with --fresh to reset):"));
                    for problem in &problems {
                        self.out.line(format!("  - {problem}"));
                    }
                }
            }
            None => self
                .out
                .line(format!("No saved state at {}", store.path().display())),
        }
        Ok(())
    }
}

/// Resolve an optional session name for commands that need an existing session.
pub fn resolve_session(
    store: &SessionStore,
    name: Option<&str>,
    command: &str,
) -> Result<SessionPaths> {
    if let Some(name) = name {
        return store.open(name);
    }
    match store.names()?.as_slice() {
        [] => Err(anyhow!(
            "no sessions found in {}\n\nCreate one with: snap new <name>",
            store.snap_paths().sessions_dir.display()
        )),
        [only] => {
            debug!(session = %only, "auto-detected session");
            store.open(only)
        }
        names => Err(multiple_sessions(names, command)),
    }
}

fn multiple_sessions(names: &[String], command: &str) -> anyhow::Error {
    let mut msg = String::from("multiple sessions found:");
    for name in names {
        msg.push_str(&format!("\n  {name}"));
    }
    msg.push_str(&format!("\n\nChoose one: snap {command} <name>"));
    if command != "status" {
        msg.push_str("\nInspect progress: snap status <name>");
    }
    anyhow!(msg)
}

fn plan_conflict(name: &str, paths: &SessionPaths) -> anyhow::Error {
    anyhow!(
        "session '{name}' already has planning artifacts in {}\n\n\
         To re-plan from scratch: snap plan {name} --force\n\
         To discard the session: snap delete {name}\n\
         To plan separately: snap new <other-name>",
        paths.tasks_dir.display()
    )
}

/// `NAME  TASKS  DONE  STATUS` table, one row per session.
pub fn render_session_table(sessions: &[SessionInfo]) -> Vec<String> {
    let width = sessions
        .iter()
        .map(|s| s.name.len())
        .chain(std::iter::once("NAME".len()))
        .max()
        .unwrap_or(4);
    let mut lines = vec![format!("{:<width$}  {:>5}  {:>4}  STATUS", "NAME", "TASKS", "DONE")];
    for s in sessions {
        lines.push(format!(
            "{:<width$}  {:>5}  {:>4}  {}",
            s.name, s.task_count, s.completed_count, s.status
        ));
    }
    lines
}

fn render_status(info: &SessionInfo, paths: &SessionPaths) -> Result<Vec<String>> {
    let mut lines = vec![
        format!("Session: {}", info.name),
        format!("Tasks dir: {}", paths.tasks_dir.display()),
        format!("Status: {}", info.status),
    ];
    let state = match probe_state(&paths.state_path) {
        crate::core::status::StateProbe::Loaded(state) => Some(state),
        _ => None,
    };
    if let Some(state) = &state {
        if state.has_active_task() {
            lines.push(format!("Current: {}", describe_position(state)));
        }
        if !state.last_error.is_empty() {
            lines.push(format!("Last error: {}", state.last_error));
        }
    }

    let tasks = scan_tasks(&paths.tasks_dir)?;
    if tasks.is_empty() {
        lines.push(format!("No tasks yet. Run: snap plan {}", info.name));
        return Ok(lines);
    }
    lines.push(format!("Tasks ({}/{} done):", info.completed_count, tasks.len()));
    lines.extend(tasks.iter().map(|task| checklist_row(task, state.as_ref())));
    Ok(lines)
}

fn checklist_row(task: &Task, state: Option<&WorkflowState>) -> String {
    let Some(state) = state else {
        return format!("  [ ] {}", task.id);
    };
    if state.is_completed(&task.id) {
        format!("  [x] {}", task.id)
    } else if state.current_task_id == task.id {
        format!("  [>] {} (step {}/{})", task.id, state.current_step, state.total_steps)
    } else {
        format!("  [ ] {}", task.id)
    }
}

fn describe_position(state: &WorkflowState) -> String {
    match step(state.current_step) {
        Some(def) => format!(
            "{} step {}/{} ({})",
            state.current_task_id, state.current_step, state.total_steps, def.name
        ),
        None => format!("{} all steps done", state.current_task_id),
    }
}

fn render_state(state: &WorkflowState, path: &Path) -> Vec<String> {
    let mut lines = vec![
        format!("State file: {}", path.display()),
        format!("Tasks dir: {}", state.tasks_dir),
        format!("PRD: {}", state.prd_path),
    ];
    if state.has_active_task() {
        lines.push(format!(
            "Current task: {} ({})",
            describe_position(state),
            state.current_task_file
        ));
    } else {
        lines.push("Current task: none".to_string());
    }
    let completed = if state.completed_task_ids.is_empty() {
        "none".to_string()
    } else {
        state.completed_task_ids.join(", ")
    };
    lines.push(format!("Completed: {completed}"));
    lines.push(format!("Last updated: {}", state.last_updated.to_rfc3339()));
    if !state.last_error.is_empty() {
        lines.push(format!("Last error: {}", state.last_error));
    }
    lines
}
