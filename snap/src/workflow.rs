//! Resumable per-task workflow runner.
//!
//! Each task runs the fixed ten-step pipeline. Between adjacent steps the
//! runner snapshots the tree, drains queued directives, then persists the
//! next step index, so an interrupted run resumes where it stopped.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::cancel::CancelToken;
use crate::core::elapsed::format_elapsed;
use crate::core::state::WorkflowState;
use crate::core::steps::{TOTAL_STEPS, snapshot_message, step};
use crate::core::tasks::{Task, find_task, parse_task_filename, select_next_task};
use crate::core::types::{ModelHint, agent_args};
use crate::error::{StateError, is_cancelled};
use crate::io::executor::Executor;
use crate::io::git::Snapshotter;
use crate::io::output::{Output, Style};
use crate::io::prompt::{self, TaskPromptInput, with_suffixes};
use crate::io::state_store::StateManager;
use crate::io::task_scan::{scan_tasks, task_dir_empty};
use crate::queue::{DirectiveQueue, drain_directives};

pub const DIRECTIVE_HINT: &str = "Type a directive and press Enter to queue it between steps";

/// Longest task description shown in the header.
const DESCRIPTION_MAX_CHARS: usize = 100;

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub tasks_dir: PathBuf,
    pub prd_path: PathBuf,
    /// Discard saved progress before starting.
    pub fresh_start: bool,
    pub provider_name: String,
    pub is_tty: bool,
    /// Session name, or the tasks directory in legacy mode.
    pub display_name: String,
    /// Ask the agent for a one-line summary before each task.
    pub describe_tasks: bool,
}

/// Where a run begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Startup {
    /// Continue the saved task at its saved step.
    Resume { task: Task, step: u32 },
    /// Pick the next incomplete task.
    Select,
}

/// Capabilities the runner drives.
pub struct RunnerDeps<'a> {
    pub executor: &'a dyn Executor,
    pub snapshotter: &'a dyn Snapshotter,
    pub state: &'a dyn StateManager,
    pub queue: &'a DirectiveQueue,
    pub cancel: &'a CancelToken,
    pub out: &'a Output,
    pub style: Style,
}

pub struct Runner<'a> {
    config: RunConfig,
    deps: RunnerDeps<'a>,
}

impl<'a> Runner<'a> {
    pub fn new(config: RunConfig, deps: RunnerDeps<'a>) -> Self {
        Self { config, deps }
    }

    /// Run tasks until all are complete, a step fails, or the run is cancelled.
    #[instrument(skip_all, fields(display = %self.config.display_name))]
    pub fn run(&self) -> Result<()> {
        let mut state = self.load_state()?;
        let startup = resolve_startup(&mut state, &self.config.tasks_dir, self.deps.state.path())?;

        let mut summary = Some(startup.clone());
        let mut pending_resume = match startup {
            Startup::Resume { task, .. } => Some(task),
            Startup::Select => None,
        };

        loop {
            self.deps.cancel.check()?;
            let task = match pending_resume.take() {
                Some(task) => task,
                None => match self.select_task(&mut state)? {
                    Some(task) => task,
                    None => return Ok(()),
                },
            };
            if let Some(startup) = summary.take() {
                self.print_summary(&state, &task, &startup)?;
            }
            self.run_task(&mut state, &task)?;
        }
    }

    fn load_state(&self) -> Result<WorkflowState> {
        let store = self.deps.state;
        if self.config.fresh_start {
            store.reset()?;
            self.deps
                .out
                .line("Fresh start requested, ignoring saved progress");
        }
        let mut state = match store.load() {
            Ok(Some(state)) => state,
            Ok(None) => self.new_state(),
            Err(err) => match err.downcast_ref::<StateError>() {
                Some(StateError::Corrupt { .. }) => {
                    warn!(err = %err, "corrupt state, resetting");
                    self.deps.out.line(
                        self.deps
                            .style
                            .failure(&format!("Warning: {err}; starting from scratch")),
                    );
                    store.reset()?;
                    self.new_state()
                }
                _ => return Err(err),
            },
        };
        if state.upgrade_total_steps(TOTAL_STEPS) {
            debug!(total = TOTAL_STEPS, "upgraded total_steps");
        }
        state.tasks_dir = self.config.tasks_dir.display().to_string();
        state.prd_path = self.config.prd_path.display().to_string();
        Ok(state)
    }

    fn new_state(&self) -> WorkflowState {
        WorkflowState::new(
            self.config.tasks_dir.display().to_string(),
            self.config.prd_path.display().to_string(),
        )
    }

    /// Start the next incomplete task, or finish the run when none remain.
    fn select_task(&self, state: &mut WorkflowState) -> Result<Option<Task>> {
        let tasks = scan_tasks(&self.config.tasks_dir)?;
        if tasks.is_empty() {
            return Err(task_dir_empty(&self.config.tasks_dir).into());
        }
        let Some(next) = select_next_task(&tasks, &state.completed_task_ids) else {
            self.deps.out.line(
                self.deps
                    .style
                    .success(&format!("All {} tasks complete", tasks.len())),
            );
            self.deps.state.reset()?;
            info!(tasks = tasks.len(), "all tasks complete");
            return Ok(None);
        };
        let next = next.clone();
        state.start_task(&next);
        self.deps.state.save(state).context("save workflow state")?;
        Ok(Some(next))
    }

    fn print_summary(&self, state: &WorkflowState, task: &Task, startup: &Startup) -> Result<()> {
        let total = scan_tasks(&self.config.tasks_dir)?.len();
        let action = match startup {
            Startup::Resume { step, .. } => format!("resuming {} from step {step}", task.id),
            Startup::Select => format!("starting {}", task.id),
        };
        self.deps.out.line(format!(
            "snap: {} | {} | {total} tasks ({} done) | {action}",
            self.config.display_name,
            self.config.provider_name,
            state.completed_task_ids.len(),
        ));
        if self.config.is_tty && *startup == Startup::Select {
            self.deps.out.line(self.deps.style.dim(DIRECTIVE_HINT));
        }
        Ok(())
    }

    fn run_task(&self, state: &mut WorkflowState, task: &Task) -> Result<()> {
        let task_path = self.config.tasks_dir.join(&task.filename);
        let started = Instant::now();

        let description = if state.current_step == 1 && self.config.describe_tasks {
            self.describe(&task_path)
        } else {
            None
        };
        let header = match description {
            Some(text) => format!("{}: {text}", task.id),
            None => format!("{} ({})", task.id, task.filename),
        };
        self.deps.out.line(self.deps.style.header(&header));

        let input = TaskPromptInput {
            prd_path: &self.config.prd_path,
            task_path: &task_path,
            task_id: &task.id,
        };

        while state.current_step <= TOTAL_STEPS {
            self.deps.cancel.check()?;
            let index = state.current_step;
            self.run_step(state, task, index, &input)?;
            self.between_steps(task, index);
            state.mark_step_complete();
            self.deps.state.save(state).context("save workflow state")?;
        }

        state.complete_task();
        self.deps.state.save(state).context("save workflow state")?;
        self.deps.out.line(self.deps.style.success(&format!(
            "{} complete ({})",
            task.id,
            format_elapsed(started.elapsed())
        )));
        info!(task = %task.id, "task complete");
        Ok(())
    }

    fn run_step(
        &self,
        state: &mut WorkflowState,
        task: &Task,
        index: u32,
        input: &TaskPromptInput<'_>,
    ) -> Result<()> {
        let def = step(index).ok_or_else(|| anyhow!("step {index} out of range"))?;
        self.deps.out.line(
            self.deps
                .style
                .header(&format!("Step {index}/{TOTAL_STEPS} {}", def.name)),
        );
        let started = Instant::now();
        let body = prompt::step_prompt(def.prompt, input)?;
        let args = agent_args(with_suffixes(&body, !def.is_commit()), def.continues);

        let mut sink = self.deps.out.clone();
        match self
            .deps
            .executor
            .run(self.deps.cancel, &mut sink, def.model, &args)
        {
            Ok(()) => {
                self.deps.out.line(self.deps.style.success(&format!(
                    "  {} done ({})",
                    def.name,
                    format_elapsed(started.elapsed())
                )));
                Ok(())
            }
            Err(err) if is_cancelled(&err) => Err(err),
            Err(err) => {
                let err = err.context(format!(
                    "{} step {index}/{TOTAL_STEPS} ({})",
                    task.id, def.name
                ));
                self.deps.out.line(
                    self.deps
                        .style
                        .failure(&format!("  {} failed", def.name)),
                );
                state.record_error(format!("{err:#}"));
                self.deps
                    .state
                    .save(state)
                    .context("save workflow state after step failure")?;
                Err(err)
            }
        }
    }

    /// Snapshot (non-commit steps) then run queued directives.
    fn between_steps(&self, task: &Task, index: u32) {
        let Some(def) = step(index) else {
            return;
        };
        if !def.is_commit() {
            let message = snapshot_message(&task.id, index, def);
            match self.deps.snapshotter.capture(self.deps.cancel, &message) {
                Ok(true) => debug!(message = %message, "snapshot stored"),
                Ok(false) => debug!("tree clean, no snapshot"),
                Err(err) => warn!(err = %format!("{err:#}"), "snapshot failed"),
            }
        }
        drain_directives(
            self.deps.queue,
            self.deps.executor,
            self.deps.cancel,
            self.deps.out,
            self.deps.style,
        );
    }

    /// Best-effort one-line summary; any failure yields `None`.
    fn describe(&self, task_path: &Path) -> Option<String> {
        let prompt = prompt::describe_task(task_path).ok()?;
        let mut buf = Vec::new();
        let args = agent_args(with_suffixes(&prompt, true), false);
        if let Err(err) = self
            .deps
            .executor
            .run(self.deps.cancel, &mut buf, ModelHint::Fast, &args)
        {
            debug!(err = %err, "task description failed");
            return None;
        }
        let text = String::from_utf8_lossy(&buf);
        let line = text.lines().map(str::trim).rfind(|l| !l.is_empty())?;
        Some(line.chars().take(DESCRIPTION_MAX_CHARS).collect())
    }
}

/// Decide between resuming the saved task and selecting a new one.
///
/// Resume requires the task file to exist (the filename is backfilled when
/// the record lacks it), the task not to be completed, and the step to lie in
/// `1..=total_steps + 1`.
pub fn resolve_startup(
    state: &mut WorkflowState,
    tasks_dir: &Path,
    state_path: &Path,
) -> Result<Startup> {
    if !state.has_active_task() {
        return Ok(Startup::Select);
    }
    let invalid = |reason: String| -> anyhow::Error {
        StateError::Invalid {
            path: state_path.to_path_buf(),
            reason,
        }
        .into()
    };
    let id = state.current_task_id.clone();

    if state.current_task_file.is_empty() {
        let tasks = scan_tasks(tasks_dir)?;
        let task = find_task(&tasks, &id).ok_or_else(|| {
            invalid(format!(
                "current task {id} has no task file in {}",
                tasks_dir.display()
            ))
        })?;
        state.current_task_file = task.filename.clone();
    }
    let task = parse_task_filename(&state.current_task_file)
        .filter(|task| task.id == id)
        .ok_or_else(|| {
            invalid(format!(
                "current task file {} does not match {id}",
                state.current_task_file
            ))
        })?;
    if !tasks_dir.join(&task.filename).is_file() {
        return Err(invalid(format!(
            "current task file {} not found in {}",
            task.filename,
            tasks_dir.display()
        )));
    }
    if state.is_completed(&id) {
        return Err(invalid(format!("current task {id} is already completed")));
    }
    if state.current_step < 1 || state.current_step > state.total_steps + 1 {
        return Err(invalid(format!(
            "current step {} outside 1..={}",
            state.current_step,
            state.total_steps + 1
        )));
    }
    Ok(Startup::Resume {
        step: state.current_step,
        task,
    })
}
