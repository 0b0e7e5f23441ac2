//! Planning pipeline: requirements conversation, then document generation.
//!
//! Phase 1 talks with the user until `/done` (skipped when a brief file is
//! given). Phase 2 is a fixed four-step graph whose second step fans out into
//! two independent conversations. Artifacts are written by the agent; this
//! module only sequences the calls and reports progress.

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::cancel::CancelToken;
use crate::core::elapsed::format_elapsed;
use crate::core::types::{ModelHint, agent_args};
use crate::error::is_cancelled;
use crate::io::executor::Executor;
use crate::io::input::LineReader;
use crate::io::output::{Output, Style};
use crate::io::prompt::{self, with_suffixes};

/// Number of Phase 2 steps.
pub const PLAN_STEPS: usize = 4;

/// Ends the requirements conversation (case-insensitive).
pub const DONE_SENTINEL: &str = "/done";

#[derive(Debug, Clone)]
pub struct PlanConfig {
    pub tasks_dir: PathBuf,
    /// Brief from `--from`; skips Phase 1.
    pub brief: Option<String>,
    /// Planning was started before; continue the requirements conversation.
    pub resume: bool,
    /// Bound on concurrent siblings in a parallel step.
    pub concurrency: Option<usize>,
}

/// One agent call in a parallel step.
struct Sibling {
    name: &'static str,
    prompt: String,
}

struct SiblingOutcome {
    name: &'static str,
    result: Result<()>,
    elapsed: Duration,
    output: Vec<u8>,
}

/// Fires a callback at most once.
struct Once<F: FnOnce() -> Result<()>> {
    callback: Option<F>,
}

impl<F: FnOnce() -> Result<()>> Once<F> {
    fn new(callback: F) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    fn fire(&mut self) -> Result<()> {
        match self.callback.take() {
            Some(callback) => callback(),
            None => Ok(()),
        }
    }
}

pub struct Planner<'a> {
    executor: &'a dyn Executor,
    cancel: &'a CancelToken,
    out: &'a Output,
    style: Style,
}

impl<'a> Planner<'a> {
    pub fn new(
        executor: &'a dyn Executor,
        cancel: &'a CancelToken,
        out: &'a Output,
        style: Style,
    ) -> Self {
        Self {
            executor,
            cancel,
            out,
            style,
        }
    }

    /// Run both phases. `after_first_success` fires once, right after the
    /// first agent call that succeeds.
    #[instrument(skip_all, fields(tasks_dir = %config.tasks_dir.display(), resume = config.resume))]
    pub fn run(
        &self,
        config: &PlanConfig,
        lines: &mut dyn LineReader,
        after_first_success: impl FnOnce() -> Result<()>,
    ) -> Result<()> {
        let mut first_success = Once::new(after_first_success);
        let gathered = config.brief.is_none();
        if gathered {
            self.gather_requirements(config, lines, &mut first_success)?;
        } else {
            debug!("brief supplied, skipping requirements conversation");
        }
        self.generate_documents(config, gathered, &mut first_success)
    }

    fn gather_requirements<F: FnOnce() -> Result<()>>(
        &self,
        config: &PlanConfig,
        lines: &mut dyn LineReader,
        first_success: &mut Once<F>,
    ) -> Result<()> {
        self.out
            .line(self.style.header("Gathering requirements (type /done when finished)"));
        let opening = prompt::requirements(&config.tasks_dir)?;
        self.converse(&agent_args(opening, config.resume))?;
        first_success.fire().context("record planning start")?;

        loop {
            let line = match lines.next_line(self.cancel) {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!("input closed, ending requirements conversation");
                    break;
                }
                Err(err) => return Err(self.aborted(err)),
            };
            let text = line.trim();
            if text.eq_ignore_ascii_case(DONE_SENTINEL) {
                break;
            }
            if text.is_empty() {
                continue;
            }
            self.converse(&agent_args(text, true))?;
        }
        info!("requirements gathered");
        Ok(())
    }

    /// Interactive turn: streamed straight to the user, no autonomy suffix.
    fn converse(&self, args: &[String]) -> Result<()> {
        let mut sink = self.out.clone();
        self.executor
            .run(self.cancel, &mut sink, ModelHint::Thinking, args)
            .map_err(|err| self.aborted(err))
    }

    fn aborted(&self, err: anyhow::Error) -> anyhow::Error {
        if is_cancelled(&err) {
            self.out.line(self.style.failure("Planning aborted"));
        }
        err
    }

    fn generate_documents<F: FnOnce() -> Result<()>>(
        &self,
        config: &PlanConfig,
        gathered: bool,
        first_success: &mut Once<F>,
    ) -> Result<()> {
        let tasks_dir = &config.tasks_dir;

        let prd = prompt::prd(tasks_dir, config.brief.as_deref())?;
        self.single_step(1, "Generate PRD", prd, gathered)?;
        first_success.fire().context("record planning start")?;

        let siblings = vec![
            Sibling {
                name: "Technology plan",
                prompt: prompt::technology(tasks_dir)?,
            },
            Sibling {
                name: "Design spec",
                prompt: prompt::design(tasks_dir)?,
            },
        ];
        self.parallel_step(2, "Technology & design", siblings, config.concurrency)?;

        let analyze = prompt::analyze_tasks(tasks_dir)?;
        self.single_step(3, "Analyze tasks", analyze, false)?;

        let generate = prompt::generate_tasks(tasks_dir)?;
        self.single_step(4, "Generate tasks", generate, true)?;
        Ok(())
    }

    fn step_header(&self, index: usize, name: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            self.announce_abort(index);
            self.cancel.check()?;
        }
        self.out
            .line(self.style.header(&format!("Step {index}/{PLAN_STEPS} {name}")));
        Ok(())
    }

    fn announce_abort(&self, index: usize) {
        self.out.line(
            self.style
                .failure(&format!("Planning aborted at step {index}/{PLAN_STEPS}")),
        );
    }

    fn step_failed(&self, index: usize, name: &str, err: anyhow::Error) -> anyhow::Error {
        if is_cancelled(&err) {
            self.announce_abort(index);
            return err;
        }
        self.out.line(
            self.style
                .failure(&format!("step {index}/{PLAN_STEPS} {name} failed")),
        );
        err.context(format!("planning step {index}/{PLAN_STEPS} ({name})"))
    }

    fn single_step(&self, index: usize, name: &str, prompt: String, continues: bool) -> Result<()> {
        self.step_header(index, name)?;
        let started = Instant::now();
        let args = agent_args(with_suffixes(&prompt, true), continues);
        let mut sink = self.out.clone();
        self.executor
            .run(self.cancel, &mut sink, ModelHint::Thinking, &args)
            .map_err(|err| self.step_failed(index, name, err))?;
        self.out.line(self.style.success(&format!(
            "  {name} done ({})",
            format_elapsed(started.elapsed())
        )));
        Ok(())
    }

    /// Run siblings concurrently, each a fresh conversation with its own
    /// buffer. Every sibling is awaited; the step fails if any did.
    fn parallel_step(
        &self,
        index: usize,
        name: &str,
        siblings: Vec<Sibling>,
        limit: Option<usize>,
    ) -> Result<()> {
        self.step_header(index, name)?;
        let outcomes = run_siblings(self.executor, self.cancel, siblings, limit);

        let mut first_error = None;
        for outcome in outcomes {
            let mut sink = self.out.clone();
            if let Err(e) = std::io::Write::write_all(&mut sink, &outcome.output) {
                debug!(err = %e, "write sibling output failed");
            }
            let elapsed = format_elapsed(outcome.elapsed);
            match outcome.result {
                Ok(()) => self
                    .out
                    .line(self.style.success(&format!("  {} done ({elapsed})", outcome.name))),
                Err(err) => {
                    warn!(sibling = outcome.name, err = %err, "parallel sibling failed");
                    self.out.line(
                        self.style
                            .failure(&format!("  {} failed ({elapsed}): {err:#}", outcome.name)),
                    );
                    if first_error.is_none() {
                        first_error = Some(err.context(outcome.name));
                    }
                }
            }
        }

        match first_error {
            Some(err) => Err(self.step_failed(index, name, err)),
            None => Ok(()),
        }
    }
}

/// Results come back in input order regardless of completion order.
fn run_siblings(
    executor: &dyn Executor,
    cancel: &CancelToken,
    siblings: Vec<Sibling>,
    limit: Option<usize>,
) -> Vec<SiblingOutcome> {
    let batch = limit.unwrap_or(siblings.len()).max(1);
    let mut outcomes = Vec::with_capacity(siblings.len());
    let mut pending = siblings.into_iter().peekable();

    while pending.peek().is_some() {
        let chunk: Vec<Sibling> = pending.by_ref().take(batch).collect();
        thread::scope(|scope| {
            let handles: Vec<_> = chunk
                .into_iter()
                .map(|sibling| {
                    let name = sibling.name;
                    (name, scope.spawn(move || run_sibling(executor, cancel, sibling)))
                })
                .collect();
            for (name, handle) in handles {
                outcomes.push(handle.join().unwrap_or_else(|_| SiblingOutcome {
                    name,
                    result: Err(anyhow!("{name} thread panicked")),
                    elapsed: Duration::ZERO,
                    output: Vec::new(),
                }));
            }
        });
    }
    outcomes
}

fn run_sibling(executor: &dyn Executor, cancel: &CancelToken, sibling: Sibling) -> SiblingOutcome {
    let started = Instant::now();
    let mut output = Vec::new();
    let args = agent_args(with_suffixes(&sibling.prompt, true), false);
    let result = executor.run(cancel, &mut output, ModelHint::Thinking, &args);
    SiblingOutcome {
        name: sibling.name,
        result,
        elapsed: started.elapsed(),
        output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedExecutor, ScriptedLines, SharedBuffer};
    use std::cell::Cell;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(brief: Option<&str>, resume: bool) -> PlanConfig {
        PlanConfig {
            tasks_dir: PathBuf::from("/p/.snap/sessions/default/tasks"),
            brief: brief.map(str::to_string),
            resume,
            concurrency: None,
        }
    }

    fn harness() -> (Output, SharedBuffer, CancelToken) {
        let buf = SharedBuffer::default();
        (Output::new(Box::new(buf.clone())), buf, CancelToken::new())
    }

    /// Interactive plan: requirements prompt, one user line, then the four
    /// document steps with the expected conversation flags.
    #[test]
    fn interactive_plan_call_sequence() {
        let exec = ScriptedExecutor::ok();
        let (out, buf, cancel) = harness();
        let mut lines = ScriptedLines::new(&["", "It needs OAuth", "/DONE", "ignored"]);
        let fired = Cell::new(0);

        Planner::new(&exec, &cancel, &out, Style::plain())
            .run(&config(None, false), &mut lines, || {
                fired.set(fired.get() + 1);
                Ok(())
            })
            .expect("plan");

        assert_eq!(fired.get(), 1);
        let calls = exec.calls();
        assert_eq!(calls.len(), 7);
        assert!(!calls[0].continues(), "fresh plan starts a new conversation");
        assert_eq!(calls[1].prompt(), "It needs OAuth");
        assert!(calls[1].continues());
        assert!(calls[2].continues(), "PRD continues the requirements conversation");
        assert!(calls[2].prompt().contains("PRD.md"));
        assert!(!calls[3].continues() && !calls[4].continues());
        assert!(!calls[5].continues(), "analysis starts fresh");
        assert!(calls[6].continues(), "task generation continues the analysis");
        assert!(calls[2..].iter().all(|c| c.model == ModelHint::Thinking));

        let text = buf.contents();
        for header in [
            "Step 1/4 Generate PRD",
            "Step 2/4 Technology & design",
            "Step 3/4 Analyze tasks",
            "Step 4/4 Generate tasks",
        ] {
            assert!(text.contains(header), "missing {header}");
        }
        assert!(text.contains("Technology plan done"));
        assert!(text.contains("Design spec done"));
    }

    #[test]
    fn resume_continues_requirements_conversation() {
        let exec = ScriptedExecutor::ok();
        let (out, _buf, cancel) = harness();
        let mut lines = ScriptedLines::new(&["/done"]);
        Planner::new(&exec, &cancel, &out, Style::plain())
            .run(&config(None, true), &mut lines, || Ok(()))
            .expect("plan");
        assert!(exec.calls()[0].continues());
    }

    /// With a brief there is no Phase 1; the PRD starts fresh and the
    /// callback fires after it succeeds.
    #[test]
    fn brief_skips_requirements_and_fires_after_prd() {
        let exec = ScriptedExecutor::ok();
        let (out, _buf, cancel) = harness();
        let mut lines = ScriptedLines::new(&[]);
        let fired = Cell::new(false);
        Planner::new(&exec, &cancel, &out, Style::plain())
            .run(&config(Some("Build a CLI"), false), &mut lines, || {
                fired.set(true);
                Ok(())
            })
            .expect("plan");

        let calls = exec.calls();
        assert_eq!(calls.len(), 5);
        assert!(!calls[0].continues());
        assert!(calls[0].prompt().contains("Build a CLI"));
        assert!(fired.get());
    }

    #[test]
    fn callback_never_fires_when_first_call_fails() {
        let exec = ScriptedExecutor::new(|_| Err(anyhow!("no credits")));
        let (out, _buf, cancel) = harness();
        let mut lines = ScriptedLines::new(&[]);
        let fired = Cell::new(false);
        let err = Planner::new(&exec, &cancel, &out, Style::plain())
            .run(&config(Some("x"), false), &mut lines, || {
                fired.set(true);
                Ok(())
            })
            .unwrap_err();
        assert!(!fired.get());
        assert!(format!("{err:#}").contains("no credits"));
    }

    /// One failing sibling fails the step, but the other sibling still runs
    /// and later steps do not.
    #[test]
    fn parallel_step_awaits_all_siblings() {
        let exec = ScriptedExecutor::new(|call| {
            if call.prompt().contains("TECHNOLOGY.md") && !call.prompt().contains("DESIGN.md") {
                Err(anyhow!("tech failed"))
            } else {
                Ok(())
            }
        });
        let (out, buf, cancel) = harness();
        let mut lines = ScriptedLines::new(&[]);
        let err = Planner::new(&exec, &cancel, &out, Style::plain())
            .run(&config(Some("x"), false), &mut lines, || Ok(()))
            .unwrap_err();

        assert_eq!(exec.calls().len(), 3);
        let text = buf.contents();
        assert!(text.contains("Design spec done"));
        assert!(text.contains("Technology plan failed"));
        assert!(text.contains("step 2/4 Technology & design failed"));
        assert!(format!("{err:#}").contains("tech failed"));
    }

    #[test]
    fn concurrency_limit_serializes_siblings() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (r, p) = (Arc::clone(&running), Arc::clone(&peak));
        let exec = ScriptedExecutor::new(move |_| {
            let now = r.fetch_add(1, Ordering::SeqCst) + 1;
            p.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            r.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        });
        let (out, _buf, cancel) = harness();
        let mut lines = ScriptedLines::new(&[]);
        let mut cfg = config(Some("x"), false);
        cfg.concurrency = Some(1);
        Planner::new(&exec, &cancel, &out, Style::plain())
            .run(&cfg, &mut lines, || Ok(()))
            .expect("plan");
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancellation_mid_pipeline_names_the_step() {
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let exec = ScriptedExecutor::new(move |call| {
            if call.prompt().contains("PRD.md") && !call.prompt().contains("TECHNOLOGY.md") {
                trigger.cancel();
            }
            Ok(())
        });
        let buf = SharedBuffer::default();
        let out = Output::new(Box::new(buf.clone()));
        let mut lines = ScriptedLines::new(&[]);
        let err = Planner::new(&exec, &cancel, &out, Style::plain())
            .run(&config(Some("x"), false), &mut lines, || Ok(()))
            .unwrap_err();
        assert!(is_cancelled(&err));
        assert!(buf.contents().contains("Planning aborted at step 2/4"));
    }

    #[test]
    fn cancelled_requirements_conversation_prints_aborted() {
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let exec = ScriptedExecutor::new(move |_| {
            trigger.cancel();
            Ok(())
        });
        let buf = SharedBuffer::default();
        let out = Output::new(Box::new(buf.clone()));
        let mut lines = ScriptedLines::new(&["more detail"]);
        let err = Planner::new(&exec, &cancel, &out, Style::plain())
            .run(&config(None, false), &mut lines, || Ok(()))
            .unwrap_err();
        assert!(is_cancelled(&err));
        assert!(buf.contents().contains("Planning aborted"));
        assert_eq!(exec.calls().len(), 1);
    }
}
