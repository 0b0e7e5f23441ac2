//! Embedded prompt templates.
//!
//! Every prompt the tool sends is rendered here; call sites never assemble
//! prompt text themselves. Templates live in `prompts/` and are rendered with
//! minijinja.

use std::path::Path;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::steps::StepPrompt;

const PREAMBLE: &str = include_str!("prompts/preamble.md");

/// Appended to every step that must not touch git history.
pub const NO_COMMIT_SUFFIX: &str =
    "Do not stage, commit, amend, rebase, or push any changes in this step.";

/// Appended to every non-interactive agent call.
pub const AUTONOMOUS_SUFFIX: &str = "Work autonomously end-to-end. Do not ask the user any questions. Do not request approval. Do not pause for confirmation.";

/// Every prompt the library can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Requirements,
    Prd,
    Technology,
    Design,
    AnalyzeTasks,
    GenerateTasks,
    Implement,
    EnsureCompleteness,
    LintTest,
    CodeReview,
    ApplyFixes,
    UpdateDocs,
    CommitCode,
    UpdateMemory,
    CommitMemory,
    DescribeTask,
}

impl PromptKind {
    pub const ALL: [PromptKind; 16] = [
        PromptKind::Requirements,
        PromptKind::Prd,
        PromptKind::Technology,
        PromptKind::Design,
        PromptKind::AnalyzeTasks,
        PromptKind::GenerateTasks,
        PromptKind::Implement,
        PromptKind::EnsureCompleteness,
        PromptKind::LintTest,
        PromptKind::CodeReview,
        PromptKind::ApplyFixes,
        PromptKind::UpdateDocs,
        PromptKind::CommitCode,
        PromptKind::UpdateMemory,
        PromptKind::CommitMemory,
        PromptKind::DescribeTask,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PromptKind::Requirements => "requirements",
            PromptKind::Prd => "prd",
            PromptKind::Technology => "technology",
            PromptKind::Design => "design",
            PromptKind::AnalyzeTasks => "analyze_tasks",
            PromptKind::GenerateTasks => "generate_tasks",
            PromptKind::Implement => "implement",
            PromptKind::EnsureCompleteness => "ensure_completeness",
            PromptKind::LintTest => "lint_test",
            PromptKind::CodeReview => "code_review",
            PromptKind::ApplyFixes => "apply_fixes",
            PromptKind::UpdateDocs => "update_docs",
            PromptKind::CommitCode => "commit_code",
            PromptKind::UpdateMemory => "update_memory",
            PromptKind::CommitMemory => "commit_memory",
            PromptKind::DescribeTask => "describe_task",
        }
    }

    fn template(self) -> &'static str {
        match self {
            PromptKind::Requirements => include_str!("prompts/requirements.md"),
            PromptKind::Prd => include_str!("prompts/prd.md"),
            PromptKind::Technology => include_str!("prompts/technology.md"),
            PromptKind::Design => include_str!("prompts/design.md"),
            PromptKind::AnalyzeTasks => include_str!("prompts/analyze_tasks.md"),
            PromptKind::GenerateTasks => include_str!("prompts/generate_tasks.md"),
            PromptKind::Implement => include_str!("prompts/implement.md"),
            PromptKind::EnsureCompleteness => include_str!("prompts/ensure_completeness.md"),
            PromptKind::LintTest => include_str!("prompts/lint_test.md"),
            PromptKind::CodeReview => include_str!("prompts/code_review.md"),
            PromptKind::ApplyFixes => include_str!("prompts/apply_fixes.md"),
            PromptKind::UpdateDocs => include_str!("prompts/update_docs.md"),
            PromptKind::CommitCode => include_str!("prompts/commit_code.md"),
            PromptKind::UpdateMemory => include_str!("prompts/update_memory.md"),
            PromptKind::CommitMemory => include_str!("prompts/commit_memory.md"),
            PromptKind::DescribeTask => include_str!("prompts/describe_task.md"),
        }
    }

    /// Document-producing prompts carry the principles preamble.
    pub fn has_preamble(self) -> bool {
        matches!(
            self,
            PromptKind::Prd
                | PromptKind::Technology
                | PromptKind::Design
                | PromptKind::AnalyzeTasks
                | PromptKind::GenerateTasks
        )
    }
}

impl From<StepPrompt> for PromptKind {
    fn from(prompt: StepPrompt) -> Self {
        match prompt {
            StepPrompt::Implement => PromptKind::Implement,
            StepPrompt::EnsureCompleteness => PromptKind::EnsureCompleteness,
            StepPrompt::LintTest => PromptKind::LintTest,
            StepPrompt::CodeReview => PromptKind::CodeReview,
            StepPrompt::ApplyFixes => PromptKind::ApplyFixes,
            StepPrompt::UpdateDocs => PromptKind::UpdateDocs,
            StepPrompt::CommitCode => PromptKind::CommitCode,
            StepPrompt::UpdateMemory => PromptKind::UpdateMemory,
            StepPrompt::CommitMemory => PromptKind::CommitMemory,
        }
    }
}

/// Values a template may reference. Unused fields render as nothing.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PromptParams {
    pub tasks_dir: String,
    pub brief: Option<String>,
    pub prd_path: String,
    pub task_path: String,
    pub task_id: String,
}

/// Per-task fields for the pipeline prompts.
#[derive(Debug, Clone)]
pub struct TaskPromptInput<'a> {
    pub prd_path: &'a Path,
    pub task_path: &'a Path,
    pub task_id: &'a str,
}

impl TaskPromptInput<'_> {
    fn params(&self) -> PromptParams {
        PromptParams {
            prd_path: self.prd_path.display().to_string(),
            task_path: self.task_path.display().to_string(),
            task_id: self.task_id.to_string(),
            ..PromptParams::default()
        }
    }
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        for kind in PromptKind::ALL {
            env.add_template(kind.name(), kind.template())
                .expect("embedded prompt template should be valid");
        }
        Self { env }
    }

    fn render(&self, kind: PromptKind, params: &PromptParams) -> Result<String> {
        let template = self.env.get_template(kind.name())?;
        let body = template
            .render(context! {
                tasks_dir => params.tasks_dir,
                brief => params.brief.as_deref().map(str::trim).filter(|s| !s.is_empty()),
                prd_path => params.prd_path,
                task_path => params.task_path,
                task_id => params.task_id,
            })
            .with_context(|| format!("render {} prompt", kind.name()))?;
        let body = body.trim();
        if kind.has_preamble() {
            Ok(format!("{}\n\n{body}", PREAMBLE.trim()))
        } else {
            Ok(body.to_string())
        }
    }
}

/// Render any prompt kind.
pub fn render(kind: PromptKind, params: &PromptParams) -> Result<String> {
    PromptEngine::new().render(kind, params)
}

fn planning(kind: PromptKind, tasks_dir: &Path, brief: Option<&str>) -> Result<String> {
    render(
        kind,
        &PromptParams {
            tasks_dir: tasks_dir.display().to_string(),
            brief: brief.map(str::to_string),
            ..PromptParams::default()
        },
    )
}

pub fn requirements(tasks_dir: &Path) -> Result<String> {
    planning(PromptKind::Requirements, tasks_dir, None)
}

pub fn prd(tasks_dir: &Path, brief: Option<&str>) -> Result<String> {
    planning(PromptKind::Prd, tasks_dir, brief)
}

pub fn technology(tasks_dir: &Path) -> Result<String> {
    planning(PromptKind::Technology, tasks_dir, None)
}

pub fn design(tasks_dir: &Path) -> Result<String> {
    planning(PromptKind::Design, tasks_dir, None)
}

pub fn analyze_tasks(tasks_dir: &Path) -> Result<String> {
    planning(PromptKind::AnalyzeTasks, tasks_dir, None)
}

pub fn generate_tasks(tasks_dir: &Path) -> Result<String> {
    planning(PromptKind::GenerateTasks, tasks_dir, None)
}

/// Prompt for one pipeline step, before suffixes.
pub fn step_prompt(prompt: StepPrompt, input: &TaskPromptInput<'_>) -> Result<String> {
    render(prompt.into(), &input.params())
}

pub fn describe_task(task_path: &Path) -> Result<String> {
    render(
        PromptKind::DescribeTask,
        &PromptParams {
            task_path: task_path.display().to_string(),
            ..PromptParams::default()
        },
    )
}

/// Append the no-commit suffix (when asked) and then the autonomous suffix.
pub fn with_suffixes(prompt: &str, no_commit: bool) -> String {
    let mut out = prompt.trim_end().to_string();
    if no_commit {
        out.push_str("\n\n");
        out.push_str(NO_COMMIT_SUFFIX);
    }
    out.push_str("\n\n");
    out.push_str(AUTONOMOUS_SUFFIX);
    out
}
