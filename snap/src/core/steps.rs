//! The fixed per-task pipeline.

use crate::core::types::ModelHint;

/// Prompt used by a pipeline step. Steps 3 and 6 share the lint/test prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPrompt {
    Implement,
    EnsureCompleteness,
    LintTest,
    CodeReview,
    ApplyFixes,
    UpdateDocs,
    CommitCode,
    UpdateMemory,
    CommitMemory,
}

/// Static description of one pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepDef {
    pub name: &'static str,
    pub model: ModelHint,
    /// Continue the previous step's agent conversation.
    pub continues: bool,
    pub prompt: StepPrompt,
}

impl StepDef {
    /// Commit steps leave a clean tree and skip snapshots and the no-commit suffix.
    pub fn is_commit(&self) -> bool {
        self.name.contains("Commit")
    }
}

pub const STEPS: [StepDef; 10] = [
    StepDef {
        name: "Implement",
        model: ModelHint::Thinking,
        continues: false,
        prompt: StepPrompt::Implement,
    },
    StepDef {
        name: "Ensure completeness",
        model: ModelHint::Thinking,
        continues: false,
        prompt: StepPrompt::EnsureCompleteness,
    },
    StepDef {
        name: "Lint & test",
        model: ModelHint::Fast,
        continues: true,
        prompt: StepPrompt::LintTest,
    },
    StepDef {
        name: "Code review",
        model: ModelHint::Thinking,
        continues: false,
        prompt: StepPrompt::CodeReview,
    },
    StepDef {
        name: "Apply fixes",
        model: ModelHint::Fast,
        continues: true,
        prompt: StepPrompt::ApplyFixes,
    },
    StepDef {
        name: "Verify fixes",
        model: ModelHint::Fast,
        continues: true,
        prompt: StepPrompt::LintTest,
    },
    StepDef {
        name: "Update docs",
        model: ModelHint::Fast,
        continues: true,
        prompt: StepPrompt::UpdateDocs,
    },
    StepDef {
        name: "Commit code",
        model: ModelHint::Fast,
        continues: false,
        prompt: StepPrompt::CommitCode,
    },
    StepDef {
        name: "Update memory",
        model: ModelHint::Fast,
        continues: true,
        prompt: StepPrompt::UpdateMemory,
    },
    StepDef {
        name: "Commit memory",
        model: ModelHint::Fast,
        continues: true,
        prompt: StepPrompt::CommitMemory,
    },
];

pub const TOTAL_STEPS: u32 = STEPS.len() as u32;

/// Look up a 1-indexed step.
pub fn step(index: u32) -> Option<&'static StepDef> {
    let idx = usize::try_from(index).ok()?.checked_sub(1)?;
    STEPS.get(idx)
}

/// Stash message for the snapshot taken after a step.
pub fn snapshot_message(task_id: &str, index: u32, def: &StepDef) -> String {
    format!("snap: {task_id} step {index}/{TOTAL_STEPS} — {}", def.name)
}
