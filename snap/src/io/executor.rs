//! Executor abstraction for agent invocation.
//!
//! The [`Executor`] trait decouples orchestration from the concrete agent CLI.
//! Callers pass a model hint plus an argument list whose last element is the
//! prompt; a `-c` anywhere in the list asks the agent to continue its previous
//! conversation. Each provider translates that sentinel its own way. Tests use
//! scripted executors that never spawn processes.

use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::cancel::CancelToken;
use crate::core::types::{CONTINUE_FLAG, ModelHint};
use crate::error::ExecError;
use crate::io::process::{describe_status, run_streaming};

/// Lines of stderr attached to an `ExecError`.
const STDERR_TAIL_LINES: usize = 20;

/// Abstraction over agent execution backends.
pub trait Executor: Send + Sync {
    /// Run the agent to completion, streaming its stdout into `out`.
    fn run(
        &self,
        cancel: &CancelToken,
        out: &mut dyn Write,
        model: ModelHint,
        args: &[String],
    ) -> Result<()>;
}

/// Supported agent CLIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Claude,
    Codex,
}

impl Provider {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "claude" => Some(Provider::Claude),
            "codex" => Some(Provider::Codex),
            _ => None,
        }
    }

    /// Executable looked up on `PATH`.
    pub fn binary(self) -> &'static str {
        match self {
            Provider::Claude => "claude",
            Provider::Codex => "codex",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Provider::Claude => "Claude Code",
            Provider::Codex => "Codex",
        }
    }

    pub fn default_model(self, hint: ModelHint) -> &'static str {
        match (self, hint) {
            (Provider::Claude, ModelHint::Fast) => "sonnet",
            (Provider::Claude, ModelHint::Thinking) => "opus",
            (Provider::Codex, ModelHint::Fast) => "gpt-5-codex-mini",
            (Provider::Codex, ModelHint::Thinking) => "gpt-5-codex",
        }
    }

    fn install_hint(self) -> &'static str {
        match self {
            Provider::Claude => "npm install -g @anthropic-ai/claude-code",
            Provider::Codex => "npm install -g @openai/codex",
        }
    }

    /// Full argument vector for one invocation. The prompt stays last.
    pub fn command_args(self, model: &str, args: &[String]) -> Vec<String> {
        let continues = args.iter().any(|a| a == CONTINUE_FLAG);
        let passthrough = args.iter().filter(|a| a.as_str() != CONTINUE_FLAG);
        let mut out: Vec<String> = Vec::new();
        match self {
            Provider::Claude => {
                out.extend(
                    ["-p", "--model", model, "--dangerously-skip-permissions"]
                        .map(String::from),
                );
                if continues {
                    out.push("--continue".to_string());
                }
            }
            Provider::Codex => {
                out.extend(
                    [
                        "exec",
                        "--model",
                        model,
                        "--dangerously-bypass-approvals-and-sandbox",
                        "--skip-git-repo-check",
                    ]
                    .map(String::from),
                );
                if continues {
                    out.extend(["resume", "--last"].map(String::from));
                }
            }
        }
        out.extend(passthrough.cloned());
        out
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary())
    }
}

/// Model names per hint for one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelNames {
    pub fast: String,
    pub thinking: String,
}

impl ModelNames {
    pub fn defaults(provider: Provider) -> Self {
        Self {
            fast: provider.default_model(ModelHint::Fast).to_string(),
            thinking: provider.default_model(ModelHint::Thinking).to_string(),
        }
    }

    pub fn for_hint(&self, hint: ModelHint) -> &str {
        match hint {
            ModelHint::Fast => &self.fast,
            ModelHint::Thinking => &self.thinking,
        }
    }
}

/// Executor that spawns the provider CLI in the project directory.
#[derive(Debug, Clone)]
pub struct CliExecutor {
    provider: Provider,
    models: ModelNames,
    workdir: PathBuf,
    stderr_limit_bytes: usize,
}

impl CliExecutor {
    pub fn new(
        provider: Provider,
        models: ModelNames,
        workdir: impl Into<PathBuf>,
        stderr_limit_bytes: usize,
    ) -> Self {
        Self {
            provider,
            models,
            workdir: workdir.into(),
            stderr_limit_bytes,
        }
    }
}

impl Executor for CliExecutor {
    #[instrument(skip_all, fields(provider = %self.provider, model = %model))]
    fn run(
        &self,
        cancel: &CancelToken,
        out: &mut dyn Write,
        model: ModelHint,
        args: &[String],
    ) -> Result<()> {
        if args.is_empty() {
            return Err(anyhow!("agent invocation needs a prompt argument"));
        }
        let model_name = self.models.for_hint(model);
        let argv = self.provider.command_args(model_name, args);
        info!(model = model_name, "starting agent");

        let mut cmd = Command::new(self.provider.binary());
        cmd.args(&argv).current_dir(&self.workdir);

        let outcome = run_streaming(cmd, cancel, out, self.stderr_limit_bytes)
            .with_context(|| format!("run {}", self.provider.binary()))?;

        if !outcome.status.success() {
            warn!(exit_code = ?outcome.status.code(), "agent failed");
            return Err(ExecError {
                program: self.provider.binary().to_string(),
                status: describe_status(&outcome.status),
                stderr_tail: outcome.stderr_tail(STDERR_TAIL_LINES),
            }
            .into());
        }

        debug!("agent completed successfully");
        Ok(())
    }
}

/// Fail early when the provider binary is not on `PATH`.
pub fn preflight(provider: Provider) -> Result<PathBuf> {
    which::which(provider.binary()).map_err(|e| {
        debug!(err = %e, binary = provider.binary(), "provider lookup failed");
        missing_provider(provider)
    })
}

fn missing_provider(provider: Provider) -> anyhow::Error {
    anyhow!(
        "{} CLI `{}` not found on PATH (install it with `{}`)",
        provider.display_name(),
        provider.binary(),
        provider.install_hint()
    )
}
