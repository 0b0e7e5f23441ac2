//! Project configuration stored under `.snap/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::io::executor::{ModelNames, Provider};

/// Environment variable that overrides `provider`.
pub const PROVIDER_ENV: &str = "SNAP_PROVIDER";

/// Snap configuration (TOML).
///
/// Hand-edited; every field is optional and falls back to the default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SnapConfig {
    /// Agent CLI to drive.
    pub provider: Provider,

    pub models: ModelConfig,

    /// Upper bound on parallel planning sub-steps. `0` means unbounded.
    pub plan_concurrency: usize,

    /// Ask the agent for a one-line task summary before each task.
    pub describe_tasks: bool,

    /// Bytes of agent stderr kept for error messages.
    pub stderr_limit_bytes: usize,
}

/// Model names; empty means the provider default.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ModelConfig {
    pub fast: String,
    pub thinking: String,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Claude,
            models: ModelConfig::default(),
            plan_concurrency: 0,
            describe_tasks: true,
            stderr_limit_bytes: 64 * 1024,
        }
    }
}

impl SnapConfig {
    pub fn validate(&self) -> Result<()> {
        if self.stderr_limit_bytes == 0 {
            return Err(anyhow!("stderr_limit_bytes must be > 0"));
        }
        Ok(())
    }

    /// Concrete model names after provider defaults are applied.
    pub fn model_names(&self) -> ModelNames {
        let defaults = ModelNames::defaults(self.provider);
        ModelNames {
            fast: non_empty_or(&self.models.fast, defaults.fast),
            thinking: non_empty_or(&self.models.thinking, defaults.thinking),
        }
    }

    /// Concurrency limit for planning fan-out, if bounded.
    pub fn plan_limit(&self) -> Option<usize> {
        (self.plan_concurrency > 0).then_some(self.plan_concurrency)
    }

    /// Apply a `SNAP_PROVIDER` value.
    pub fn apply_provider_override(&mut self, value: Option<&str>) -> Result<()> {
        let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return Ok(());
        };
        self.provider = Provider::parse(value)
            .ok_or_else(|| anyhow!("{PROVIDER_ENV}={value} is not a known provider (claude, codex)"))?;
        debug!(provider = %self.provider, "provider overridden from environment");
        Ok(())
    }
}

fn non_empty_or(value: &str, default: String) -> String {
    if value.trim().is_empty() {
        default
    } else {
        value.trim().to_string()
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `SnapConfig::default()`.
pub fn load_config(path: &Path) -> Result<SnapConfig> {
    if !path.exists() {
        let cfg = SnapConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SnapConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Load config and apply environment overrides.
pub fn load_effective_config(path: &Path) -> Result<SnapConfig> {
    let mut cfg = load_config(path)?;
    let env_provider = std::env::var(PROVIDER_ENV).ok();
    cfg.apply_provider_override(env_provider.as_deref())?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, SnapConfig::default());
        assert!(cfg.describe_tasks);
        assert_eq!(cfg.plan_limit(), None);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            "provider = \"codex\"\nplan_concurrency = 1\n\n[models]\nthinking = \"o3\"\n",
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.provider, Provider::Codex);
        assert_eq!(cfg.plan_limit(), Some(1));
        let models = cfg.model_names();
        assert_eq!(models.thinking, "o3");
        assert_eq!(models.fast, Provider::Codex.default_model(crate::core::types::ModelHint::Fast));
    }

    #[test]
    fn zero_stderr_limit_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "stderr_limit_bytes = 0\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("stderr_limit_bytes"));
    }

    #[test]
    fn provider_override_rejects_unknown_names() {
        let mut cfg = SnapConfig::default();
        cfg.apply_provider_override(Some("codex")).expect("override");
        assert_eq!(cfg.provider, Provider::Codex);
        cfg.apply_provider_override(Some("")).expect("blank is ignored");
        assert_eq!(cfg.provider, Provider::Codex);
        assert!(cfg.apply_provider_override(Some("gpt")).is_err());
    }
}
