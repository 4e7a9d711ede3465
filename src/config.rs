//! Global configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Agent CLI subprocess settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    /// Agent CLI binary invoked for every call.
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Model identifier forwarded via `--model`; `None` uses the CLI default.
    #[serde(default)]
    pub model: Option<String>,
    /// Wall-clock deadline for one-shot text calls.
    #[serde(default = "default_one_shot_timeout")]
    pub one_shot_timeout_seconds: u64,
    /// Idle window: a streaming call is killed when no stdout bytes arrive
    /// within this span.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,
    /// Soft ceiling: elapsed-time warning that notifies but never kills.
    #[serde(default = "default_soft_ceiling")]
    pub soft_ceiling_seconds: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            model: None,
            one_shot_timeout_seconds: default_one_shot_timeout(),
            idle_timeout_seconds: default_idle_timeout(),
            soft_ceiling_seconds: default_soft_ceiling(),
        }
    }
}

impl EngineConfig {
    /// One-shot deadline as a [`Duration`].
    #[must_use]
    pub fn one_shot_timeout(&self) -> Duration {
        Duration::from_secs(self.one_shot_timeout_seconds)
    }

    /// Idle window as a [`Duration`].
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }

    /// Soft ceiling as a [`Duration`].
    #[must_use]
    pub fn soft_ceiling(&self) -> Duration {
        Duration::from_secs(self.soft_ceiling_seconds)
    }
}

/// Session continuity settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionConfig {
    /// Maximum age of the last activity before a resume is considered
    /// unreliable and a fresh session is started instead.
    #[serde(default = "default_resume_ttl")]
    pub resume_ttl_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            resume_ttl_seconds: default_resume_ttl(),
        }
    }
}

impl SessionConfig {
    /// Resume TTL as a [`Duration`].
    #[must_use]
    pub fn resume_ttl(&self) -> Duration {
        Duration::from_secs(self.resume_ttl_seconds)
    }
}

fn default_binary() -> String {
    "claude".into()
}

fn default_one_shot_timeout() -> u64 {
    300
}

fn default_idle_timeout() -> u64 {
    300
}

fn default_soft_ceiling() -> u64 {
    1800
}

fn default_resume_ttl() -> u64 {
    14_400
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Default working directory for sessions that have not configured one.
    pub default_workspace_root: PathBuf,
    /// Agent CLI subprocess settings.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Session continuity settings.
    #[serde(default)]
    pub session: SessionConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file on disk.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read, parsed, or
    /// validated.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref())
            .map_err(|err| AppError::Config(format!("cannot read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Absolute path to the default workspace root.
    #[must_use]
    pub fn default_workspace_root(&self) -> &Path {
        &self.default_workspace_root
    }

    /// Derived path for the persisted session record database.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.default_workspace_root.join(".agent-relay").join("sessions.db")
    }

    fn validate(&mut self) -> Result<()> {
        if self.engine.binary.trim().is_empty() {
            return Err(AppError::Config("engine.binary must not be empty".into()));
        }

        if self.engine.idle_timeout_seconds == 0 {
            return Err(AppError::Config(
                "engine.idle_timeout_seconds must be greater than zero".into(),
            ));
        }

        if self.engine.soft_ceiling_seconds == 0 {
            return Err(AppError::Config(
                "engine.soft_ceiling_seconds must be greater than zero".into(),
            ));
        }

        let canonical_root = self
            .default_workspace_root
            .canonicalize()
            .map_err(|err| AppError::Config(format!("default_workspace_root invalid: {err}")))?;
        self.default_workspace_root = canonical_root;

        Ok(())
    }
}
