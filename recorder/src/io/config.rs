//! Recorder configuration, loaded from TOML.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::redact::Redactor;
use crate::core::stop_policy::StopStatusMap;

/// Recorder configuration (TOML).
///
/// Missing fields take their defaults, so an empty file is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RecorderConfig {
    /// Directory that holds one subdirectory per run.
    pub base_path: PathBuf,

    /// Raise on misuse (no active run, double start) instead of warning.
    pub strict: bool,

    /// Step ceiling; the step after this one truncates the run.
    pub max_steps: u64,

    /// Snapshots larger than this many bytes are not written.
    pub max_snapshot_bytes: usize,

    /// Backoff base for retried attempts, in milliseconds.
    pub retry_backoff_ms: u64,

    pub redaction: RedactionConfig,

    pub stop_status: StopStatusMap,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RedactionConfig {
    /// Regex shapes masked in addition to the built-in ones.
    pub extra_patterns: Vec<String>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("traces"),
            strict: false,
            max_steps: 1000,
            max_snapshot_bytes: 10 * 1024 * 1024,
            retry_backoff_ms: 100,
            redaction: RedactionConfig::default(),
            stop_status: StopStatusMap::default(),
        }
    }
}

impl RecorderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.base_path.as_os_str().is_empty() {
            return Err(anyhow!("base_path must not be empty"));
        }
        if self.max_steps == 0 {
            return Err(anyhow!("max_steps must be > 0"));
        }
        if self.max_snapshot_bytes == 0 {
            return Err(anyhow!("max_snapshot_bytes must be > 0"));
        }
        self.redactor()?;
        Ok(())
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Compile the configured redaction rule set.
    pub fn redactor(&self) -> Result<Redactor> {
        Redactor::with_extra_patterns(&self.redaction.extra_patterns)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RecorderConfig::default()`.
pub fn load_config(path: &Path) -> Result<RecorderConfig> {
    if !path.exists() {
        let cfg = RecorderConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RecorderConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}
