//! Test-only fixtures for recorder tests.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;

use crate::core::types::{RunMeta, StepRecord, Stream};
use crate::io::config::RecorderConfig;
use crate::io::layout::RunPaths;
use crate::io::run_meta::load_run_meta;
use crate::io::step_log::read_steps;
use crate::recorder::{Recorder, RunHandle};

/// Recorder config rooted at `base`: strict, no retry backoff.
pub fn strict_config(base: &Path) -> RecorderConfig {
    RecorderConfig {
        base_path: base.to_path_buf(),
        strict: true,
        retry_backoff_ms: 0,
        ..RecorderConfig::default()
    }
}

/// Temporary trace root plus a recorder writing into it.
pub struct TestTrace {
    dir: TempDir,
    pub recorder: Recorder,
}

impl TestTrace {
    /// Strict recorder with zero backoff.
    pub fn new() -> Result<Self> {
        Self::with_config(|_| {})
    }

    /// Start from the strict config and adjust it before building the
    /// recorder. `base_path` always points at the temp dir.
    pub fn with_config(adjust: impl FnOnce(&mut RecorderConfig)) -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp trace root")?;
        let mut config = strict_config(dir.path());
        adjust(&mut config);
        config.base_path = dir.path().to_path_buf();
        let recorder = Recorder::new(config)?;
        Ok(Self { dir, recorder })
    }

    pub fn base(&self) -> &Path {
        self.dir.path()
    }

    /// Run directories under the base path, sorted by name.
    pub fn run_dirs(&self) -> Result<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        for entry in fs::read_dir(self.base()).context("read trace root")? {
            let path = entry?.path();
            if path.is_dir() {
                dirs.push(path);
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    pub fn steps(&self, run: &RunHandle) -> Result<Vec<StepRecord>> {
        read_steps(&RunPaths::from_dir(run.dir.clone()).steps_path)
    }

    pub fn meta(&self, run: &RunHandle) -> Result<RunMeta> {
        load_run_meta(&RunPaths::from_dir(run.dir.clone()).meta_path)
    }

    /// Committed console text for a step, if the file exists.
    pub fn console(&self, run: &RunHandle, step_id: u64, stream: Stream) -> Option<String> {
        let path = RunPaths::from_dir(run.dir.clone()).console_path(step_id, stream);
        fs::read_to_string(path).ok()
    }

    /// File names left in the run's `tools/` directory.
    pub fn tool_files(&self, run: &RunHandle) -> Result<Vec<String>> {
        let tools_dir = RunPaths::from_dir(run.dir.clone()).tools_dir;
        let mut names = Vec::new();
        for entry in fs::read_dir(&tools_dir)
            .with_context(|| format!("read {}", tools_dir.display()))?
        {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }
}
