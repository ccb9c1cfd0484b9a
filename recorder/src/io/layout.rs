//! On-disk layout of a run directory.
//!
//! ```text
//! <base>/<run_id>/
//!   meta.json
//!   steps.jsonl
//!   snapshots/step_<n>.json
//!   tools/step_<n>.stdout|stderr   (committed console artifacts)
//!   tools/<handle>.stdout|stderr   (pending, before commit)
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::core::types::Stream;

pub const META_FILE: &str = "meta.json";
pub const STEPS_FILE: &str = "steps.jsonl";
pub const SNAPSHOTS_DIR: &str = "snapshots";
pub const TOOLS_DIR: &str = "tools";

#[derive(Debug, Clone)]
pub struct RunPaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub steps_path: PathBuf,
    pub snapshots_dir: PathBuf,
    pub tools_dir: PathBuf,
}

impl RunPaths {
    pub fn new(base: &Path, run_id: &str) -> Self {
        Self::from_dir(base.join(run_id))
    }

    /// Paths for an existing run directory.
    pub fn from_dir(dir: PathBuf) -> Self {
        Self {
            meta_path: dir.join(META_FILE),
            steps_path: dir.join(STEPS_FILE),
            snapshots_dir: dir.join(SNAPSHOTS_DIR),
            tools_dir: dir.join(TOOLS_DIR),
            dir,
        }
    }

    /// Create the run directory and its artifact subdirectories.
    pub fn create(&self) -> Result<()> {
        for dir in [&self.snapshots_dir, &self.tools_dir] {
            fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        }
        Ok(())
    }

    /// Snapshot file for `step_id`, absolute.
    pub fn snapshot_path(&self, step_id: u64) -> PathBuf {
        self.dir.join(snapshot_ref(step_id))
    }

    /// Committed console artifact for `step_id`.
    pub fn console_path(&self, step_id: u64, stream: Stream) -> PathBuf {
        self.tools_dir.join(console_file_name(step_id, stream))
    }
}

/// File name of a committed console artifact inside `tools/`.
pub fn console_file_name(step_id: u64, stream: Stream) -> String {
    format!("step_{step_id}.{}", stream.extension())
}

/// Run-relative reference recorded in a step's `state_ref`.
pub fn snapshot_ref(step_id: u64) -> String {
    format!("{SNAPSHOTS_DIR}/step_{step_id}.json")
}
