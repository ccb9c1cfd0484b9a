//! Run metadata storage (`<run>/meta.json`).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::types::RunMeta;

/// Load run metadata from disk.
pub fn load_run_meta(path: &Path) -> Result<RunMeta> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read run meta {}", path.display()))?;
    let meta: RunMeta = serde_json::from_str(&contents)
        .with_context(|| format!("parse run meta {}", path.display()))?;
    Ok(meta)
}

/// Atomically write run metadata (temp file + rename), so a crash never
/// leaves a half-written `meta.json`.
pub fn write_run_meta(path: &Path, meta: &RunMeta) -> Result<()> {
    debug!(
        run_id = %meta.run_id,
        status = ?meta.status,
        step_count = meta.step_count,
        "writing run meta"
    );
    let mut buf = serde_json::to_string_pretty(meta)?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("run meta path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp run meta {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace run meta {}", path.display()))?;
    Ok(())
}
