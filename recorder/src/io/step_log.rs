//! Append-only step log (`<run>/steps.jsonl`), one JSON record per line.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::core::types::StepRecord;

/// Append one record as a single line.
///
/// The whole line goes out in one `write_all`, so a reader never sees a
/// record split across two writes from this process.
pub fn append_step(path: &Path, step: &StepRecord) -> Result<()> {
    let mut line = serde_json::to_string(step).context("serialize step record")?;
    line.push('\n');
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open step log {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("append step log {}", path.display()))?;
    file.flush()
        .with_context(|| format!("flush step log {}", path.display()))?;
    Ok(())
}

/// Read every record in order. A missing log means no steps yet.
pub fn read_steps(path: &Path) -> Result<Vec<StepRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read step log {}", path.display()))?;
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("parse {} line {}", path.display(), idx + 1))
        })
        .collect()
}
