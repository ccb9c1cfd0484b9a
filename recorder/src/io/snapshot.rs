//! Per-step state snapshots (`<run>/snapshots/step_<n>.json`).

use std::fs;

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::warn;

use crate::io::layout::{RunPaths, snapshot_ref};

/// Wrap a registered memory value in the snapshot envelope.
///
/// `context_tokens` and `tools_state` are placeholders for auxiliary context
/// metrics that are not measured yet.
pub fn snapshot_envelope(memory: Value) -> Value {
    json!({
        "memory": memory,
        "context_tokens": 0,
        "tools_state": {},
    })
}

/// Write an already-redacted snapshot for `step_id`.
///
/// Returns the run-relative `state_ref`, or `None` when the serialized
/// snapshot exceeds `max_bytes` and was skipped.
pub fn write_snapshot(
    paths: &RunPaths,
    step_id: u64,
    snapshot: &Value,
    max_bytes: usize,
) -> Result<Option<String>> {
    let mut buf = serde_json::to_string_pretty(snapshot).context("serialize snapshot")?;
    buf.push('\n');
    if buf.len() > max_bytes {
        warn!(
            step_id,
            size_bytes = buf.len(),
            max_bytes,
            "snapshot exceeds size limit, not written"
        );
        return Ok(None);
    }
    let path = paths.snapshot_path(step_id);
    fs::write(&path, buf).with_context(|| format!("write snapshot {}", path.display()))?;
    Ok(Some(snapshot_ref(step_id)))
}
