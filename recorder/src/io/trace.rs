//! Read a finished (or in-progress) run back from disk.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::core::types::{RunMeta, StepRecord, Stream};
use crate::io::layout::RunPaths;
use crate::io::run_meta::load_run_meta;
use crate::io::step_log::read_steps;

/// A run directory loaded into memory.
#[derive(Debug, Clone)]
pub struct Trace {
    pub paths: RunPaths,
    pub meta: RunMeta,
    pub steps: Vec<StepRecord>,
}

impl Trace {
    /// Committed console output of `step_id`, if any was recorded.
    pub fn console(&self, step_id: u64, stream: Stream) -> Result<Option<String>> {
        let path = self.paths.console_path(step_id, stream);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        Ok(Some(text))
    }
}

/// Load `meta.json` and `steps.jsonl` of the run at `dir`.
pub fn load_trace(dir: &Path) -> Result<Trace> {
    if !dir.is_dir() {
        bail!("run directory {} does not exist", dir.display());
    }
    let paths = RunPaths::from_dir(dir.to_path_buf());
    let meta = load_run_meta(&paths.meta_path)?;
    let steps = read_steps(&paths.steps_path)?;
    Ok(Trace { paths, meta, steps })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{RunSpec, StepStatus};
    use crate::io::run_meta::write_run_meta;
    use crate::io::step_log::append_step;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn loads_meta_steps_and_console() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = RunPaths::new(temp.path(), "run_x");
        paths.create().expect("create");
        write_run_meta(
            &paths.meta_path,
            &RunMeta::new("run_x".to_string(), &RunSpec::new("v1", "mock")),
        )
        .expect("meta");
        append_step(
            &paths.steps_path,
            &StepRecord {
                step_id: 1,
                timestamp: Utc::now(),
                phase: "tool".to_string(),
                input: json!({}),
                output: json!({"result": "ok"}),
                status: StepStatus::Ok,
                state_ref: None,
            },
        )
        .expect("step");
        fs::write(paths.console_path(1, Stream::Out), "ok").expect("stdout");

        let trace = load_trace(&paths.dir).expect("load");
        assert_eq!(trace.meta.run_id, "run_x");
        assert_eq!(trace.steps.len(), 1);
        assert_eq!(
            trace.console(1, Stream::Out).expect("read").as_deref(),
            Some("ok")
        );
        assert_eq!(trace.console(1, Stream::Err).expect("read"), None);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = load_trace(&temp.path().join("run_missing")).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
