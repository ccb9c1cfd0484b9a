//! Run lifecycle and step ledger.
//!
//! A [`Recorder`] owns at most one active run. Starting a run creates its
//! directory layout and `meta.json`; every committed step gets the next step
//! id, has its pending console artifacts moved under that id, and is appended
//! to `steps.jsonl`. All of that happens under one lock, so step ids follow
//! commit order even with concurrent callers.
//!
//! The recorder is an explicit value: construct one per process (or per
//! test) and pass `&Recorder` to whatever needs to record.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Result, anyhow};
use chrono::Utc;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::core::redact::Redactor;
use crate::core::stop_policy::StopReason;
use crate::core::types::{RunMeta, RunSpec, StepRecord, StepStatus, Stream};
use crate::error::MisuseError;
use crate::io::config::RecorderConfig;
use crate::io::layout::RunPaths;
use crate::io::pending::{PendingArtifactStore, PendingHandle};
use crate::io::run_meta::write_run_meta;
use crate::io::snapshot::{snapshot_envelope, write_snapshot};
use crate::io::step_log::append_step;

/// Identity of a started run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHandle {
    pub run_id: String,
    pub dir: PathBuf,
}

/// A finished unit of work waiting to be committed as a step.
#[derive(Debug)]
pub struct StepSubmission {
    pub phase: String,
    pub input: Value,
    pub output: Value,
    pub status: StepStatus,
    /// Unredacted snapshot; written as `snapshots/step_<n>.json`.
    pub snapshot: Option<Value>,
    /// Handle whose console artifacts belong to this step.
    pub handle: Option<PendingHandle>,
}

impl StepSubmission {
    pub fn new(phase: impl Into<String>, input: Value, output: Value, status: StepStatus) -> Self {
        Self {
            phase: phase.into(),
            input,
            output,
            status,
            snapshot: None,
            handle: None,
        }
    }

    pub fn with_handle(mut self, handle: PendingHandle) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn with_snapshot(mut self, snapshot: Option<Value>) -> Self {
        self.snapshot = snapshot;
        self
    }
}

/// Whether the recorder is currently accepting steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    /// No run, or the last run was stopped explicitly.
    Inactive,
    Active,
    /// The last run hit the step ceiling; submissions are dropped silently.
    Truncated,
}

#[derive(Debug)]
struct RunLedger {
    paths: RunPaths,
    meta: RunMeta,
    /// Id of the last committed step.
    last_step_id: u64,
    artifacts: PendingArtifactStore,
}

impl RunLedger {
    fn state(&self) -> RecordingState {
        if self.meta.status.is_active() {
            RecordingState::Active
        } else if self.meta.truncated {
            RecordingState::Truncated
        } else {
            RecordingState::Inactive
        }
    }
}

#[derive(Debug)]
pub struct Recorder {
    config: RecorderConfig,
    redactor: Redactor,
    /// Current or most recent run.
    ledger: Mutex<Option<RunLedger>>,
    memory: Mutex<Option<Value>>,
}

impl Recorder {
    pub fn new(config: RecorderConfig) -> Result<Self> {
        config.validate()?;
        let redactor = config.redactor()?;
        Ok(Self {
            config,
            redactor,
            ledger: Mutex::new(None),
            memory: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    fn lock_ledger(&self) -> Result<MutexGuard<'_, Option<RunLedger>>> {
        self.ledger
            .lock()
            .map_err(|_| anyhow!("recorder ledger lock poisoned"))
    }

    /// Strict mode: return the error. Lenient mode: warn and carry on.
    fn misuse(&self, err: MisuseError) -> Result<()> {
        if self.config.strict {
            return Err(err.into());
        }
        warn!("{err}");
        Ok(())
    }

    pub fn state(&self) -> RecordingState {
        match self.ledger.lock() {
            Ok(ledger) => ledger
                .as_ref()
                .map_or(RecordingState::Inactive, RunLedger::state),
            Err(_) => RecordingState::Inactive,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == RecordingState::Active
    }

    /// The active run, if any.
    pub fn current_run(&self) -> Option<RunHandle> {
        let ledger = self.ledger.lock().ok()?;
        ledger
            .as_ref()
            .filter(|run| run.meta.status.is_active())
            .map(|run| RunHandle {
                run_id: run.meta.run_id.clone(),
                dir: run.paths.dir.clone(),
            })
    }

    /// Metadata of the current or most recent run.
    pub fn run_meta(&self) -> Option<RunMeta> {
        let ledger = self.ledger.lock().ok()?;
        ledger.as_ref().map(|run| run.meta.clone())
    }

    /// Start a new run.
    ///
    /// If a run is already active: strict mode fails, lenient mode stops it
    /// with reason `restarted` first.
    #[instrument(skip_all, fields(agent_version = %spec.agent_version, llm = %spec.llm))]
    pub fn start(&self, spec: &RunSpec) -> Result<RunHandle> {
        let mut ledger = self.lock_ledger()?;
        if let Some(prev) = ledger.as_mut().filter(|run| run.meta.status.is_active()) {
            let err = MisuseError::RunAlreadyActive {
                run_id: prev.meta.run_id.clone(),
            };
            self.misuse(err)?;
            self.finish_run(prev, StopReason::Restarted)?;
        }

        let run_id = format!("run_{}", Uuid::new_v4());
        let paths = RunPaths::new(&self.config.base_path, &run_id);
        paths.create()?;
        let meta = RunMeta::new(run_id.clone(), spec);
        write_run_meta(&paths.meta_path, &meta)?;

        let handle = RunHandle {
            run_id: run_id.clone(),
            dir: paths.dir.clone(),
        };
        let artifacts = PendingArtifactStore::new(&paths.tools_dir, self.redactor.clone());
        *ledger = Some(RunLedger {
            paths,
            meta,
            last_step_id: 0,
            artifacts,
        });
        info!(run_id = %run_id, dir = %handle.dir.display(), "run started");
        Ok(handle)
    }

    /// Stop the active run with `reason`.
    ///
    /// Stopping when nothing is active is a misuse, except after automatic
    /// truncation, which already stopped the run.
    pub fn stop(&self, reason: impl Into<StopReason>) -> Result<()> {
        let reason = reason.into();
        let mut ledger = self.lock_ledger()?;
        match ledger.as_mut() {
            Some(run) if run.state() == RecordingState::Active => self.finish_run(run, reason),
            Some(run) if run.state() == RecordingState::Truncated => {
                debug!(run_id = %run.meta.run_id, %reason, "run already stopped by truncation");
                Ok(())
            }
            _ => self.misuse(MisuseError::RunNotActive),
        }
    }

    fn finish_run(&self, run: &mut RunLedger, reason: StopReason) -> Result<()> {
        run.meta.status = self.config.stop_status.status_for(&reason);
        if reason != StopReason::Success && run.meta.termination_reason.is_none() {
            run.meta.termination_reason = Some(reason.to_string());
        }
        write_run_meta(&run.paths.meta_path, &run.meta)?;
        info!(
            run_id = %run.meta.run_id,
            %reason,
            status = ?run.meta.status,
            step_count = run.meta.step_count,
            "run stopped"
        );
        Ok(())
    }

    /// Register the agent memory included in subsequent step snapshots.
    pub fn update_memory(&self, memory: Value) {
        *self.memory.lock().unwrap_or_else(PoisonError::into_inner) = Some(memory);
    }

    pub fn clear_memory(&self) {
        *self.memory.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Snapshot envelope for the registered memory. `None` when nothing is
    /// registered or the memory is null or empty.
    pub fn memory_snapshot(&self) -> Option<Value> {
        self.memory
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .filter(has_content)
            .map(snapshot_envelope)
    }

    pub fn create_pending_handle(&self) -> PendingHandle {
        PendingHandle::new()
    }

    /// Fail in strict mode when nothing is recording; otherwise do nothing.
    pub(crate) fn check_recording(&self, operation: &'static str) -> Result<()> {
        if self.config.strict && self.state() == RecordingState::Inactive {
            return Err(MisuseError::NoActiveRun { operation }.into());
        }
        Ok(())
    }

    /// Buffer console output for a pending handle.
    pub fn append_io(&self, handle: &PendingHandle, stream: Stream, data: &str) -> Result<()> {
        let ledger = self.lock_ledger()?;
        match ledger.as_ref().map(|run| (run, run.state())) {
            Some((run, RecordingState::Active)) => run.artifacts.append_io(handle, stream, data),
            Some((_, RecordingState::Truncated)) => Ok(()),
            _ => self.misuse(MisuseError::NoActiveRun {
                operation: "record console output",
            }),
        }
    }

    /// Buffer both console streams for a pending handle.
    pub fn record_console(&self, handle: &PendingHandle, stdout: &str, stderr: &str) -> Result<()> {
        self.append_io(handle, Stream::Out, stdout)?;
        self.append_io(handle, Stream::Err, stderr)
    }

    /// Commit a step and return its id.
    ///
    /// Returns `Ok(None)` when the submission is dropped: no active run in
    /// lenient mode, or the run was truncated. The submission that crosses
    /// `max_steps` truncates and stops the run.
    pub fn record_step(&self, submission: StepSubmission) -> Result<Option<u64>> {
        let mut ledger = self.lock_ledger()?;
        let run = match ledger.as_mut() {
            Some(run) if run.state() == RecordingState::Active => run,
            Some(run) if run.state() == RecordingState::Truncated => {
                debug!(phase = %submission.phase, "run truncated, dropping step");
                if let Some(handle) = submission.handle {
                    run.artifacts.discard(handle)?;
                }
                return Ok(None);
            }
            stopped => {
                // A boundary that outlived its run still owns pending files.
                if let (Some(run), Some(handle)) = (stopped, submission.handle) {
                    run.artifacts.discard(handle)?;
                }
                self.misuse(MisuseError::NoActiveRun {
                    operation: "record a step",
                })?;
                return Ok(None);
            }
        };

        let step_id = run.last_step_id + 1;
        if step_id > self.config.max_steps {
            warn!(
                run_id = %run.meta.run_id,
                max_steps = self.config.max_steps,
                "trace limit reached, truncating run"
            );
            run.meta.truncated = true;
            if run.meta.termination_reason.is_none() {
                run.meta.termination_reason = Some(StopReason::LimitExceeded.to_string());
            }
            if let Some(handle) = submission.handle {
                run.artifacts.discard(handle)?;
            }
            self.finish_run(run, StopReason::LimitExceeded)?;
            return Ok(None);
        }

        let mut submission = submission;
        let handle = submission.handle.take();

        // Console artifacts move under the id only once the record exists,
        // so a failed write never leaves files under an id that gets reused.
        let record = match self.write_step(run, step_id, submission) {
            Ok(record) => record,
            Err(err) => {
                if let Some(handle) = handle
                    && let Err(discard_err) = run.artifacts.discard(handle)
                {
                    warn!(step_id, err = %discard_err, "failed to discard pending artifacts");
                }
                return Err(err);
            }
        };
        run.last_step_id = step_id;
        run.meta.step_count = step_id;

        if let Some(handle) = handle {
            run.artifacts.commit(handle, step_id)?;
        }
        write_run_meta(&run.paths.meta_path, &run.meta)?;
        debug!(step_id, phase = %record.phase, status = %record.status, "step committed");
        Ok(Some(step_id))
    }

    /// Redact the payloads, write the snapshot and append the record.
    fn write_step(
        &self,
        run: &RunLedger,
        step_id: u64,
        submission: StepSubmission,
    ) -> Result<StepRecord> {
        let state_ref = match &submission.snapshot {
            Some(snapshot) => write_snapshot(
                &run.paths,
                step_id,
                &self.redactor.redact_value(snapshot),
                self.config.max_snapshot_bytes,
            )?,
            None => None,
        };
        let record = StepRecord {
            step_id,
            timestamp: Utc::now(),
            phase: submission.phase,
            input: self.redactor.redact_value(&submission.input),
            output: self.redactor.redact_value(&submission.output),
            status: submission.status,
            state_ref,
        };
        append_step(&run.paths.steps_path, &record)?;
        Ok(record)
    }
}

fn has_content(memory: &Value) -> bool {
    match memory {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

/// Serialize a caller value for a payload, falling back to a marker string.
pub(crate) fn to_payload<T: serde::Serialize + ?Sized>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|err| json!(format!("<unserializable: {err}>")))
}
