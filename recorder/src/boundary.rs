//! Scoped step boundaries.
//!
//! [`Recorder::step`] opens a boundary and returns a [`StepGuard`]. The body
//! fills in output and status through the guard; when the guard is finished
//! (or dropped, including during a panic) the step is committed exactly once.
//! [`Recorder::within`] runs a closure inside a boundary and records an
//! `Err` from the closure as an error step before handing it back.

use anyhow::Result;
use serde_json::{Map, Value};
use tracing::{error, warn};

use crate::core::types::{StepStatus, Stream};
use crate::io::pending::PendingHandle;
use crate::recorder::{RecordingState, Recorder, StepSubmission};

/// Mutable handle to an open boundary.
///
/// A detached guard (no active run in lenient mode, or a truncated run)
/// accepts every call and records nothing.
#[derive(Debug)]
pub struct StepGuard<'r> {
    recorder: Option<&'r Recorder>,
    phase: String,
    input: Value,
    output: Map<String, Value>,
    status: StepStatus,
    handle: Option<PendingHandle>,
    finished: bool,
}

impl<'r> StepGuard<'r> {
    fn open(recorder: &'r Recorder, phase: String, input: Value) -> Self {
        Self {
            recorder: Some(recorder),
            phase,
            input,
            output: Map::new(),
            status: StepStatus::Ok,
            handle: Some(recorder.create_pending_handle()),
            finished: false,
        }
    }

    fn detached(phase: String, input: Value) -> Self {
        Self {
            recorder: None,
            phase,
            input,
            output: Map::new(),
            status: StepStatus::Ok,
            handle: None,
            finished: false,
        }
    }

    pub fn is_detached(&self) -> bool {
        self.recorder.is_none()
    }

    pub fn set_output(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.output.insert(key.into(), value.into());
    }

    pub fn set_status(&mut self, status: StepStatus) {
        self.status = status;
    }

    pub fn write_stdout(&self, data: &str) -> Result<()> {
        self.write(Stream::Out, data)
    }

    pub fn write_stderr(&self, data: &str) -> Result<()> {
        self.write(Stream::Err, data)
    }

    fn write(&self, stream: Stream, data: &str) -> Result<()> {
        match (self.recorder, &self.handle) {
            (Some(recorder), Some(handle)) => recorder.append_io(handle, stream, data),
            _ => Ok(()),
        }
    }

    /// Mark the step as failed with `err`'s message and its full chain.
    pub fn fail(&mut self, err: &anyhow::Error) {
        self.status = StepStatus::Error;
        self.output
            .insert("error".to_string(), Value::String(err.to_string()));
        self.output
            .insert("traceback".to_string(), Value::String(format!("{err:?}")));
    }

    /// Close the boundary and commit the step. Returns the step id, or `None`
    /// if nothing was recorded.
    pub fn finish(mut self) -> Result<Option<u64>> {
        self.commit()
    }

    fn commit(&mut self) -> Result<Option<u64>> {
        if self.finished {
            return Ok(None);
        }
        self.finished = true;
        let Some(recorder) = self.recorder else {
            return Ok(None);
        };
        let submission = StepSubmission::new(
            std::mem::take(&mut self.phase),
            std::mem::take(&mut self.input),
            Value::Object(std::mem::take(&mut self.output)),
            self.status,
        )
        .with_snapshot(recorder.memory_snapshot());
        let submission = match self.handle.take() {
            Some(handle) => submission.with_handle(handle),
            None => submission,
        };
        recorder.record_step(submission)
    }
}

impl Drop for StepGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if std::thread::panicking() {
            self.status = StepStatus::Error;
            self.output.insert(
                "error".to_string(),
                Value::String("panicked inside step boundary".to_string()),
            );
        }
        if let Err(err) = self.commit() {
            error!(err = %err, "failed to record step on drop");
        }
    }
}

impl Recorder {
    /// Open a step boundary.
    ///
    /// With no active run this fails in strict mode and otherwise returns a
    /// detached guard. A truncated run always yields a detached guard.
    pub fn step(&self, phase: impl Into<String>, input: Value) -> Result<StepGuard<'_>> {
        let phase = phase.into();
        match self.state() {
            RecordingState::Active => Ok(StepGuard::open(self, phase, input)),
            RecordingState::Truncated => Ok(StepGuard::detached(phase, input)),
            RecordingState::Inactive => {
                self.check_recording("open a step boundary")?;
                warn!(%phase, "step boundary opened without an active run, not recording");
                Ok(StepGuard::detached(phase, input))
            }
        }
    }

    /// Run `body` inside a step boundary.
    ///
    /// If `body` fails, the step is recorded with status `error`, the error
    /// message and its chain, and the original error is returned unchanged.
    pub fn within<T, F>(&self, phase: impl Into<String>, input: Value, body: F) -> Result<T>
    where
        F: FnOnce(&mut StepGuard<'_>) -> Result<T>,
    {
        let mut step = self.step(phase, input)?;
        match body(&mut step) {
            Ok(value) => {
                step.finish()?;
                Ok(value)
            }
            Err(err) => {
                step.fail(&err);
                if let Err(record_err) = step.finish() {
                    error!(err = %record_err, "failed to record faulted step");
                }
                Err(err)
            }
        }
    }
}
