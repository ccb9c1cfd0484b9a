//! Shared trace types persisted to the run directory.
//!
//! These types define the on-disk contract of a run (`meta.json`,
//! `steps.jsonl`). Field order is the serialization order, so changes here
//! change every artifact a reader sees.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Active,
    Success,
    Failure,
    Stopped,
}

impl RunStatus {
    pub fn is_active(self) -> bool {
        self == RunStatus::Active
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Active => "active",
            RunStatus::Success => "success",
            RunStatus::Failure => "failure",
            RunStatus::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Outcome recorded for a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Ok,
    Error,
    /// A failed attempt that will be retried.
    Retry,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Ok => "ok",
            StepStatus::Error => "error",
            StepStatus::Retry => "retry",
        };
        f.write_str(s)
    }
}

/// Console-style stream captured for a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Out,
    Err,
}

impl Stream {
    pub const ALL: [Stream; 2] = [Stream::Out, Stream::Err];

    /// File extension used for this stream's artifact.
    pub fn extension(self) -> &'static str {
        match self {
            Stream::Out => "stdout",
            Stream::Err => "stderr",
        }
    }
}

/// Persisted run metadata (`meta.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    pub run_id: String,
    pub agent_version: String,
    pub llm: String,
    pub created_at: DateTime<Utc>,
    pub seed: u64,
    pub tools: Vec<String>,
    pub status: RunStatus,
    /// Number of committed step records.
    pub step_count: u64,
    pub truncated: bool,
    pub termination_reason: Option<String>,
}

impl RunMeta {
    pub fn new(run_id: String, spec: &RunSpec) -> Self {
        Self {
            run_id,
            agent_version: spec.agent_version.clone(),
            llm: spec.llm.clone(),
            created_at: Utc::now(),
            seed: spec.seed,
            tools: spec.tools.clone(),
            status: RunStatus::Active,
            step_count: 0,
            truncated: false,
            termination_reason: None,
        }
    }
}

/// Caller-supplied description of a run to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    pub agent_version: String,
    pub llm: String,
    pub seed: u64,
    /// Declared tool names.
    pub tools: Vec<String>,
}

impl RunSpec {
    pub fn new(agent_version: impl Into<String>, llm: impl Into<String>) -> Self {
        Self {
            agent_version: agent_version.into(),
            llm: llm.into(),
            seed: 42,
            tools: Vec::new(),
        }
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }
}

/// One committed line of `steps.jsonl`. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_id: u64,
    pub timestamp: DateTime<Utc>,
    pub phase: String,
    pub input: Value,
    pub output: Value,
    pub status: StepStatus,
    /// Relative path of the step's snapshot artifact, if one was written.
    pub state_ref: Option<String>,
}
