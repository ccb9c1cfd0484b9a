//! Attempt budgets and backoff for retried units.
//!
//! Pure decision logic: callers feed each attempt's outcome in and get back
//! what to record and whether to try again.

use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::core::types::StepStatus;

/// Fixed attempt budget with linearly growing backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, at least 1.
    pub max_attempts: u32,
    /// Attempt `n` waits `n * backoff_base` before attempt `n + 1`.
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Result<Self> {
        if max_attempts == 0 {
            return Err(anyhow!("max_attempts must be >= 1"));
        }
        Ok(Self {
            max_attempts,
            backoff_base,
        })
    }

    /// Single attempt, no backoff.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            backoff_base: Duration::ZERO,
        }
    }

    pub fn backoff_after(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(attempt)
    }

    /// Decide how a failed `attempt` (1-indexed) is recorded.
    pub fn on_failure(&self, attempt: u32) -> FailureDecision {
        if attempt >= self.max_attempts {
            FailureDecision::GiveUp
        } else {
            FailureDecision::RetryAfter(self.backoff_after(attempt))
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDecision {
    RetryAfter(Duration),
    GiveUp,
}

impl FailureDecision {
    /// Status of the step recording the failed attempt.
    pub fn step_status(self) -> StepStatus {
        match self {
            FailureDecision::RetryAfter(_) => StepStatus::Retry,
            FailureDecision::GiveUp => StepStatus::Error,
        }
    }
}

/// Outcome of a single attempt, as a value rather than a propagated error.
#[derive(Debug)]
pub enum Attempt<T> {
    Success(T),
    Fault(anyhow::Error),
}

impl<T> From<Result<T>> for Attempt<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Attempt::Success(value),
            Err(err) => Attempt::Fault(err),
        }
    }
}
