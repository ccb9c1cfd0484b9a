//! Mapping from a run's stop reason to its final status.
//!
//! The mapping is an explicit table rather than string inspection, so custom
//! reasons are classified by configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::types::RunStatus;

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StopReason {
    Success,
    /// Explicit stop requested by the caller.
    Stopped,
    /// Stopped implicitly because a new run was started.
    Restarted,
    /// Stopped automatically by the step ceiling.
    LimitExceeded,
    Error,
    Other(String),
}

impl StopReason {
    pub fn as_str(&self) -> &str {
        match self {
            StopReason::Success => "success",
            StopReason::Stopped => "stopped",
            StopReason::Restarted => "restarted",
            StopReason::LimitExceeded => "limit_exceeded",
            StopReason::Error => "error",
            StopReason::Other(s) => s,
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for StopReason {
    fn from(s: &str) -> Self {
        match s {
            "success" => StopReason::Success,
            "stopped" => StopReason::Stopped,
            "restarted" => StopReason::Restarted,
            "limit_exceeded" => StopReason::LimitExceeded,
            "error" => StopReason::Error,
            other => StopReason::Other(other.to_string()),
        }
    }
}

impl FromStr for StopReason {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(StopReason::from(s))
    }
}

/// Final status a stopped run may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalStatus {
    Success,
    Failure,
    Stopped,
}

impl From<FinalStatus> for RunStatus {
    fn from(status: FinalStatus) -> Self {
        match status {
            FinalStatus::Success => RunStatus::Success,
            FinalStatus::Failure => RunStatus::Failure,
            FinalStatus::Stopped => RunStatus::Stopped,
        }
    }
}

/// Reason → status table (`[stop_status]` in the config file).
///
/// Entries in `reasons` override the built-in classification; reasons that
/// are neither listed nor built in take `fallback`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopStatusMap {
    pub fallback: FinalStatus,
    pub reasons: BTreeMap<String, FinalStatus>,
}

impl Default for StopStatusMap {
    fn default() -> Self {
        Self {
            fallback: FinalStatus::Failure,
            reasons: BTreeMap::new(),
        }
    }
}

impl StopStatusMap {
    pub fn status_for(&self, reason: &StopReason) -> RunStatus {
        if let Some(status) = self.reasons.get(reason.as_str()) {
            return (*status).into();
        }
        let status = match reason {
            StopReason::Success => FinalStatus::Success,
            StopReason::Stopped | StopReason::Restarted | StopReason::LimitExceeded => {
                FinalStatus::Stopped
            }
            StopReason::Error => FinalStatus::Failure,
            StopReason::Other(_) => self.fallback,
        };
        status.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_classifies_builtin_reasons() {
        let map = StopStatusMap::default();
        assert_eq!(map.status_for(&StopReason::Success), RunStatus::Success);
        assert_eq!(map.status_for(&StopReason::Stopped), RunStatus::Stopped);
        assert_eq!(map.status_for(&StopReason::Restarted), RunStatus::Stopped);
        assert_eq!(
            map.status_for(&StopReason::LimitExceeded),
            RunStatus::Stopped
        );
        assert_eq!(map.status_for(&StopReason::Error), RunStatus::Failure);
    }

    #[test]
    fn custom_reasons_use_fallback_unless_listed() {
        let mut map = StopStatusMap::default();
        assert_eq!(map.status_for(&"agent crashed".into()), RunStatus::Failure);

        map.reasons
            .insert("user_cancelled".to_string(), FinalStatus::Stopped);
        assert_eq!(map.status_for(&"user_cancelled".into()), RunStatus::Stopped);
    }

    #[test]
    fn unknown_reason_strings_are_kept_verbatim() {
        let reason: StopReason = "tool budget spent".parse().expect("infallible");
        assert_eq!(reason, StopReason::Other("tool budget spent".into()));
        assert_eq!(reason.to_string(), "tool budget spent");
        assert_eq!(StopReason::from("limit_exceeded"), StopReason::LimitExceeded);
    }
}
