//! Misuse errors raised by the recorder in strict mode.
//!
//! In lenient mode the same conditions are logged as warnings and the
//! operation does nothing. Callers can tell them apart from I/O failures with
//! `err.downcast_ref::<MisuseError>()`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MisuseError {
    #[error("attempted to {operation} without an active run")]
    NoActiveRun { operation: &'static str },

    #[error("run {run_id} already active")]
    RunAlreadyActive { run_id: String },

    #[error("attempted to stop an inactive run")]
    RunNotActive,
}
