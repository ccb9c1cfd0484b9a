//! Agent trace recorder.
//!
//! Records every step an agent takes (reasoning, tool calls, observations,
//! retries) into a self-contained run directory that can be inspected or
//! replayed later. Secrets are redacted before anything reaches disk.
//!
//! - **[`core`]**: Pure logic (record types, redaction, retry decisions,
//!   stop-reason classification).
//! - **[`io`]**: Filesystem side (config, run layout, step log, snapshots,
//!   pending console artifacts).
//!
//! [`recorder::Recorder`] ties the two together. [`boundary`] and
//! [`instrument`] are the surfaces agent code uses to produce steps.

pub mod boundary;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod instrument;
pub mod io;
pub mod logging;
pub mod recorder;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use crate::recorder::{Recorder, RunHandle, StepSubmission};
