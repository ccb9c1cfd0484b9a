//! Stable exit codes for `acp` commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid config, missing run directory, or another error.
pub const INVALID: i32 = 1;
/// `acp show` loaded a run whose final status is `failure`.
pub const RUN_FAILED: i32 = 2;
/// `acp show` loaded a run that is still marked active.
pub const RUN_ACTIVE: i32 = 3;
