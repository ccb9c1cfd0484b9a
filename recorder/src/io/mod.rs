//! Filesystem side of the recorder: config file, run layout and artifacts.

pub mod config;
pub mod layout;
pub mod pending;
pub mod run_meta;
pub mod snapshot;
pub mod step_log;
pub mod trace;
