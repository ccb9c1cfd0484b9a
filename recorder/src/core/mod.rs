//! Pure logic shared by the recorder.
//!
//! Nothing here touches the filesystem: record types, redaction, retry
//! decisions and the stop-reason table.

pub mod redact;
pub mod retry;
pub mod stop_policy;
pub mod types;
