//! Console artifacts buffered under a pending handle until commit.
//!
//! A unit's step id is only known once the unit finishes, but the unit may
//! write console output while it runs. Output is therefore filed under an
//! opaque [`PendingHandle`] (`tools/<handle>.stdout`) and moved to its final
//! name (`tools/step_<n>.stdout`) when the step is committed. Nested units
//! each hold their own handle, so an inner unit that commits first never
//! picks up the outer unit's output.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;
use uuid::Uuid;

use crate::core::redact::Redactor;
use crate::core::types::Stream;
use crate::io::layout::console_file_name;

/// Correlation token minted before a step id exists.
///
/// Not `Clone`: committing consumes the handle, so it can be committed at
/// most once.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct PendingHandle(Uuid);

impl PendingHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PendingHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PendingHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// File-backed store for pending and committed console artifacts of one run.
#[derive(Debug, Clone)]
pub struct PendingArtifactStore {
    dir: PathBuf,
    redactor: Redactor,
}

impl PendingArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, redactor: Redactor) -> Self {
        Self {
            dir: dir.into(),
            redactor,
        }
    }

    pub fn pending_path(&self, handle: &PendingHandle, stream: Stream) -> PathBuf {
        self.dir.join(format!("{handle}.{}", stream.extension()))
    }

    pub fn committed_path(&self, step_id: u64, stream: Stream) -> PathBuf {
        self.dir.join(console_file_name(step_id, stream))
    }

    /// Redact `data` and append it under `(handle, stream)`. Empty data is
    /// not written.
    pub fn append_io(&self, handle: &PendingHandle, stream: Stream, data: &str) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let path = self.pending_path(handle, stream);
        append_text(&path, &self.redactor.redact_text(data))
    }

    /// Move every stream buffered under `handle` to `step_id`.
    ///
    /// If the destination already exists the buffered content is appended to
    /// it. Afterwards nothing remains under the handle's name.
    pub fn commit(&self, handle: PendingHandle, step_id: u64) -> Result<()> {
        for stream in Stream::ALL {
            let src = self.pending_path(&handle, stream);
            if !src.exists() {
                continue;
            }
            let dst = self.committed_path(step_id, stream);
            if dst.exists() {
                debug!(step_id, dst = %dst.display(), "merging pending artifact into existing");
                let contents = fs::read_to_string(&src)
                    .with_context(|| format!("read pending artifact {}", src.display()))?;
                append_text(&dst, &contents)?;
                fs::remove_file(&src)
                    .with_context(|| format!("remove pending artifact {}", src.display()))?;
            } else {
                fs::rename(&src, &dst).with_context(|| {
                    format!("rename {} to {}", src.display(), dst.display())
                })?;
            }
        }
        Ok(())
    }

    /// Drop anything buffered under `handle` without committing it.
    pub fn discard(&self, handle: PendingHandle) -> Result<()> {
        for stream in Stream::ALL {
            let path = self.pending_path(&handle, stream);
            if path.exists() {
                fs::remove_file(&path)
                    .with_context(|| format!("remove pending artifact {}", path.display()))?;
            }
        }
        Ok(())
    }
}

fn append_text(path: &Path, contents: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    file.write_all(contents.as_bytes())
        .with_context(|| format!("append {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> PendingArtifactStore {
        PendingArtifactStore::new(dir, Redactor::default())
    }

    #[test]
    fn handles_are_unique() {
        assert_ne!(PendingHandle::new(), PendingHandle::new());
    }

    #[test]
    fn commit_moves_buffered_streams_to_step_id() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = store(temp.path());
        let handle = PendingHandle::new();

        store.append_io(&handle, Stream::Out, "line 1\n").expect("out 1");
        store.append_io(&handle, Stream::Out, "line 2\n").expect("out 2");
        store.append_io(&handle, Stream::Err, "warn\n").expect("err");
        let pending_out = store.pending_path(&handle, Stream::Out);
        let pending_err = store.pending_path(&handle, Stream::Err);

        store.commit(handle, 3).expect("commit");

        assert!(!pending_out.exists());
        assert!(!pending_err.exists());
        let out = fs::read_to_string(store.committed_path(3, Stream::Out)).expect("read out");
        assert_eq!(out, "line 1\nline 2\n");
        let err = fs::read_to_string(store.committed_path(3, Stream::Err)).expect("read err");
        assert_eq!(err, "warn\n");
    }

    #[test]
    fn commit_merges_into_existing_destination() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = store(temp.path());
        fs::write(store.committed_path(1, Stream::Out), "existing\n").expect("seed");

        let handle = PendingHandle::new();
        store.append_io(&handle, Stream::Out, "pending\n").expect("out");
        let pending = store.pending_path(&handle, Stream::Out);
        store.commit(handle, 1).expect("commit");

        let out = fs::read_to_string(store.committed_path(1, Stream::Out)).expect("read");
        assert_eq!(out, "existing\npending\n");
        assert!(!pending.exists());
    }

    #[test]
    fn console_output_is_redacted_at_write_time() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = store(temp.path());
        let handle = PendingHandle::new();

        store
            .append_io(&handle, Stream::Out, "token sk-abcdefghijklmnopqrstuvwxyz")
            .expect("out");
        let raw = fs::read_to_string(store.pending_path(&handle, Stream::Out)).expect("read");
        assert_eq!(raw, "token ********");
    }

    #[test]
    fn empty_writes_and_empty_commits_leave_no_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = store(temp.path());
        let handle = PendingHandle::new();

        store.append_io(&handle, Stream::Err, "").expect("empty");
        store.commit(handle, 1).expect("commit");

        let entries = fs::read_dir(temp.path()).expect("read dir").count();
        assert_eq!(entries, 0);
    }

    #[test]
    fn discard_removes_pending_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = store(temp.path());
        let handle = PendingHandle::new();
        store.append_io(&handle, Stream::Out, "dropped").expect("out");
        let pending = store.pending_path(&handle, Stream::Out);

        store.discard(handle).expect("discard");
        assert!(!pending.exists());
    }

    #[test]
    fn committed_names_match_run_layout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = crate::io::layout::RunPaths::new(temp.path(), "run_l");
        let store = store(&paths.tools_dir);
        assert_eq!(
            store.committed_path(7, Stream::Err),
            paths.console_path(7, Stream::Err)
        );
    }
}
