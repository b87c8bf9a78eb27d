// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Crash-safe workflow state.
//!
//! One directory per workflow id:
//!
//! ```text
//! agents/{id}/adw_state.json     # current WorkflowState (2-space JSON)
//! agents/{id}/.adw_state.lock    # zero-byte advisory lock file
//! agents/{id}/.snapshots/snapshot_{YYYYMMDDTHHMMSS}[_{label}].json
//! ```
//!
//! Every write goes to a temp file in the same directory and is renamed into
//! place while holding an exclusive lock on the dedicated lock file. Readers
//! never take the lock; the rename guarantees they see a whole file.

mod manager;
mod snapshot;
mod types;

pub use manager::StateManager;
pub use snapshot::{sanitize_label, SNAPSHOT_PREFIX};
pub use types::{PhaseRecord, TestResults, WorkflowState, INITIAL_PHASE};

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tempfile::NamedTempFile;

use crate::error::StateError;

/// Default root for per-workflow state directories.
pub const DEFAULT_AGENTS_DIR: &str = "agents";

/// State file name inside a workflow directory.
pub const STATE_FILE: &str = "adw_state.json";

/// Lock file name inside a workflow directory.
pub const LOCK_FILE: &str = ".adw_state.lock";

/// Snapshot subdirectory name.
pub const SNAPSHOT_DIR: &str = ".snapshots";

/// Exclusive advisory lock held for the lifetime of the guard.
pub(crate) struct StateLock {
    file: File,
    path: PathBuf,
}

impl StateLock {
    /// Block until the lock at `path` is ours.
    pub(crate) fn acquire(path: &Path) -> Result<Self, StateError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|source| StateError::Lock {
                path: path.to_path_buf(),
                source,
            })?;

        file.lock_exclusive().map_err(|source| StateError::Lock {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), "Failed to release state lock: {}", e);
        }
    }
}

/// Write `contents` to `path` via a temp file in the same directory.
///
/// The temp file is removed if anything fails before the rename.
pub(crate) fn write_atomic(path: &Path, contents: &[u8], temp_prefix: &str) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = temp_file_in(dir, temp_prefix)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

pub(crate) fn temp_file_in(dir: &Path, prefix: &str) -> std::io::Result<NamedTempFile> {
    tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".tmp")
        .tempfile_in(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_replaces_contents() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("file.json");

        write_atomic(&path, b"{\"a\": 1}", ".test_").unwrap();
        write_atomic(&path, b"{\"a\": 2}", ".test_").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"a\": 2}");
        let leftovers: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_write_atomic_into_missing_dir_fails_cleanly() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing").join("file.json");
        assert!(write_atomic(&path, b"{}", ".test_").is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_lock_is_reacquirable_after_drop() {
        let temp = TempDir::new().unwrap();
        let lock_path = temp.path().join(LOCK_FILE);
        {
            let _guard = StateLock::acquire(&lock_path).unwrap();
            assert!(lock_path.exists());
        }
        let _again = StateLock::acquire(&lock_path).unwrap();
    }
}
