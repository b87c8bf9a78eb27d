// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Snapshots and rollback.
//!
//! Snapshots are write-once copies of the full state under `.snapshots/`.
//! Rollbacks always take a safety snapshot first, so every rollback can
//! itself be rolled back.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Utc;
use tracing::{info, warn};

#[cfg(feature = "telemetry")]
use std::time::Instant;

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use crate::error::StateError;

use super::manager::{read_state, StateManager};
use super::types::WorkflowState;
use super::temp_file_in;

/// File name prefix shared by every snapshot.
pub const SNAPSHOT_PREFIX: &str = "snapshot_";

const SNAPSHOT_TEMP_PREFIX: &str = ".snap_";

/// Label used for the safety snapshot taken by `rollback_to_snapshot`.
const PRE_ROLLBACK_LABEL: &str = "pre_rollback";

/// Replace anything outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn snapshot_name(stamp: &str, label: Option<&str>, attempt: u32) -> String {
    let mut name = format!("{SNAPSHOT_PREFIX}{stamp}");
    if let Some(label) = label {
        name.push('_');
        name.push_str(label);
    }
    if attempt > 0 {
        name.push_str(&format!("_{attempt}"));
    }
    name.push_str(".json");
    name
}

impl StateManager {
    /// Write the current state to a new snapshot file and return its path.
    ///
    /// A same-second snapshot with the same label gets a numeric suffix
    /// instead of being overwritten.
    pub fn create_snapshot(&self, label: Option<&str>) -> Result<PathBuf, StateError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let state = self.current()?;
        let dir = self.snapshot_dir();
        std::fs::create_dir_all(&dir)?;

        let json = serde_json::to_string_pretty(state)?;
        let mut tmp = temp_file_in(&dir, SNAPSHOT_TEMP_PREFIX)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;

        let stamp = Utc::now().format("%Y%m%dT%H%M%S").to_string();
        let label = label
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(sanitize_label);

        let mut attempt = 0;
        let path = loop {
            let candidate = dir.join(snapshot_name(&stamp, label.as_deref(), attempt));
            match tmp.persist_noclobber(&candidate) {
                Ok(_) => break candidate,
                Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                    tmp = e.file;
                    attempt += 1;
                }
                Err(e) => return Err(e.error.into()),
            }
        };

        info!(adw_id = %self.adw_id(), snapshot = %path.display(), "Created snapshot");

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("state.snapshot", start.elapsed());

        Ok(path)
    }

    /// All snapshots for this workflow, newest first by modification time.
    pub fn list_snapshots(&self) -> Result<Vec<PathBuf>, StateError> {
        let dir = self.snapshot_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut entries: Vec<(SystemTime, PathBuf)> = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with(SNAPSHOT_PREFIX) || !name.ends_with(".json") {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            entries.push((modified, entry.path()));
        }

        entries.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
        Ok(entries.into_iter().map(|(_, path)| path).collect())
    }

    /// Replace state with a snapshot's contents and persist immediately.
    pub fn rollback_to_snapshot(&mut self, path: &Path) -> Result<&WorkflowState, StateError> {
        if !path.is_file() {
            return Err(StateError::SnapshotNotFound(path.to_path_buf()));
        }

        let restored = read_state(path)?;
        if restored.adw_id != self.adw_id() {
            return Err(StateError::InvalidValue {
                field: "adw_id".to_string(),
                message: format!(
                    "snapshot belongs to {}, not {}",
                    restored.adw_id,
                    self.adw_id()
                ),
            });
        }

        if self.state().is_some() {
            self.create_snapshot(Some(PRE_ROLLBACK_LABEL))?;
        }

        self.replace_state(restored);
        self.save()?;

        info!(adw_id = %self.adw_id(), snapshot = %path.display(), "Rolled back to snapshot");
        self.current()
    }

    /// Roll back to the point right after `phase` succeeded.
    ///
    /// Prefers the newest snapshot whose `current_phase` is `phase` and whose
    /// history is a prefix of the current history. Otherwise truncates the
    /// history after the first successful record for `phase`.
    pub fn rollback_to_phase(&mut self, phase: &str) -> Result<&WorkflowState, StateError> {
        let current = self.current()?;
        let Some(first_success) = current.first_success_index(phase) else {
            return Err(StateError::PhaseNeverSucceeded(phase.to_string()));
        };

        for path in self.list_snapshots()? {
            let candidate = match read_state(&path) {
                Ok(state) => state,
                Err(e) => {
                    warn!(snapshot = %path.display(), "Skipping unreadable snapshot: {}", e);
                    continue;
                }
            };
            if candidate.adw_id == self.adw_id()
                && candidate.current_phase == phase
                && candidate.is_ancestor_of(self.current()?)
            {
                return self.rollback_to_snapshot(&path);
            }
        }

        self.create_snapshot(Some(&format!("pre_rollback_to_{phase}")))?;

        let state = self.state_mut()?;
        state.phase_history.truncate(first_success + 1);
        state.current_phase = phase.to_string();
        self.save()?;

        info!(adw_id = %self.adw_id(), phase, "Rolled back by truncating phase history");
        self.current()
    }
}
