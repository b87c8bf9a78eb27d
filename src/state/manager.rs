// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Workflow state manager.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};

#[cfg(feature = "telemetry")]
use std::time::Instant;

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use crate::error::StateError;

use super::types::{PhaseRecord, WorkflowState, IMMUTABLE_FIELDS, WRITE_ONCE_FIELDS};
use super::{write_atomic, StateLock, LOCK_FILE, SNAPSHOT_DIR, STATE_FILE};

const STATE_TEMP_PREFIX: &str = ".adw_state_";

/// Owns the durable state of one workflow.
///
/// Instances never share memory; separate managers (in this or another
/// process) coordinate only through the on-disk lock.
#[derive(Debug)]
pub struct StateManager {
    adw_id: String,
    state_dir: PathBuf,
    state: Option<WorkflowState>,
}

impl StateManager {
    /// Create a manager for `adw_id` rooted at `base_dir` without touching disk.
    pub fn new(adw_id: impl Into<String>, base_dir: impl AsRef<Path>) -> Result<Self, StateError> {
        let adw_id = adw_id.into();
        check_id(&adw_id)?;
        let state_dir = base_dir.as_ref().join(&adw_id);
        Ok(Self {
            adw_id,
            state_dir,
            state: None,
        })
    }

    /// Open an existing workflow. Fails if no state file exists.
    pub fn load(adw_id: impl Into<String>, base_dir: impl AsRef<Path>) -> Result<Self, StateError> {
        let mut manager = Self::new(adw_id, base_dir)?;
        manager.reload()?;
        Ok(manager)
    }

    pub fn adw_id(&self) -> &str {
        &self.adw_id
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_dir.join(STATE_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join(LOCK_FILE)
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.state_dir.join(SNAPSHOT_DIR)
    }

    /// Whether a state file exists on disk.
    pub fn exists(&self) -> bool {
        self.state_path().is_file()
    }

    /// The in-memory state, if initialized or loaded.
    pub fn state(&self) -> Option<&WorkflowState> {
        self.state.as_ref()
    }

    /// Typed mutable access. Persist with [`save`](Self::save).
    pub fn state_mut(&mut self) -> Result<&mut WorkflowState, StateError> {
        self.state.as_mut().ok_or(StateError::NotInitialized)
    }

    pub(crate) fn current(&self) -> Result<&WorkflowState, StateError> {
        self.state.as_ref().ok_or(StateError::NotInitialized)
    }

    pub(crate) fn replace_state(&mut self, state: WorkflowState) {
        self.state = Some(state);
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Create the backing file for a new workflow.
    ///
    /// Fails with [`StateError::AlreadyExists`] if the file is already there.
    pub fn initialize(&mut self, state: WorkflowState) -> Result<&WorkflowState, StateError> {
        if state.adw_id != self.adw_id {
            return Err(StateError::InvalidValue {
                field: "adw_id".to_string(),
                message: format!("expected {}, got {}", self.adw_id, state.adw_id),
            });
        }
        state.validate()?;

        std::fs::create_dir_all(&self.state_dir)?;
        let _lock = StateLock::acquire(&self.lock_path())?;

        let path = self.state_path();
        if path.exists() {
            return Err(StateError::AlreadyExists {
                adw_id: self.adw_id.clone(),
                path,
            });
        }

        write_state(&path, &state)?;
        info!(adw_id = %self.adw_id, issue = state.issue_number, "Initialized workflow state");

        Ok(self.state.insert(state))
    }

    /// Re-read the state file, replacing the in-memory copy.
    pub fn reload(&mut self) -> Result<&WorkflowState, StateError> {
        let path = self.state_path();
        if !path.is_file() {
            return Err(StateError::NotFound {
                adw_id: self.adw_id.clone(),
                path,
            });
        }
        let state = read_state(&path)?;
        Ok(self.state.insert(state))
    }

    /// Persist the in-memory state, stamping `updated_at`.
    pub fn save(&mut self) -> Result<(), StateError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let path = self.state_path();
        let lock_path = self.lock_path();
        let state = self.state.as_mut().ok_or(StateError::NotInitialized)?;
        state.updated_at = Utc::now();
        state.validate()?;

        std::fs::create_dir_all(&self.state_dir)?;
        let _lock = StateLock::acquire(&lock_path)?;
        write_state(&path, state)?;

        debug!(adw_id = %self.adw_id, phase = %state.current_phase, "Saved workflow state");

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("state.save", start.elapsed());

        Ok(())
    }

    /// Locked read-modify-write against the on-disk state.
    ///
    /// The closure sees the latest saved state, so concurrent transactions
    /// touching different fields never lose each other's updates.
    pub fn transact<F, T>(&mut self, f: F) -> Result<T, StateError>
    where
        F: FnOnce(&mut WorkflowState) -> Result<T, StateError>,
    {
        let path = self.state_path();
        if !path.is_file() {
            return Err(StateError::NotFound {
                adw_id: self.adw_id.clone(),
                path,
            });
        }

        let _lock = StateLock::acquire(&self.lock_path())?;
        let mut state = read_state(&path)?;
        let out = f(&mut state)?;
        state.updated_at = Utc::now();
        state.validate()?;
        write_state(&path, &state)?;

        self.state = Some(state);
        Ok(out)
    }

    // ========================================================================
    // Phase tracking
    // ========================================================================

    /// Append a phase record and move `current_phase`. In-memory only.
    pub fn record_phase_completion(
        &mut self,
        phase: &str,
        duration_seconds: f64,
        success: bool,
        error_message: Option<String>,
    ) -> Result<(), StateError> {
        self.state_mut()?
            .record_phase(phase, duration_seconds, success, error_message);
        Ok(())
    }

    /// Append a phase record straight to disk under the lock.
    ///
    /// Records written by other processes since this manager loaded are
    /// kept, unlike `record_phase_completion` followed by `save`.
    pub fn commit_phase_completion(
        &mut self,
        phase: &str,
        duration_seconds: f64,
        success: bool,
        error_message: Option<String>,
    ) -> Result<&WorkflowState, StateError> {
        self.transact(|state| {
            state.record_phase(phase, duration_seconds, success, error_message);
            Ok(())
        })?;
        self.current()
    }

    /// True iff every name in `required` has a successful record.
    pub fn validate_prerequisites<S: AsRef<str>>(&self, required: &[S]) -> bool {
        self.state
            .as_ref()
            .is_some_and(|s| s.missing_phases(required).is_empty())
    }

    /// Phases from `required` that have not succeeded yet.
    pub fn missing_prerequisites<S: AsRef<str>>(&self, required: &[S]) -> Vec<String> {
        match &self.state {
            Some(state) => state.missing_phases(required),
            None => required.iter().map(|s| s.as_ref().to_string()).collect(),
        }
    }

    /// Phase records in call order. Empty before initialization.
    pub fn phase_history(&self) -> &[PhaseRecord] {
        self.state
            .as_ref()
            .map_or(&[][..], |s| s.phase_history.as_slice())
    }

    /// Most recent successful record for `phase`.
    pub fn latest_successful_record(&self, phase: &str) -> Option<&PhaseRecord> {
        self.state.as_ref()?.latest_success(phase)
    }

    // ========================================================================
    // Field updates
    // ========================================================================

    /// Set fields by their JSON name. In-memory only.
    ///
    /// Unknown names, type mismatches, changes to frozen fields and
    /// invariant violations all fail without modifying the state.
    pub fn update<I, K>(&mut self, fields: I) -> Result<(), StateError>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        let current = self.current()?;
        let Value::Object(mut doc) = serde_json::to_value(current)? else {
            return Err(StateError::Validation(
                "state did not serialize to an object".to_string(),
            ));
        };

        let mut touched = Vec::new();
        for (key, value) in fields {
            let key = key.as_ref();
            let existing = doc
                .get(key)
                .ok_or_else(|| StateError::UnknownField(key.to_string()))?;

            if IMMUTABLE_FIELDS.contains(&key) && *existing != value {
                return Err(StateError::ImmutableField(key.to_string()));
            }
            if WRITE_ONCE_FIELDS.contains(&key) && !existing.is_null() && *existing != value {
                return Err(StateError::ImmutableField(key.to_string()));
            }

            doc.insert(key.to_string(), value);
            touched.push(key.to_string());
        }

        let updated: WorkflowState =
            serde_json::from_value(Value::Object(doc)).map_err(|e| StateError::InvalidValue {
                field: touched.join(", "),
                message: e.to_string(),
            })?;
        updated.validate()?;

        self.state = Some(updated);
        Ok(())
    }

    /// Mark the workflow as cleaned up without touching its history.
    pub fn annotate_cleanup(&mut self, reason: &str) -> Result<(), StateError> {
        self.state_mut()?.mark_cleanup(reason);
        Ok(())
    }
}

// ============================================================================
// File helpers
// ============================================================================

/// Ids become directory names, so keep them to a safe character set.
fn check_id(adw_id: &str) -> Result<(), StateError> {
    let ok = !adw_id.is_empty()
        && adw_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(StateError::InvalidId(adw_id.to_string()))
    }
}

pub(crate) fn read_state(path: &Path) -> Result<WorkflowState, StateError> {
    let content = std::fs::read_to_string(path)?;
    let state: WorkflowState =
        serde_json::from_str(&content).map_err(|e| StateError::Corrupted {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    state.validate()?;
    Ok(state)
}

fn write_state(path: &Path, state: &WorkflowState) -> Result<(), StateError> {
    let json = serde_json::to_string_pretty(state)?;
    write_atomic(path, json.as_bytes(), STATE_TEMP_PREFIX)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worktree::PortPair;
    use serde_json::json;
    use tempfile::TempDir;

    fn fresh(temp: &TempDir, id: &str) -> StateManager {
        let mut manager = StateManager::new(id, temp.path()).unwrap();
        manager
            .initialize(
                WorkflowState::new(
                    id,
                    42,
                    format!("trees/{id}"),
                    format!("feat/issue-42-{id}"),
                    PortPair { backend: 9101, frontend: 9201 },
                )
                .with_models("claude-opus-4-5-20251101", "gpt-4o", "gemini-2.0-flash-exp"),
            )
            .unwrap();
        manager
    }

    #[test]
    fn test_initialize_creates_file() {
        let temp = TempDir::new().unwrap();
        let manager = fresh(&temp, "a1b2c3d4");
        assert!(manager.exists());
        assert!(manager.state_path().ends_with("a1b2c3d4/adw_state.json"));
    }

    #[test]
    fn test_initialize_twice_fails() {
        let temp = TempDir::new().unwrap();
        let manager = fresh(&temp, "a1b2c3d4");
        let again = manager.state().unwrap().clone();

        let mut second = StateManager::new("a1b2c3d4", temp.path()).unwrap();
        let result = second.initialize(again);
        assert!(matches!(result, Err(StateError::AlreadyExists { .. })));
    }

    #[test]
    fn test_initialize_rejects_mismatched_id() {
        let temp = TempDir::new().unwrap();
        let mut manager = StateManager::new("a1b2c3d4", temp.path()).unwrap();
        let state = WorkflowState::new("ffffffff", 1, "t", "b", PortPair { backend: 9100, frontend: 9200 });
        assert!(manager.initialize(state).is_err());
        assert!(!manager.exists());
    }

    #[test]
    fn test_load_missing_fails() {
        let temp = TempDir::new().unwrap();
        let result = StateManager::load("deadbeef", temp.path());
        assert!(matches!(result, Err(StateError::NotFound { .. })));
    }

    #[test]
    fn test_invalid_id_rejected() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            StateManager::new("../escape", temp.path()),
            Err(StateError::InvalidId(_))
        ));
        assert!(StateManager::new("", temp.path()).is_err());
    }

    #[test]
    fn test_save_before_initialize_fails() {
        let temp = TempDir::new().unwrap();
        let mut manager = StateManager::new("a1b2c3d4", temp.path()).unwrap();
        assert!(matches!(manager.save(), Err(StateError::NotInitialized)));
    }

    #[test]
    fn test_save_stamps_updated_at() {
        let temp = TempDir::new().unwrap();
        let mut manager = fresh(&temp, "a1b2c3d4");
        let before = manager.state().unwrap().updated_at;
        std::thread::sleep(std::time::Duration::from_millis(5));
        manager.save().unwrap();
        assert!(manager.state().unwrap().updated_at > before);
    }

    #[test]
    fn test_saved_file_is_two_space_json() {
        let temp = TempDir::new().unwrap();
        let manager = fresh(&temp, "a1b2c3d4");
        let content = std::fs::read_to_string(manager.state_path()).unwrap();
        assert!(content.starts_with("{\n  \"adw_id\""));
    }

    #[test]
    fn test_record_phase_completion_sets_current_phase() {
        let temp = TempDir::new().unwrap();
        let mut manager = fresh(&temp, "a1b2c3d4");

        manager.record_phase_completion("plan", 3.2, true, None).unwrap();
        assert_eq!(manager.state().unwrap().current_phase, "plan");

        manager
            .record_phase_completion("build", 1.0, false, Some("compile error".into()))
            .unwrap();
        let state = manager.state().unwrap();
        assert_eq!(state.current_phase, "build_failed");
        assert_eq!(state.phase_history.len(), 2);
        assert_eq!(state.phase_history[1].error_message.as_deref(), Some("compile error"));
    }

    #[test]
    fn test_record_before_initialize_fails() {
        let temp = TempDir::new().unwrap();
        let mut manager = StateManager::new("a1b2c3d4", temp.path()).unwrap();
        assert!(manager.record_phase_completion("plan", 1.0, true, None).is_err());
        assert!(!manager.validate_prerequisites(&["plan"]));
    }

    #[test]
    fn test_validate_prerequisites() {
        let temp = TempDir::new().unwrap();
        let mut manager = fresh(&temp, "a1b2c3d4");
        let empty: [&str; 0] = [];
        assert!(manager.validate_prerequisites(&empty));

        manager.record_phase_completion("plan", 1.0, false, None).unwrap();
        assert!(!manager.validate_prerequisites(&["plan"]));

        manager.record_phase_completion("plan", 1.0, true, None).unwrap();
        manager.record_phase_completion("build", 1.0, true, None).unwrap();
        assert!(manager.validate_prerequisites(&["build", "plan", "plan"]));
        assert_eq!(manager.missing_prerequisites(&["plan", "test"]), vec!["test".to_string()]);

        assert_eq!(manager.phase_history().len(), 3);
        let latest = manager.latest_successful_record("plan").unwrap();
        assert!(latest.success);
        assert!(manager.latest_successful_record("test").is_none());
    }

    #[test]
    fn test_update_known_fields() {
        let temp = TempDir::new().unwrap();
        let mut manager = fresh(&temp, "a1b2c3d4");
        manager
            .update([
                ("plan_file", json!("specs/a1b2c3d4/plan.md")),
                ("test_coverage", json!(87.5)),
                ("test_results", json!({"passed": 10, "failed": 1, "errors": 0})),
            ])
            .unwrap();

        let state = manager.state().unwrap();
        assert_eq!(state.plan_file.as_deref(), Some(Path::new("specs/a1b2c3d4/plan.md")));
        assert_eq!(state.test_coverage, Some(87.5));
        assert_eq!(state.test_results.as_ref().unwrap().failed, 1);
    }

    #[test]
    fn test_update_unknown_field_fails() {
        let temp = TempDir::new().unwrap();
        let mut manager = fresh(&temp, "a1b2c3d4");
        let result = manager.update([("plan_fiel", json!("typo.md"))]);
        assert!(matches!(result, Err(StateError::UnknownField(f)) if f == "plan_fiel"));
    }

    #[test]
    fn test_update_is_all_or_nothing() {
        let temp = TempDir::new().unwrap();
        let mut manager = fresh(&temp, "a1b2c3d4");
        let result = manager.update([
            ("plan_file", json!("plan.md")),
            ("test_coverage", json!(150.0)),
        ]);
        assert!(matches!(result, Err(StateError::Validation(_))));
        assert!(manager.state().unwrap().plan_file.is_none());
    }

    #[test]
    fn test_update_type_mismatch() {
        let temp = TempDir::new().unwrap();
        let mut manager = fresh(&temp, "a1b2c3d4");
        let result = manager.update([("issue_number", json!("forty-two"))]);
        assert!(matches!(result, Err(StateError::InvalidValue { .. })));
    }

    #[test]
    fn test_update_frozen_fields() {
        let temp = TempDir::new().unwrap();
        let mut manager = fresh(&temp, "a1b2c3d4");
        assert!(matches!(
            manager.update([("adw_id", json!("ffffffff"))]),
            Err(StateError::ImmutableField(_))
        ));
        assert!(matches!(
            manager.update([("trinity_critic_model", json!("gpt-4o-mini"))]),
            Err(StateError::ImmutableField(_))
        ));
        // Re-setting the same value is a no-op.
        manager.update([("trinity_critic_model", json!("gpt-4o"))]).unwrap();
    }

    #[test]
    fn test_transact_reads_latest_disk_state() {
        let temp = TempDir::new().unwrap();
        let mut first = fresh(&temp, "a1b2c3d4");
        let mut second = StateManager::load("a1b2c3d4", temp.path()).unwrap();

        first
            .transact(|s| {
                s.repo_url = Some("https://example.com/repo.git".into());
                Ok(())
            })
            .unwrap();
        second
            .transact(|s| {
                s.test_coverage = Some(90.0);
                Ok(())
            })
            .unwrap();

        let reloaded = StateManager::load("a1b2c3d4", temp.path()).unwrap();
        let state = reloaded.state().unwrap();
        assert_eq!(state.repo_url.as_deref(), Some("https://example.com/repo.git"));
        assert_eq!(state.test_coverage, Some(90.0));
    }

    #[test]
    fn test_annotate_cleanup() {
        let temp = TempDir::new().unwrap();
        let mut manager = fresh(&temp, "a1b2c3d4");
        manager.record_phase_completion("plan", 1.0, true, None).unwrap();
        manager.annotate_cleanup("ttl_expired").unwrap();
        manager.save().unwrap();

        let reloaded = StateManager::load("a1b2c3d4", temp.path()).unwrap();
        let state = reloaded.state().unwrap();
        assert_eq!(state.cleanup_reason.as_deref(), Some("ttl_expired"));
        assert!(state.cleanup_at.is_some());
        assert_eq!(state.phase_history.len(), 1);
    }

    #[test]
    fn test_corrupted_file_reports_path() {
        let temp = TempDir::new().unwrap();
        let manager = fresh(&temp, "a1b2c3d4");
        std::fs::write(manager.state_path(), "{ not json").unwrap();
        let result = StateManager::load("a1b2c3d4", temp.path());
        assert!(matches!(result, Err(StateError::Corrupted { .. })));
    }
}
