// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Persisted workflow state types.
//!
//! Field names are the on-disk JSON keys. New fields must be optional and
//! carry `#[serde(default)]` so older state files keep loading.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StateError;
use crate::worktree::{PortPair, BACKEND_PORT_BASE, FRONTEND_PORT_BASE, PORT_SLOTS};

/// Phase name a fresh workflow starts in.
pub const INITIAL_PHASE: &str = "initialized";

/// Fields that never change after initialization.
pub(crate) const IMMUTABLE_FIELDS: &[&str] = &["adw_id", "created_at"];

/// Fields that may be filled once and are then frozen.
pub(crate) const WRITE_ONCE_FIELDS: &[&str] = &[
    "trinity_architect_model",
    "trinity_critic_model",
    "trinity_advocate_model",
];

fn default_phase() -> String {
    INITIAL_PHASE.to_string()
}

// ============================================================================
// Phase records
// ============================================================================

/// One entry in the append-only phase audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: String,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub success: bool,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl PhaseRecord {
    /// Create a record stamped with the current time.
    pub fn new(
        phase: impl Into<String>,
        duration_seconds: f64,
        success: bool,
        error_message: Option<String>,
    ) -> Self {
        Self {
            phase: phase.into(),
            completed_at: Utc::now(),
            duration_seconds,
            success,
            error_message,
        }
    }
}

/// Counts from the most recent test run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResults {
    #[serde(default)]
    pub passed: u32,
    #[serde(default)]
    pub failed: u32,
    #[serde(default)]
    pub errors: u32,
    #[serde(default)]
    pub skipped: u32,
}

impl TestResults {
    pub fn total(&self) -> u32 {
        self.passed + self.failed + self.errors + self.skipped
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.errors == 0
    }
}

// ============================================================================
// Workflow state
// ============================================================================

/// Durable record for one workflow instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub adw_id: String,
    pub issue_number: u64,
    pub worktree_path: PathBuf,
    pub branch_name: String,
    pub backend_port: u16,
    pub frontend_port: u16,

    #[serde(default)]
    pub plan_file: Option<PathBuf>,
    #[serde(default)]
    pub plan_json: Option<PathBuf>,
    #[serde(default)]
    pub repo_url: Option<String>,

    #[serde(default)]
    pub trinity_architect_model: Option<String>,
    #[serde(default)]
    pub trinity_critic_model: Option<String>,
    #[serde(default)]
    pub trinity_advocate_model: Option<String>,

    #[serde(default)]
    pub test_results: Option<TestResults>,
    #[serde(default)]
    pub test_coverage: Option<f64>,

    #[serde(default = "default_phase")]
    pub current_phase: String,
    #[serde(default, rename = "all_adws")]
    pub phase_history: Vec<PhaseRecord>,

    #[serde(default)]
    pub cleanup_reason: Option<String>,
    #[serde(default)]
    pub cleanup_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowState {
    /// Build a fresh state for a newly allocated workflow.
    pub fn new(
        adw_id: impl Into<String>,
        issue_number: u64,
        worktree_path: impl Into<PathBuf>,
        branch_name: impl Into<String>,
        ports: PortPair,
    ) -> Self {
        let now = Utc::now();
        Self {
            adw_id: adw_id.into(),
            issue_number,
            worktree_path: worktree_path.into(),
            branch_name: branch_name.into(),
            backend_port: ports.backend,
            frontend_port: ports.frontend,
            plan_file: None,
            plan_json: None,
            repo_url: None,
            trinity_architect_model: None,
            trinity_critic_model: None,
            trinity_advocate_model: None,
            test_results: None,
            test_coverage: None,
            current_phase: default_phase(),
            phase_history: Vec::new(),
            cleanup_reason: None,
            cleanup_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Capture the three Trinity model ids.
    pub fn with_models(
        mut self,
        architect: impl Into<String>,
        critic: impl Into<String>,
        advocate: impl Into<String>,
    ) -> Self {
        self.trinity_architect_model = Some(architect.into());
        self.trinity_critic_model = Some(critic.into());
        self.trinity_advocate_model = Some(advocate.into());
        self
    }

    pub fn with_repo_url(mut self, url: impl Into<String>) -> Self {
        self.repo_url = Some(url.into());
        self
    }

    /// Record why and when the workflow's resources were torn down.
    pub fn mark_cleanup(&mut self, reason: &str) {
        self.cleanup_reason = Some(reason.to_string());
        self.cleanup_at = Some(Utc::now());
    }

    pub fn ports(&self) -> PortPair {
        PortPair {
            backend: self.backend_port,
            frontend: self.frontend_port,
        }
    }

    /// Append a phase record and move `current_phase` to `phase`, or to
    /// `{phase}_failed` on failure.
    pub fn record_phase(
        &mut self,
        phase: &str,
        duration_seconds: f64,
        success: bool,
        error_message: Option<String>,
    ) {
        self.phase_history
            .push(PhaseRecord::new(phase, duration_seconds, success, error_message));
        self.current_phase = if success {
            phase.to_string()
        } else {
            format!("{phase}_failed")
        };
    }

    /// True iff some record for `phase` succeeded.
    pub fn has_succeeded(&self, phase: &str) -> bool {
        self.phase_history
            .iter()
            .any(|r| r.success && r.phase == phase)
    }

    /// Index of the first successful record for `phase`.
    pub fn first_success_index(&self, phase: &str) -> Option<usize> {
        self.phase_history
            .iter()
            .position(|r| r.success && r.phase == phase)
    }

    /// Most recent successful record for `phase`.
    pub fn latest_success(&self, phase: &str) -> Option<&PhaseRecord> {
        self.phase_history
            .iter()
            .rev()
            .find(|r| r.success && r.phase == phase)
    }

    /// Names from `required` that have no successful record, deduplicated.
    pub fn missing_phases<S: AsRef<str>>(&self, required: &[S]) -> Vec<String> {
        let mut missing: Vec<String> = Vec::new();
        for phase in required.iter().map(|p| p.as_ref()) {
            if !self.has_succeeded(phase) && !missing.iter().any(|m| m == phase) {
                missing.push(phase.to_string());
            }
        }
        missing
    }

    /// True when this state's history is a prefix of `other`'s.
    pub fn is_ancestor_of(&self, other: &WorkflowState) -> bool {
        self.phase_history.len() <= other.phase_history.len()
            && other.phase_history[..self.phase_history.len()] == self.phase_history[..]
    }

    /// Check the port and coverage invariants.
    pub fn validate(&self) -> Result<(), StateError> {
        let backend_range = BACKEND_PORT_BASE..BACKEND_PORT_BASE + PORT_SLOTS;
        if !backend_range.contains(&self.backend_port) {
            return Err(StateError::Validation(format!(
                "backend_port {} outside {}..={}",
                self.backend_port,
                BACKEND_PORT_BASE,
                BACKEND_PORT_BASE + PORT_SLOTS - 1
            )));
        }

        let frontend_range = FRONTEND_PORT_BASE..FRONTEND_PORT_BASE + PORT_SLOTS;
        if !frontend_range.contains(&self.frontend_port) {
            return Err(StateError::Validation(format!(
                "frontend_port {} outside {}..={}",
                self.frontend_port,
                FRONTEND_PORT_BASE,
                FRONTEND_PORT_BASE + PORT_SLOTS - 1
            )));
        }

        if self.frontend_port != self.backend_port + (FRONTEND_PORT_BASE - BACKEND_PORT_BASE) {
            return Err(StateError::Validation(format!(
                "frontend_port {} does not pair with backend_port {}",
                self.frontend_port, self.backend_port
            )));
        }

        if let Some(coverage) = self.test_coverage {
            if !(0.0..=100.0).contains(&coverage) {
                return Err(StateError::Validation(format!(
                    "test_coverage {coverage} outside 0..=100"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WorkflowState {
        WorkflowState::new(
            "a1b2c3d4",
            42,
            "trees/a1b2c3d4",
            "feat/issue-42-a1b2c3d4",
            PortPair { backend: 9101, frontend: 9201 },
        )
    }

    #[test]
    fn test_new_state_defaults() {
        let state = sample();
        assert_eq!(state.current_phase, INITIAL_PHASE);
        assert!(state.phase_history.is_empty());
        assert!(state.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_ports() {
        let mut state = sample();
        state.backend_port = 9115;
        state.frontend_port = 9215;
        assert!(matches!(state.validate(), Err(StateError::Validation(_))));

        let mut state = sample();
        state.frontend_port = 9202;
        assert!(matches!(state.validate(), Err(StateError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_bad_coverage() {
        let mut state = sample();
        state.test_coverage = Some(100.5);
        assert!(state.validate().is_err());
        state.test_coverage = Some(100.0);
        assert!(state.validate().is_ok());
    }

    #[test]
    fn test_missing_phases_is_order_independent() {
        let mut state = sample();
        state.phase_history.push(PhaseRecord::new("build", 1.0, true, None));
        state.phase_history.push(PhaseRecord::new("plan", 1.0, false, Some("boom".into())));

        assert_eq!(state.missing_phases(&["plan", "build", "plan"]), vec!["plan".to_string()]);
        state.phase_history.push(PhaseRecord::new("plan", 1.0, true, None));
        assert!(state.missing_phases(&["build", "plan"]).is_empty());
    }

    #[test]
    fn test_old_files_without_optional_fields_load() {
        let json = r#"{
            "adw_id": "a1b2c3d4",
            "issue_number": 7,
            "worktree_path": "trees/a1b2c3d4",
            "branch_name": "feat/issue-7-a1b2c3d4",
            "backend_port": 9101,
            "frontend_port": 9201,
            "created_at": "2026-01-02T03:04:05Z",
            "updated_at": "2026-01-02T03:04:05Z"
        }"#;
        let state: WorkflowState = serde_json::from_str(json).unwrap();
        assert_eq!(state.current_phase, INITIAL_PHASE);
        assert!(state.phase_history.is_empty());
        assert!(state.cleanup_reason.is_none());
    }

    #[test]
    fn test_phase_history_serializes_as_all_adws() {
        let mut state = sample();
        state.phase_history.push(PhaseRecord::new("plan", 3.2, true, None));
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["all_adws"][0]["phase"], "plan");
        assert!(value.get("phase_history").is_none());
    }

    #[test]
    fn test_is_ancestor_of() {
        let mut early = sample();
        early.phase_history.push(PhaseRecord::new("plan", 1.0, true, None));
        let mut later = early.clone();
        later.phase_history.push(PhaseRecord::new("build", 1.0, true, None));

        assert!(early.is_ancestor_of(&later));
        assert!(!later.is_ancestor_of(&early));

        let mut diverged = sample();
        diverged.phase_history.push(PhaseRecord::new("plan", 2.0, false, None));
        assert!(!diverged.is_ancestor_of(&later));
    }
}
