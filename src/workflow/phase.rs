// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Pipeline phases and the phase recorder.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use crate::error::WorkflowError;
use crate::state::{StateManager, SNAPSHOT_PREFIX};

/// One stage of the plan-to-ship pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Plan,
    Build,
    Test,
    Review,
    Document,
    Ship,
}

impl Phase {
    /// Every phase in pipeline order.
    pub const ALL: [Phase; 6] = [
        Phase::Plan,
        Phase::Build,
        Phase::Test,
        Phase::Review,
        Phase::Document,
        Phase::Ship,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Plan => "plan",
            Phase::Build => "build",
            Phase::Test => "test",
            Phase::Review => "review",
            Phase::Document => "document",
            Phase::Ship => "ship",
        }
    }

    /// Phases that must have succeeded before this one may run.
    pub fn prerequisites(&self) -> &'static [Phase] {
        let all: &'static [Phase] = &Self::ALL;
        let index = all.iter().position(|p| p == self).unwrap_or(0);
        &all[..index]
    }

    /// Prerequisite names, as stored in phase records.
    pub fn prerequisite_names(&self) -> Vec<&'static str> {
        self.prerequisites().iter().map(Phase::as_str).collect()
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown phase name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePhaseError(String);

impl fmt::Display for ParsePhaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown phase '{}' (expected one of: plan, build, test, review, document, ship)",
            self.0
        )
    }
}

impl std::error::Error for ParsePhaseError {}

impl FromStr for Phase {
    type Err = ParsePhaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParsePhaseError(s.to_string()))
    }
}

// ============================================================================
// Phase recorder
// ============================================================================

/// A phase that passed its prerequisite check and is being timed.
///
/// Finish it with [`PhaseRun::finish`] to record the outcome. Dropping it
/// records nothing.
#[derive(Debug)]
pub struct PhaseRun {
    adw_id: String,
    phase: Phase,
    started: Instant,
}

impl PhaseRun {
    /// Check prerequisites and start the clock.
    ///
    /// A prerequisite failure is not recorded in the phase history.
    pub fn begin(manager: &StateManager, phase: Phase) -> Result<Self, WorkflowError> {
        let missing = manager.missing_prerequisites(&phase.prerequisite_names());
        if !missing.is_empty() {
            return Err(WorkflowError::PrerequisitesNotMet {
                adw_id: manager.adw_id().to_string(),
                phase: phase.to_string(),
                missing,
            });
        }

        info!(adw_id = manager.adw_id(), phase = %phase, "Phase started");
        Ok(Self {
            adw_id: manager.adw_id().to_string(),
            phase,
            started: Instant::now(),
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Record the outcome, save, and snapshot on success.
    ///
    /// A failed body is recorded and saved, then surfaces as
    /// [`WorkflowError::PhaseFailed`]. Persistence errors always propagate.
    pub fn finish<T, E: fmt::Display>(
        self,
        manager: &mut StateManager,
        result: Result<T, E>,
    ) -> Result<T, WorkflowError> {
        let elapsed = self.started.elapsed();
        let duration = elapsed.as_secs_f64();
        let phase = self.phase.as_str();

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation(&format!("phase.{phase}"), elapsed);

        match result {
            Ok(value) => {
                manager.record_phase_completion(phase, duration, true, None)?;
                manager.save()?;
                let snapshot = manager.create_snapshot(Some(phase))?;
                info!(
                    adw_id = %self.adw_id,
                    phase,
                    duration_secs = duration,
                    snapshot = %snapshot.display(),
                    "Phase succeeded"
                );
                Ok(value)
            }
            Err(e) => {
                let message = e.to_string();
                manager.record_phase_completion(phase, duration, false, Some(message.clone()))?;
                manager.save()?;
                warn!(adw_id = %self.adw_id, phase, duration_secs = duration, "Phase failed: {}", message);
                Err(WorkflowError::PhaseFailed {
                    adw_id: self.adw_id,
                    phase: phase.to_string(),
                    message,
                })
            }
        }
    }
}

/// Run `body` as `phase` against an initialized workflow.
///
/// Prerequisites are checked first; the outcome is then recorded, saved and,
/// on success, snapshotted with the phase name as label.
pub async fn run_phase<F, Fut, T, E>(
    manager: &mut StateManager,
    phase: Phase,
    body: F,
) -> Result<T, WorkflowError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let run = PhaseRun::begin(manager, phase)?;
    let result = body().await;
    run.finish(manager, result)
}

/// Path of the newest snapshot labeled with `phase`, if any.
pub fn latest_phase_snapshot(
    manager: &StateManager,
    phase: Phase,
) -> Result<Option<PathBuf>, WorkflowError> {
    let snapshots = manager.list_snapshots()?;
    Ok(snapshots.into_iter().find(|path| {
        path.file_stem()
            .and_then(|s| s.to_str())
            .and_then(snapshot_label)
            .is_some_and(|label| label == phase.as_str())
    }))
}

/// Label of `snapshot_{stamp}_{label}[_{n}]`, without the collision suffix.
fn snapshot_label(stem: &str) -> Option<&str> {
    let (_, label) = stem.strip_prefix(SNAPSHOT_PREFIX)?.split_once('_')?;
    match label.rsplit_once('_') {
        Some((base, n)) if !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()) => Some(base),
        _ => Some(label),
    }
}
