// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Pipeline phases and their entry points.
//!
//! Every phase runs through [`PhaseRun`]: prerequisites are checked against
//! the recorded history, the outcome is appended as a phase record, the
//! state is saved, and a successful phase is snapshotted under its own name
//! so `rollback --phase` can find it later.

mod phase;
mod plan;

pub use phase::{latest_phase_snapshot, run_phase, ParsePhaseError, Phase, PhaseRun};
pub use plan::{PlanningOutcome, PlanningRun};
