// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Workflow ids, port allocation, and isolated git worktrees.
//!
//! Allocation is deterministic by id and create-or-fail, so two workflows
//! never need to coordinate: a collision surfaces as an explicit error.

mod ids;
mod manager;

pub use ids::{
    branch_name, generate_id, ports_for, validate_id, PortPair, BACKEND_PORT_BASE,
    FRONTEND_PORT_BASE, ID_LEN, PORT_SLOTS,
};
pub use manager::{
    WorktreeEntry, WorktreeInfo, WorktreeManager, DEFAULT_MAX_AGE_HOURS, DEFAULT_TREES_DIR,
    TTL_EXPIRED,
};
