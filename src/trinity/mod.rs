// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The Trinity protocol: three-provider diverge/converge planning.
//!
//! # Flow
//!
//! 1. **Divergence** - the Architect, Critic, and Advocate answer the same
//!    issue concurrently. A failing role yields a failed
//!    [`TrinityPerspective`]; the other two are unaffected.
//! 2. **Convergence** - the Architect's client synthesizes all three texts
//!    into strict JSON, parsed into a [`TrinityPlan`]. Failures here are
//!    errors.
//!
//! [`TrinityProtocol::review`] reuses the same three clients to score an
//! implementation and compute a consensus rating.

mod prompts;
mod protocol;
mod render;
mod review;
mod types;

pub use prompts::{
    convergence_prompt, divergence_prompt, review_prompt, role_system, CONVERGENCE_SYSTEM,
    REVIEW_SYSTEM,
};
pub use protocol::{parse_plan_response, TrinityProtocol};
pub use render::{render_markdown, save_plan, PLAN_JSON, PLAN_MARKDOWN};
pub use review::{
    compute_consensus, parse_review_response, ReviewOutcome, ReviewPerspective,
    APPROVAL_THRESHOLD, NEUTRAL_RATING,
};
pub use types::{
    Complexity, Issue, PlanDraft, Role, TrinityPerspective, TrinityPlan, NOT_AVAILABLE,
};
