// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! ADW - AI developer workflow orchestrator.
//!
//! Drives a GitHub issue through plan, build, test, review, document and
//! ship phases. Each workflow gets an 8-hex-char id, its own git worktree
//! and port pair, and a crash-safe state file with snapshots for rollback.
//! Planning runs the Trinity protocol: three providers analyse the issue
//! independently and one synthesizes a structured plan.
//!
//! # Architecture
//!
//! - [`types`] - `ProviderClient` trait, `LlmResponse`, `ProviderConfig`
//! - [`error`] - Error enums per subsystem and the `Result` alias
//! - [`config`] - Layered configuration loading and merging
//! - [`providers`] - Anthropic, OpenAI and Gemini clients plus the retrying decorator
//! - [`resilience`] - Timeout and retry policy, call outcomes, failure manifests
//! - [`state`] - Locked, atomic workflow state with snapshots and rollback
//! - [`worktree`] - Ids, port allocation and git worktree lifecycle
//! - [`trinity`] - Diverge/converge planning and review consensus
//! - [`workflow`] - Phase prerequisites, phase recording, the plan phase
//! - [`telemetry`] - Tracing setup and in-process metrics
//!
//! # Example
//!
//! ```rust,ignore
//! use adw::config::{load_config, CliOptions};
//! use adw::providers::create_trinity_clients;
//! use adw::trinity::{Issue, TrinityProtocol};
//! use adw::workflow::PlanningRun;
//! use adw::worktree::WorktreeManager;
//!
//! let config = load_config(&root, CliOptions::default())?.rooted_at(&root);
//! let protocol = TrinityProtocol::new(create_trinity_clients(&config)?);
//! let worktrees = WorktreeManager::new(&root)
//!     .with_trees_dir(&config.trees_dir)
//!     .with_agents_dir(&config.agents_dir);
//!
//! let outcome = PlanningRun::new(worktrees, protocol, &config.specs_dir)
//!     .execute(&Issue::new(42, "Add CSV export", "Users want downloads"))
//!     .await?;
//! println!("{} -> {}", outcome.adw_id, outcome.plan_file.display());
//! ```

pub mod config;
pub mod error;
pub mod providers;
pub mod resilience;
pub mod state;
pub mod telemetry;
pub mod trinity;
pub mod types;
pub mod workflow;
pub mod worktree;

pub use error::{
    ConfigError, ProviderError, Result, StateError, TrinityError, WorkflowError, WorktreeError,
};
pub use providers::{create_client, create_trinity_clients, ProviderKind, TrinityClients};
pub use resilience::{run_with_resilience, CallOutcome, RetryPolicy};
pub use state::{PhaseRecord, StateManager, WorkflowState};
pub use trinity::{Issue, Role, TrinityPlan, TrinityProtocol};
pub use types::{LlmResponse, ProviderClient, ProviderConfig, SharedClient};
pub use workflow::{run_phase, Phase, PlanningRun};
pub use worktree::{generate_id, ports_for, PortPair, WorktreeManager};

/// ADW version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_public_exports() {
        let _response = LlmResponse::new("ok", "gpt-4o", "openai");
        let _policy = RetryPolicy::default();
        assert_eq!(ports_for("a1b2c3d4").unwrap().backend, 9101);
        assert_eq!(Phase::Build.prerequisites(), &[Phase::Plan]);
    }
}
