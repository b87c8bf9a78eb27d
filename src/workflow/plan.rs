// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The plan phase: allocate a workflow and run Trinity on an issue.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::error::{StateError, TrinityError, WorkflowError};
use crate::state::{StateManager, WorkflowState};
use crate::trinity::{save_plan, Issue, TrinityPlan, TrinityProtocol};
use crate::worktree::{generate_id, ports_for, validate_id, PortPair, WorktreeManager};

use super::phase::{Phase, PhaseRun};

/// Everything a successful planning run produced.
#[derive(Debug, Clone, Serialize)]
pub struct PlanningOutcome {
    pub adw_id: String,
    pub ports: PortPair,
    pub worktree_path: PathBuf,
    pub branch_name: String,
    pub plan_file: PathBuf,
    pub plan_json: PathBuf,
    pub plan: TrinityPlan,
}

/// Creates a workflow for an issue and runs the plan phase in it.
pub struct PlanningRun {
    worktrees: WorktreeManager,
    protocol: TrinityProtocol,
    specs_dir: PathBuf,
    repo_url: Option<String>,
    repo_context: Option<String>,
}

impl PlanningRun {
    /// State lives in the worktree manager's agents directory.
    pub fn new(
        worktrees: WorktreeManager,
        protocol: TrinityProtocol,
        specs_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            worktrees,
            protocol,
            specs_dir: specs_dir.into(),
            repo_url: None,
            repo_context: None,
        }
    }

    pub fn with_repo_url(mut self, url: impl Into<String>) -> Self {
        self.repo_url = Some(url.into());
        self
    }

    /// Extra context handed to the Architect.
    pub fn with_repo_context(mut self, context: impl Into<String>) -> Self {
        self.repo_context = Some(context.into());
        self
    }

    /// Plan `issue` under a fresh workflow id.
    pub async fn execute(&self, issue: &Issue) -> Result<PlanningOutcome, WorkflowError> {
        self.execute_with_id(&generate_id(), issue).await
    }

    /// Plan `issue` under a caller-chosen id.
    ///
    /// The worktree and state are created before Trinity runs. If Trinity
    /// fails the failure is recorded in the new state and the worktree is
    /// kept for inspection. An id whose state outlived its worktree is
    /// refused before anything is created.
    #[instrument(skip(self, issue), fields(issue = issue.number))]
    pub async fn execute_with_id(
        &self,
        adw_id: &str,
        issue: &Issue,
    ) -> Result<PlanningOutcome, WorkflowError> {
        validate_id(adw_id)?;
        let ports = ports_for(adw_id)?;

        let mut manager = StateManager::new(adw_id, self.worktrees.agents_dir())?;
        if manager.exists() {
            return Err(StateError::AlreadyExists {
                adw_id: adw_id.to_string(),
                path: manager.state_path(),
            }
            .into());
        }

        let (worktree_path, branch_name) =
            self.worktrees.create_worktree(adw_id, issue.number).await?;

        let [architect, critic, advocate] = self.protocol.models();
        let mut state = WorkflowState::new(
            adw_id,
            issue.number,
            worktree_path.clone(),
            branch_name.clone(),
            ports,
        )
        .with_models(architect, critic, advocate);
        if let Some(url) = &self.repo_url {
            state = state.with_repo_url(url.clone());
        }

        if let Err(e) = manager.initialize(state) {
            if let Err(cleanup) = self.worktrees.remove_worktree(adw_id, true).await {
                warn!(adw_id, "Could not remove worktree after failed init: {}", cleanup);
            }
            return Err(e.into());
        }
        info!(adw_id, %ports, branch = %branch_name, "Workflow allocated");

        let run = PhaseRun::begin(&manager, Phase::Plan)?;
        let result = self.plan(adw_id, issue).await;

        if let Ok((_, plan_file, plan_json)) = &result {
            let state = manager.state_mut()?;
            state.plan_file = Some(plan_file.clone());
            state.plan_json = Some(plan_json.clone());
        }

        let (plan, plan_file, plan_json) = run.finish(&mut manager, result)?;

        Ok(PlanningOutcome {
            adw_id: adw_id.to_string(),
            ports,
            worktree_path,
            branch_name,
            plan_file,
            plan_json,
            plan,
        })
    }

    async fn plan(
        &self,
        adw_id: &str,
        issue: &Issue,
    ) -> Result<(TrinityPlan, PathBuf, PathBuf), TrinityError> {
        let plan = self
            .protocol
            .execute(adw_id, issue, self.repo_context.as_deref())
            .await?;
        let (plan_file, plan_json) = save_plan(&plan, &self.specs_dir)?;
        Ok((plan, plan_file, plan_json))
    }
}
