// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Git worktree lifecycle for workflow instances.
//!
//! # Directory Structure
//!
//! ```text
//! /project/                      # Main repo (repo_root)
//! ├── .git/
//! ├── trees/
//! │   └── a1b2c3d4/              # Worktree on feat/issue-42-a1b2c3d4
//! └── agents/
//!     └── a1b2c3d4/              # State directory (never deleted here)
//! ```

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, SystemTime};

use chrono::Utc;
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::error::{StateError, WorktreeError};
use crate::state::StateManager;

use super::ids::branch_name;

/// Default root for worktrees, relative to the repository.
pub const DEFAULT_TREES_DIR: &str = "trees";

/// Default age after which a worktree is considered stale.
pub const DEFAULT_MAX_AGE_HOURS: f64 = 72.0;

/// Cleanup reason written into the state of expired workflows.
pub const TTL_EXPIRED: &str = "ttl_expired";

/// A worktree as reported by `git worktree list --porcelain`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorktreeEntry {
    pub path: PathBuf,
    pub head: String,
    pub branch: Option<String>,
    pub is_detached: bool,
}

/// Summary of one workflow's worktree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorktreeInfo {
    pub adw_id: String,
    pub path: PathBuf,
    pub exists: bool,
    pub branch: Option<String>,
    pub commit: Option<String>,
}

/// Creates, inspects and removes per-workflow worktrees.
#[derive(Debug, Clone)]
pub struct WorktreeManager {
    repo_root: PathBuf,
    trees_dir: PathBuf,
    agents_dir: PathBuf,
}

impl WorktreeManager {
    /// Create a manager with `trees/` and `agents/` under the repo root.
    pub fn new(repo_root: impl AsRef<Path>) -> Self {
        let repo_root = repo_root.as_ref().to_path_buf();
        Self {
            trees_dir: repo_root.join(DEFAULT_TREES_DIR),
            agents_dir: repo_root.join(crate::state::DEFAULT_AGENTS_DIR),
            repo_root,
        }
    }

    /// Use a custom worktree root.
    pub fn with_trees_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.trees_dir = dir.into();
        self
    }

    /// Use a custom state root.
    pub fn with_agents_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.agents_dir = dir.into();
        self
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn trees_dir(&self) -> &Path {
        &self.trees_dir
    }

    pub fn agents_dir(&self) -> &Path {
        &self.agents_dir
    }

    /// Path a workflow's worktree lives at. Depends only on the id.
    pub fn worktree_path(&self, adw_id: &str) -> PathBuf {
        self.trees_dir.join(adw_id)
    }

    /// Run a git command in the main repo and return trimmed stdout.
    async fn git(&self, args: &[&str]) -> Result<String, WorktreeError> {
        git_in(&self.repo_root, args).await
    }

    async fn branch_exists(&self, branch: &str) -> bool {
        let reference = format!("refs/heads/{branch}");
        self.git(&["rev-parse", "--verify", "--quiet", &reference])
            .await
            .is_ok()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Create `trees/{id}` on a new branch `feat/issue-{n}-{id}`.
    ///
    /// Refuses to reuse an existing path or branch.
    #[instrument(skip(self), fields(repo = %self.repo_root.display()))]
    pub async fn create_worktree(
        &self,
        adw_id: &str,
        issue_number: u64,
    ) -> Result<(PathBuf, String), WorktreeError> {
        let path = self.worktree_path(adw_id);
        let branch = branch_name(issue_number, adw_id);

        if path.exists() {
            return Err(WorktreeError::PathExists(path));
        }
        if self.branch_exists(&branch).await {
            return Err(WorktreeError::BranchExists(branch));
        }

        std::fs::create_dir_all(&self.trees_dir)?;
        let path_str = path.to_string_lossy().to_string();
        self.git(&["worktree", "add", &path_str, "-b", &branch]).await?;

        info!(adw_id, branch = %branch, path = %path.display(), "Created worktree");
        Ok((path, branch))
    }

    /// Remove a workflow's worktree. Never fails because it is already gone.
    #[instrument(skip(self))]
    pub async fn remove_worktree(
        &self,
        adw_id: &str,
        delete_branch: bool,
    ) -> Result<(), WorktreeError> {
        let path = self.worktree_path(adw_id);

        let branch = if delete_branch && path.exists() {
            git_in(&path, &["branch", "--show-current"])
                .await
                .ok()
                .filter(|b| !b.is_empty())
        } else {
            None
        };

        let path_str = path.to_string_lossy().to_string();
        if let Err(e) = self.git(&["worktree", "remove", &path_str, "--force"]).await {
            debug!(adw_id, "git worktree remove failed: {}", e);
            if path.exists() {
                std::fs::remove_dir_all(&path)?;
            }
        }

        if let Err(e) = self.git(&["worktree", "prune"]).await {
            warn!("git worktree prune failed: {}", e);
        }

        if let Some(branch) = branch {
            if let Err(e) = self.git(&["branch", "-D", &branch]).await {
                warn!(adw_id, branch = %branch, "Failed to delete branch: {}", e);
            }
        }

        info!(adw_id, "Removed worktree");
        Ok(())
    }

    /// Worktrees git knows about that live under the trees directory.
    pub async fn list_active_worktrees(&self) -> Result<Vec<WorktreeEntry>, WorktreeError> {
        let output = self.git(&["worktree", "list", "--porcelain"]).await?;
        let trees = canonical(&self.trees_dir);
        Ok(parse_porcelain(&output)
            .into_iter()
            .filter(|wt| canonical(&wt.path).starts_with(&trees))
            .collect())
    }

    /// Path, branch and short commit of a workflow's worktree.
    pub async fn worktree_info(&self, adw_id: &str) -> WorktreeInfo {
        let path = self.worktree_path(adw_id);
        let exists = path.is_dir();
        let (branch, commit) = if exists {
            (
                git_in(&path, &["branch", "--show-current"]).await.ok(),
                git_in(&path, &["rev-parse", "--short", "HEAD"]).await.ok(),
            )
        } else {
            (None, None)
        };

        WorktreeInfo {
            adw_id: adw_id.to_string(),
            path,
            exists,
            branch,
            commit,
        }
    }

    /// Remove worktrees whose directory is older than `max_age_hours`.
    ///
    /// Each expired workflow's state is annotated, not deleted. Returns the
    /// ids that were cleaned up.
    #[instrument(skip(self))]
    pub async fn cleanup_old_worktrees(
        &self,
        max_age_hours: f64,
    ) -> Result<Vec<String>, WorktreeError> {
        if !self.trees_dir.is_dir() {
            return Ok(Vec::new());
        }

        let max_age = Duration::try_from_secs_f64(max_age_hours.max(0.0) * 3600.0)
            .unwrap_or(Duration::MAX);
        let now = SystemTime::now();
        let mut removed = Vec::new();

        for entry in std::fs::read_dir(&self.trees_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let adw_id = entry.file_name().to_string_lossy().to_string();
            let modified = entry.metadata()?.modified()?;
            let age = now.duration_since(modified).unwrap_or_default();
            if age < max_age {
                continue;
            }

            info!(adw_id = %adw_id, age_hours = age.as_secs_f64() / 3600.0, "Worktree expired");
            if let Err(e) = self.annotate_state(&adw_id, TTL_EXPIRED) {
                warn!(adw_id = %adw_id, "Could not annotate state: {}", e);
            }
            self.remove_worktree(&adw_id, true).await?;
            removed.push(adw_id);
        }

        Ok(removed)
    }

    /// Tear down a workflow's worktree and branch, optionally archiving its state.
    ///
    /// Archiving renames `agents/{id}` to `agents/{id}.archived` (with a
    /// timestamp suffix if that name is taken). Returns the archive path.
    pub async fn cleanup_worktree_and_state(
        &self,
        adw_id: &str,
        archive: bool,
    ) -> Result<Option<PathBuf>, WorktreeError> {
        self.remove_worktree(adw_id, true).await?;

        let state_dir = self.agents_dir.join(adw_id);
        if !archive || !state_dir.is_dir() {
            return Ok(None);
        }

        let mut target = self.agents_dir.join(format!("{adw_id}.archived"));
        if target.exists() {
            let stamp = Utc::now().format("%Y%m%dT%H%M%S");
            target = self.agents_dir.join(format!("{adw_id}.archived.{stamp}"));
        }
        std::fs::rename(&state_dir, &target)?;

        info!(adw_id, archive = %target.display(), "Archived workflow state");
        Ok(Some(target))
    }

    fn annotate_state(&self, adw_id: &str, reason: &str) -> Result<(), StateError> {
        let mut manager = StateManager::new(adw_id, &self.agents_dir)?;
        if !manager.exists() {
            return Ok(());
        }
        manager.transact(|state| {
            state.mark_cleanup(reason);
            Ok(())
        })
    }
}

/// Run git in `dir`, returning trimmed stdout or stderr as the error.
async fn git_in(dir: &Path, args: &[&str]) -> Result<String, WorktreeError> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(WorktreeError::Git(stderr.trim().to_string()))
    }
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Parse `git worktree list --porcelain` output.
fn parse_porcelain(output: &str) -> Vec<WorktreeEntry> {
    let mut worktrees = Vec::new();
    let mut current = WorktreeEntry::default();

    for line in output.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            if !current.path.as_os_str().is_empty() {
                worktrees.push(std::mem::take(&mut current));
            }
            current.path = PathBuf::from(path);
        } else if let Some(head) = line.strip_prefix("HEAD ") {
            current.head = head.to_string();
        } else if let Some(branch) = line.strip_prefix("branch refs/heads/") {
            current.branch = Some(branch.to_string());
        } else if line == "detached" {
            current.is_detached = true;
        }
    }

    if !current.path.as_os_str().is_empty() {
        worktrees.push(current);
    }

    worktrees
}
