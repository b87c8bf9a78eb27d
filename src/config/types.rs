// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration type definitions.
//!
//! Defines the structure of workspace and resolved configuration,
//! supporting JSON and YAML formats.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::{RetryPolicy, DEFAULT_MAX_RETRIES, DEFAULT_RETRYABLE_STATUS_CODES, DEFAULT_TIMEOUT_SECS};
use crate::state::DEFAULT_AGENTS_DIR;
use crate::types::ProviderConfig;
use crate::worktree::{DEFAULT_MAX_AGE_HOURS, DEFAULT_TREES_DIR};
use crate::providers::{anthropic, gemini, openai};

/// Default directory for rendered plans.
pub const DEFAULT_SPECS_DIR: &str = "specs";

/// Default token cap for each Trinity call.
pub const DEFAULT_TRINITY_MAX_TOKENS: u32 = 2048;

/// Default per-call Trinity timeout.
pub const DEFAULT_TRINITY_TIMEOUT_SECS: u64 = 60;

/// Workspace configuration for ADW.
/// Can be defined in .adw.json or .adw/config.json in the repository root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfig {
    /// Directory holding per-workflow state, relative to the repo root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agents_dir: Option<String>,

    /// Directory holding rendered plans
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specs_dir: Option<String>,

    /// Directory holding isolated worktrees
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trees_dir: Option<String>,

    /// Age after which worktrees are reclaimed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worktree_max_age_hours: Option<f64>,

    /// Remote URL recorded in new workflow state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,

    /// Default log filter (e.g. "info", "adw=debug")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Trinity provider settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trinity: Option<TrinityConfig>,

    /// Retry policy for provider calls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
}

/// Trinity settings as written in a config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrinityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub architect_model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub critic_model: Option<String>,

    /// Models the critic falls back to when its model is unavailable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critic_fallback_models: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub advocate_model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Per-call timeout in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub anthropic_base_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai_base_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gemini_base_url: Option<String>,
}

/// Retry settings as written in a config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,

    /// Per-attempt timeout in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable_status_codes: Option<Vec<u16>>,

    /// Delay before the first retry in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_base_ms: Option<u64>,
}

// ============================================================================
// Resolved configuration
// ============================================================================

/// Resolved configuration with all values set.
/// This is the merged result of global, workspace, local, and CLI configs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedConfig {
    pub agents_dir: PathBuf,
    pub specs_dir: PathBuf,
    pub trees_dir: PathBuf,
    pub worktree_max_age_hours: f64,
    pub repo_url: Option<String>,
    pub log_level: Option<String>,
    pub trinity: ResolvedTrinityConfig,
    pub retry: ResolvedRetryConfig,
}

/// Resolved Trinity settings, including credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedTrinityConfig {
    pub architect_model: String,
    pub critic_model: String,
    pub critic_fallback_models: Vec<String>,
    pub advocate_model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub anthropic_base_url: Option<String>,
    pub openai_base_url: Option<String>,
    pub gemini_base_url: Option<String>,

    /// Credentials only ever come from the command line or environment
    #[serde(skip)]
    pub anthropic_api_key: Option<String>,
    #[serde(skip)]
    pub openai_api_key: Option<String>,
    #[serde(skip)]
    pub gemini_api_key: Option<String>,
}

/// Resolved retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedRetryConfig {
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub retryable_status_codes: Vec<u16>,
    pub backoff_base_ms: u64,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            agents_dir: PathBuf::from(DEFAULT_AGENTS_DIR),
            specs_dir: PathBuf::from(DEFAULT_SPECS_DIR),
            trees_dir: PathBuf::from(DEFAULT_TREES_DIR),
            worktree_max_age_hours: DEFAULT_MAX_AGE_HOURS,
            repo_url: None,
            log_level: None,
            trinity: ResolvedTrinityConfig::default(),
            retry: ResolvedRetryConfig::default(),
        }
    }
}

impl Default for ResolvedTrinityConfig {
    fn default() -> Self {
        Self {
            architect_model: anthropic::DEFAULT_MODEL.to_string(),
            critic_model: openai::DEFAULT_MODEL.to_string(),
            critic_fallback_models: Vec::new(),
            advocate_model: gemini::DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_TRINITY_MAX_TOKENS,
            timeout_secs: DEFAULT_TRINITY_TIMEOUT_SECS,
            anthropic_base_url: None,
            openai_base_url: None,
            gemini_base_url: None,
            anthropic_api_key: None,
            openai_api_key: None,
            gemini_api_key: None,
        }
    }
}

impl Default for ResolvedRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS_CODES.to_vec(),
            backoff_base_ms: 1000,
        }
    }
}

impl ResolvedConfig {
    /// Resolve relative directories against `root`.
    pub fn rooted_at(mut self, root: &Path) -> Self {
        for dir in [&mut self.agents_dir, &mut self.specs_dir, &mut self.trees_dir] {
            if dir.is_relative() {
                *dir = root.join(&*dir);
            }
        }
        self
    }
}

impl ResolvedTrinityConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Provider config for the Architect (Anthropic).
    pub fn architect_config(&self) -> ProviderConfig {
        ProviderConfig {
            api_key: self.anthropic_api_key.clone(),
            base_url: self.anthropic_base_url.clone(),
            model: Some(self.architect_model.clone()),
            ..Default::default()
        }
    }

    /// Provider config for the Critic (OpenAI).
    pub fn critic_config(&self) -> ProviderConfig {
        ProviderConfig {
            api_key: self.openai_api_key.clone(),
            base_url: self.openai_base_url.clone(),
            model: Some(self.critic_model.clone()),
            fallback_models: self.critic_fallback_models.clone(),
            ..Default::default()
        }
    }

    /// Provider config for the Advocate (Gemini).
    pub fn advocate_config(&self) -> ProviderConfig {
        ProviderConfig {
            api_key: self.gemini_api_key.clone(),
            base_url: self.gemini_base_url.clone(),
            model: Some(self.advocate_model.clone()),
            ..Default::default()
        }
    }
}

impl ResolvedRetryConfig {
    /// Build the retry policy for one source.
    pub fn policy(&self, source_id: impl Into<String>) -> RetryPolicy {
        RetryPolicy::new(source_id)
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_max_retries(self.max_retries)
            .with_retryable_status_codes(self.retryable_status_codes.clone())
            .with_backoff_base(Duration::from_millis(self.backoff_base_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rooted_at_keeps_absolute_dirs() {
        let mut config = ResolvedConfig::default();
        config.trees_dir = PathBuf::from("/srv/trees");
        let config = config.rooted_at(Path::new("/repo"));
        assert_eq!(config.agents_dir, PathBuf::from("/repo/agents"));
        assert_eq!(config.specs_dir, PathBuf::from("/repo/specs"));
        assert_eq!(config.trees_dir, PathBuf::from("/srv/trees"));
    }

    #[test]
    fn test_workspace_config_camel_case() {
        let json = r#"{
            "agentsDir": "state",
            "worktreeMaxAgeHours": 24,
            "trinity": {"criticModel": "gpt-4o-mini", "criticFallbackModels": ["gpt-4-turbo"]},
            "retry": {"maxRetries": 3, "retryableStatusCodes": [503]}
        }"#;
        let config: WorkspaceConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.agents_dir.as_deref(), Some("state"));
        assert_eq!(config.worktree_max_age_hours, Some(24.0));
        let trinity = config.trinity.unwrap();
        assert_eq!(trinity.critic_model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(trinity.critic_fallback_models.unwrap(), vec!["gpt-4-turbo"]);
        assert_eq!(config.retry.unwrap().max_retries, Some(3));
    }

    #[test]
    fn test_resolved_defaults() {
        let config = ResolvedConfig::default();
        assert_eq!(config.agents_dir, PathBuf::from("agents"));
        assert_eq!(config.trees_dir, PathBuf::from("trees"));
        assert_eq!(config.worktree_max_age_hours, 72.0);
        assert_eq!(config.trinity.max_tokens, 2048);
        assert_eq!(config.trinity.timeout(), Duration::from_secs(60));
        assert_eq!(config.retry.retryable_status_codes, vec![502, 503, 504]);
    }

    #[test]
    fn test_retry_policy_from_config() {
        let retry = ResolvedRetryConfig {
            max_retries: 2,
            timeout_secs: 10,
            retryable_status_codes: vec![503],
            backoff_base_ms: 250,
        };
        let policy = retry.policy("critic");
        assert_eq!(policy.source_id, "critic");
        assert_eq!(policy.timeout, Duration::from_secs(10));
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
    }

    #[test]
    fn test_api_keys_not_serialized() {
        let mut config = ResolvedConfig::default();
        config.trinity.anthropic_api_key = Some("sk-ant-secret".into());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-ant-secret"));
        assert_eq!(config.trinity.architect_config().api_key.as_deref(), Some("sk-ant-secret"));
    }
}
