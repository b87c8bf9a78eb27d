// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration merging.
//!
//! Handles merging configurations from different sources with proper precedence.

use std::path::PathBuf;

use super::types::{ResolvedConfig, WorkspaceConfig};

/// CLI options that can override configuration.
///
/// API keys and model overrides are usually filled from the environment
/// by clap's `env` attributes.
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    pub agents_dir: Option<PathBuf>,
    pub specs_dir: Option<PathBuf>,
    pub trees_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub architect_model: Option<String>,
    pub critic_model: Option<String>,
    pub advocate_model: Option<String>,
    pub max_retries: Option<u32>,
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
}

/// Default configuration values.
pub fn default_config() -> ResolvedConfig {
    ResolvedConfig::default()
}

/// Merge multiple configurations with precedence.
///
/// Precedence (highest to lowest):
/// 1. CLI options and environment
/// 2. Local config (.adw.local.json)
/// 3. Workspace config (.adw.json)
/// 4. Global config (~/.adw/config.json)
/// 5. Default values
pub fn merge_config(
    global: Option<WorkspaceConfig>,
    workspace: Option<WorkspaceConfig>,
    local: Option<WorkspaceConfig>,
    cli: CliOptions,
) -> ResolvedConfig {
    let mut result = default_config();

    for config in [global, workspace, local].into_iter().flatten() {
        apply_workspace_config(&mut result, &config);
    }

    apply_cli_options(&mut result, cli);

    result
}

fn apply_workspace_config(result: &mut ResolvedConfig, config: &WorkspaceConfig) {
    if let Some(ref dir) = config.agents_dir {
        result.agents_dir = PathBuf::from(dir);
    }

    if let Some(ref dir) = config.specs_dir {
        result.specs_dir = PathBuf::from(dir);
    }

    if let Some(ref dir) = config.trees_dir {
        result.trees_dir = PathBuf::from(dir);
    }

    if let Some(hours) = config.worktree_max_age_hours {
        result.worktree_max_age_hours = hours;
    }

    if config.repo_url.is_some() {
        result.repo_url = config.repo_url.clone();
    }

    if config.log_level.is_some() {
        result.log_level = config.log_level.clone();
    }

    if let Some(ref trinity) = config.trinity {
        let target = &mut result.trinity;
        if let Some(ref model) = trinity.architect_model {
            target.architect_model = model.clone();
        }
        if let Some(ref model) = trinity.critic_model {
            target.critic_model = model.clone();
        }
        if let Some(ref models) = trinity.critic_fallback_models {
            target.critic_fallback_models = models.clone();
        }
        if let Some(ref model) = trinity.advocate_model {
            target.advocate_model = model.clone();
        }
        if let Some(max_tokens) = trinity.max_tokens {
            target.max_tokens = max_tokens;
        }
        if let Some(timeout) = trinity.timeout_secs {
            target.timeout_secs = timeout;
        }
        if trinity.anthropic_base_url.is_some() {
            target.anthropic_base_url = trinity.anthropic_base_url.clone();
        }
        if trinity.openai_base_url.is_some() {
            target.openai_base_url = trinity.openai_base_url.clone();
        }
        if trinity.gemini_base_url.is_some() {
            target.gemini_base_url = trinity.gemini_base_url.clone();
        }
    }

    if let Some(ref retry) = config.retry {
        let target = &mut result.retry;
        if let Some(max_retries) = retry.max_retries {
            target.max_retries = max_retries;
        }
        if let Some(timeout) = retry.timeout_secs {
            target.timeout_secs = timeout;
        }
        if let Some(ref codes) = retry.retryable_status_codes {
            target.retryable_status_codes = codes.clone();
        }
        if let Some(base) = retry.backoff_base_ms {
            target.backoff_base_ms = base;
        }
    }
}

fn apply_cli_options(result: &mut ResolvedConfig, cli: CliOptions) {
    if let Some(dir) = cli.agents_dir {
        result.agents_dir = dir;
    }

    if let Some(dir) = cli.specs_dir {
        result.specs_dir = dir;
    }

    if let Some(dir) = cli.trees_dir {
        result.trees_dir = dir;
    }

    if cli.log_level.is_some() {
        result.log_level = cli.log_level;
    }

    if let Some(model) = cli.architect_model {
        result.trinity.architect_model = model;
    }

    if let Some(model) = cli.critic_model {
        result.trinity.critic_model = model;
    }

    if let Some(model) = cli.advocate_model {
        result.trinity.advocate_model = model;
    }

    if let Some(max_retries) = cli.max_retries {
        result.retry.max_retries = max_retries;
    }

    result.trinity.anthropic_api_key = cli.anthropic_api_key;
    result.trinity.openai_api_key = cli.openai_api_key;
    result.trinity.gemini_api_key = cli.gemini_api_key;
}
