// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration module for ADW.
//!
//! Handles loading, merging, and validation of configuration from multiple sources:
//! - Global config: ~/.adw/config.json
//! - Workspace config: .adw.json, .adw/config.json, or adw.config.json
//! - Local config: .adw.local.json (gitignored, for personal overrides)
//! - CLI options and environment: command-line arguments, API keys
//!
//! Configuration is merged with precedence (CLI > local > workspace > global > defaults).

mod loader;
mod merger;
mod types;

pub use loader::{
    example_config, find_workspace_root, global_config_path, init_config, read_config_file,
    ConfigLayer, CONFIG_FILES, GLOBAL_CONFIG_DIR, GLOBAL_CONFIG_FILE, LOCAL_CONFIG_FILE,
};

pub use merger::{default_config, merge_config, CliOptions};

pub use types::{
    ResolvedConfig, ResolvedRetryConfig, ResolvedTrinityConfig, RetryConfig, TrinityConfig,
    WorkspaceConfig, DEFAULT_SPECS_DIR, DEFAULT_TRINITY_MAX_TOKENS, DEFAULT_TRINITY_TIMEOUT_SECS,
};

use crate::error::ConfigError;
use std::path::Path;

/// Load and merge all configuration sources for a repository.
///
/// This is the main entry point for configuration loading.
pub fn load_config(
    workspace_root: &Path,
    cli_options: CliOptions,
) -> Result<ResolvedConfig, ConfigError> {
    let global = ConfigLayer::Global.load(workspace_root)?;
    let workspace = ConfigLayer::Workspace.load(workspace_root)?;
    let local = ConfigLayer::Local.load(workspace_root)?;

    let config = merge_config(global, workspace, local, cli_options);
    validate(&config)?;
    Ok(config)
}

/// Reject settings that cannot work at runtime.
pub fn validate(config: &ResolvedConfig) -> Result<(), ConfigError> {
    if !(config.worktree_max_age_hours.is_finite() && config.worktree_max_age_hours >= 0.0) {
        return Err(ConfigError::InvalidValue {
            field: "worktreeMaxAgeHours".to_string(),
            message: format!("must be a non-negative number, got {}", config.worktree_max_age_hours),
        });
    }
    if config.trinity.max_tokens == 0 {
        return Err(ConfigError::InvalidValue {
            field: "trinity.maxTokens".to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    if config.trinity.timeout_secs == 0 || config.retry.timeout_secs == 0 {
        return Err(ConfigError::InvalidValue {
            field: "timeoutSecs".to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}
