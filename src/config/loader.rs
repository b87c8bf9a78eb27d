// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Locating and reading configuration files.
//!
//! JSON and YAML are both accepted; the extension decides the parser.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ConfigError;

use super::types::{RetryConfig, TrinityConfig, WorkspaceConfig};

/// Workspace config file names, in lookup order.
pub const CONFIG_FILES: &[&str] = &[
    ".adw.json",
    ".adw.yaml",
    ".adw/config.json",
    ".adw/config.yaml",
    "adw.config.json",
];

/// Per-checkout overrides, meant to be gitignored.
pub const LOCAL_CONFIG_FILE: &str = ".adw.local.json";

/// Directory under the home directory holding the global config.
pub const GLOBAL_CONFIG_DIR: &str = ".adw";

pub const GLOBAL_CONFIG_FILE: &str = "config.json";

/// One source of configuration, lowest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayer {
    Global,
    Workspace,
    Local,
}

impl ConfigLayer {
    pub const ALL: [ConfigLayer; 3] = [ConfigLayer::Global, ConfigLayer::Workspace, ConfigLayer::Local];

    /// The existing file backing this layer, if any.
    pub fn locate(self, workspace_root: &Path) -> Option<PathBuf> {
        match self {
            ConfigLayer::Global => global_config_path().filter(|p| p.is_file()),
            ConfigLayer::Workspace => CONFIG_FILES
                .iter()
                .map(|name| workspace_root.join(name))
                .find(|p| p.is_file()),
            ConfigLayer::Local => Some(workspace_root.join(LOCAL_CONFIG_FILE)).filter(|p| p.is_file()),
        }
    }

    /// Read this layer. A missing file is `Ok(None)`; a broken one is an error.
    pub fn load(self, workspace_root: &Path) -> Result<Option<WorkspaceConfig>, ConfigError> {
        let Some(path) = self.locate(workspace_root) else {
            return Ok(None);
        };
        debug!(layer = %self, path = %path.display(), "Loading config");
        read_config_file(&path).map(Some)
    }
}

impl fmt::Display for ConfigLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConfigLayer::Global => "global",
            ConfigLayer::Workspace => "workspace",
            ConfigLayer::Local => "local",
        })
    }
}

/// `~/.adw/config.json`, or `None` without a home directory.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(GLOBAL_CONFIG_DIR).join(GLOBAL_CONFIG_FILE))
}

pub fn read_config_file(path: &Path) -> Result<WorkspaceConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));

    if is_yaml {
        Ok(serde_yaml::from_str(&content)?)
    } else {
        Ok(serde_json::from_str(&content)?)
    }
}

/// Write a starter `.adw.json` into the workspace root.
///
/// Refuses to replace a workspace config that is already there.
pub fn init_config(
    workspace_root: &Path,
    config: Option<WorkspaceConfig>,
) -> Result<PathBuf, ConfigError> {
    if let Some(existing) = ConfigLayer::Workspace.locate(workspace_root) {
        return Err(ConfigError::AlreadyExists(existing.display().to_string()));
    }

    let path = workspace_root.join(CONFIG_FILES[0]);
    let config = config.unwrap_or_else(example_config);
    std::fs::write(&path, serde_json::to_string_pretty(&config)?)?;
    Ok(path)
}

/// Nearest ancestor of `start` (inclusive) holding a workspace config or `.git`.
pub fn find_workspace_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists() || CONFIG_FILES.iter().any(|f| dir.join(f).is_file()))
        .map(Path::to_path_buf)
}

/// The config `adw init` writes: defaults spelled out so they are easy to edit.
pub fn example_config() -> WorkspaceConfig {
    WorkspaceConfig {
        agents_dir: Some("agents".to_string()),
        specs_dir: Some("specs".to_string()),
        trees_dir: Some("trees".to_string()),
        worktree_max_age_hours: Some(72.0),
        trinity: Some(TrinityConfig {
            critic_fallback_models: Some(vec!["gpt-4o-mini".to_string(), "gpt-4-turbo".to_string()]),
            max_tokens: Some(2048),
            timeout_secs: Some(60),
            ..Default::default()
        }),
        retry: Some(RetryConfig {
            max_retries: Some(1),
            retryable_status_codes: Some(vec![502, 503, 504]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_workspace_lookup_order() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("adw.config.json"), "{}").unwrap();
        std::fs::write(temp.path().join(".adw.json"), "{}").unwrap();

        assert_eq!(
            ConfigLayer::Workspace.locate(temp.path()).unwrap(),
            temp.path().join(".adw.json")
        );
    }

    #[test]
    fn test_global_path() {
        let path = global_config_path().unwrap();
        assert!(path.ends_with(".adw/config.json"));
    }

    #[test]
    fn test_missing_layers_are_none() {
        let temp = TempDir::new().unwrap();
        assert!(ConfigLayer::Workspace.load(temp.path()).unwrap().is_none());
        assert!(ConfigLayer::Local.load(temp.path()).unwrap().is_none());
    }

    #[test]
    fn test_load_workspace_json() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(".adw.json"),
            r#"{"agentsDir": "state", "trinity": {"architectModel": "claude-x"}}"#,
        )
        .unwrap();

        let config = ConfigLayer::Workspace.load(temp.path()).unwrap().unwrap();
        assert_eq!(config.agents_dir.as_deref(), Some("state"));
        assert_eq!(config.trinity.unwrap().architect_model.as_deref(), Some("claude-x"));
    }

    #[test]
    fn test_load_workspace_yaml() {
        let temp = TempDir::new().unwrap();
        let config_dir = temp.path().join(".adw");
        std::fs::create_dir(&config_dir).unwrap();
        std::fs::write(
            config_dir.join("config.yaml"),
            "treesDir: worktrees\nretry:\n  maxRetries: 2\n",
        )
        .unwrap();

        let config = ConfigLayer::Workspace.load(temp.path()).unwrap().unwrap();
        assert_eq!(config.trees_dir.as_deref(), Some("worktrees"));
        assert_eq!(config.retry.unwrap().max_retries, Some(2));
    }

    #[test]
    fn test_broken_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(LOCAL_CONFIG_FILE), "{not json").unwrap();
        assert!(matches!(
            ConfigLayer::Local.load(temp.path()),
            Err(ConfigError::JsonError(_))
        ));
    }

    #[test]
    fn test_find_workspace_root() {
        let temp = TempDir::new().unwrap();
        let subdir = temp.path().join("a").join("b").join("c");
        std::fs::create_dir_all(&subdir).unwrap();
        std::fs::create_dir(temp.path().join(".git")).unwrap();

        assert_eq!(find_workspace_root(&subdir).unwrap(), temp.path());
    }

    #[test]
    fn test_init_config_writes_example_once() {
        let temp = TempDir::new().unwrap();
        let path = init_config(temp.path(), None).unwrap();
        assert_eq!(path.file_name().unwrap(), ".adw.json");

        let loaded = read_config_file(&path).unwrap();
        assert_eq!(loaded.worktree_max_age_hours, Some(72.0));
        assert!(loaded.trinity.is_some());

        assert!(matches!(
            init_config(temp.path(), None),
            Err(ConfigError::AlreadyExists(_))
        ));
    }
}
