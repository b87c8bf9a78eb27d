// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for the ADW orchestrator.
//!
//! Each subsystem gets its own strongly-typed error built with `thiserror`.
//! Glue code (the CLI, phase runners) propagates with `anyhow`.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("API error: {message}")]
    ApiError {
        message: String,
        status_code: Option<u16>,
        code: Option<String>,
    },

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Response parsing error: {0}")]
    ParseError(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Gave up after {attempts} attempt(s): {message}")]
    RetriesExhausted { attempts: u32, message: String },
}

impl ProviderError {
    /// Create an API error with status code.
    pub fn api(message: impl Into<String>, status_code: u16) -> Self {
        Self::ApiError {
            message: message.into(),
            status_code: Some(status_code),
            code: None,
        }
    }

    /// Create an API error carrying the provider's structured error code.
    pub fn api_with_code(message: impl Into<String>, status_code: u16, code: impl Into<String>) -> Self {
        Self::ApiError {
            message: message.into(),
            status_code: Some(status_code),
            code: Some(code.into()),
        }
    }

    /// Create an API error without status code.
    pub fn api_message(message: impl Into<String>) -> Self {
        Self::ApiError {
            message: message.into(),
            status_code: None,
            code: None,
        }
    }

    /// HTTP status attached to this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ApiError { status_code, .. } => *status_code,
            Self::RateLimited(_) => Some(429),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::NetworkError(_) | Self::Timeout(_)
        )
    }

    /// Check if this is a rate limit error.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

/// Errors raised by the workflow state store.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("State already exists for {adw_id} at {path}; load it instead")]
    AlreadyExists { adw_id: String, path: PathBuf },

    #[error("No state found for {adw_id} at {path}")]
    NotFound { adw_id: String, path: PathBuf },

    #[error("State not initialized; call initialize() or load() first")]
    NotInitialized,

    #[error("Invalid workflow id: {0:?}")]
    InvalidId(String),

    #[error("Unknown state field: {0}")]
    UnknownField(String),

    #[error("Field {0} cannot change once set")]
    ImmutableField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("State validation failed: {0}")]
    Validation(String),

    #[error("Phase {0:?} never completed successfully")]
    PhaseNeverSucceeded(String),

    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(PathBuf),

    #[error("Corrupted state file {path}: {message}")]
    Corrupted { path: PathBuf, message: String },

    #[error("Failed to lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while managing git worktrees.
#[derive(Error, Debug)]
pub enum WorktreeError {
    #[error("Worktree path already exists: {0}")]
    PathExists(PathBuf),

    #[error("Branch already exists: {0}")]
    BranchExists(String),

    #[error("Invalid workflow id: {0:?}")]
    InvalidId(String),

    #[error("Git error: {0}")]
    Git(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("State error: {0}")]
    State(#[from] StateError),
}

/// Errors raised by the Trinity protocol.
#[derive(Error, Debug)]
pub enum TrinityError {
    #[error("Convergence call failed: {0}")]
    Convergence(#[source] ProviderError),

    #[error("Synthesizer returned invalid JSON: {message}\nResponse: {excerpt}")]
    InvalidJson { message: String, excerpt: String },

    #[error("Synthesized plan is invalid: {0}")]
    InvalidPlan(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by phase entry points.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("[{adw_id}] {phase}: prerequisites not met, missing {missing:?}")]
    PrerequisitesNotMet {
        adw_id: String,
        phase: String,
        missing: Vec<String>,
    },

    #[error("[{adw_id}] {phase} failed: {message}")]
    PhaseFailed {
        adw_id: String,
        phase: String,
        message: String,
    },

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Worktree(#[from] WorktreeError),

    #[error(transparent)]
    Trinity(#[from] TrinityError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Config file already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_retryable() {
        assert!(ProviderError::RateLimited("wait 1s".to_string()).is_retryable());
        assert!(ProviderError::NetworkError("reset".to_string()).is_retryable());
        assert!(ProviderError::Timeout(30000).is_retryable());
        assert!(!ProviderError::AuthError("invalid key".to_string()).is_retryable());
        assert!(!ProviderError::ModelNotFound("gpt-5".to_string()).is_retryable());
        assert!(!ProviderError::ParseError("bad".to_string()).is_retryable());
    }

    #[test]
    fn test_provider_error_api() {
        let err = ProviderError::api("Bad gateway", 502);
        assert_eq!(err.status_code(), Some(502));
        match err {
            ProviderError::ApiError { message, code, .. } => {
                assert_eq!(message, "Bad gateway");
                assert!(code.is_none());
            }
            _ => panic!("Expected ApiError"),
        }
    }

    #[test]
    fn test_status_code_for_rate_limit() {
        assert_eq!(ProviderError::RateLimited("slow down".into()).status_code(), Some(429));
        assert_eq!(ProviderError::Timeout(10).status_code(), None);
    }

    #[test]
    fn test_config_error_from_json() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("invalid json");
        let config_err: ConfigError = result.unwrap_err().into();
        assert!(matches!(config_err, ConfigError::JsonError(_)));
    }

    #[test]
    fn test_workflow_error_display_has_context() {
        let err = WorkflowError::PrerequisitesNotMet {
            adw_id: "a1b2c3d4".to_string(),
            phase: "build".to_string(),
            missing: vec!["plan".to_string()],
        };
        let display = err.to_string();
        assert!(display.contains("a1b2c3d4"));
        assert!(display.contains("build"));
        assert!(display.contains("plan"));
    }

    #[test]
    fn test_state_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let err: StateError = io_err.into();
        assert!(matches!(err, StateError::Io(_)));
    }
}
