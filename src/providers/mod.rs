// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! LLM provider clients.
//!
//! This module provides implementations of the [`ProviderClient`] trait for
//! the three Trinity backends:
//!
//! - [`anthropic::AnthropicClient`] - Claude, the Architect
//! - [`openai::OpenAiClient`] - GPT with a model fallback chain, the Critic
//! - [`gemini::GeminiClient`] - Gemini, the Advocate
//!
//! [`resilient::ResilientClient`] wraps any of them with timeout and retry.
//!
//! # Example
//!
//! ```rust,ignore
//! use adw::config::{load_config, CliOptions};
//! use adw::providers::create_trinity_clients;
//!
//! let config = load_config(repo_root, cli_options)?;
//! let clients = create_trinity_clients(&config)?;
//! let response = clients.critic.complete("Review this", None, 2048, timeout).await?;
//! ```

pub mod anthropic;
pub mod gemini;
pub mod openai;
pub mod resilient;

pub use anthropic::AnthropicClient;
pub use gemini::GeminiClient;
pub use openai::OpenAiClient;
pub use resilient::ResilientClient;

use std::sync::Arc;

use crate::config::ResolvedConfig;
use crate::error::ProviderError;
use crate::trinity::Role;
use crate::types::{ProviderConfig, SharedClient};

/// Supported provider kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Anthropic Claude models
    Anthropic,
    /// OpenAI GPT models
    OpenAi,
    /// Google Gemini models
    Gemini,
}

impl ProviderKind {
    /// Get the default model for this provider.
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Anthropic => anthropic::DEFAULT_MODEL,
            Self::OpenAi => openai::DEFAULT_MODEL,
            Self::Gemini => gemini::DEFAULT_MODEL,
        }
    }

    /// Get the default base URL for this provider.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Anthropic => anthropic::DEFAULT_BASE_URL,
            Self::OpenAi => openai::DEFAULT_BASE_URL,
            Self::Gemini => gemini::DEFAULT_BASE_URL,
        }
    }

    /// Environment variables consulted for the API key, in order.
    pub fn api_key_vars(&self) -> &'static [&'static str] {
        match self {
            Self::Anthropic => &["ANTHROPIC_API_KEY"],
            Self::OpenAi => &["OPENAI_API_KEY"],
            Self::Gemini => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        }
    }
}

/// Error type for parsing a provider kind from a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseProviderKindError;

impl std::fmt::Display for ParseProviderKindError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid provider kind")
    }
}

impl std::error::Error for ParseProviderKindError {}

impl std::str::FromStr for ProviderKind {
    type Err = ParseProviderKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "openai" | "gpt" => Ok(Self::OpenAi),
            "gemini" | "google" => Ok(Self::Gemini),
            _ => Err(ParseProviderKindError),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anthropic => write!(f, "anthropic"),
            Self::OpenAi => write!(f, "openai"),
            Self::Gemini => write!(f, "gemini"),
        }
    }
}

/// Create a client from kind and explicit configuration.
///
/// # Errors
///
/// Returns [`ProviderError::NotConfigured`] when the API key is missing.
pub fn create_client(kind: ProviderKind, config: &ProviderConfig) -> Result<SharedClient, ProviderError> {
    let client: SharedClient = match kind {
        ProviderKind::Anthropic => Arc::new(AnthropicClient::new(config)?),
        ProviderKind::OpenAi => Arc::new(OpenAiClient::new(config)?),
        ProviderKind::Gemini => Arc::new(GeminiClient::new(config)?),
    };
    Ok(client)
}

/// The three role-bound clients used by the Trinity protocol.
#[derive(Clone)]
pub struct TrinityClients {
    pub architect: SharedClient,
    pub critic: SharedClient,
    pub advocate: SharedClient,
}

impl TrinityClients {
    pub fn new(architect: SharedClient, critic: SharedClient, advocate: SharedClient) -> Self {
        Self {
            architect,
            critic,
            advocate,
        }
    }

    /// Client bound to `role`.
    pub fn get(&self, role: Role) -> &SharedClient {
        match role {
            Role::Architect => &self.architect,
            Role::Critic => &self.critic,
            Role::Advocate => &self.advocate,
        }
    }
}

/// Build the three Trinity clients from resolved configuration.
///
/// Each client is wrapped in a [`ResilientClient`] using the configured
/// retry policy, keyed by role name.
pub fn create_trinity_clients(config: &ResolvedConfig) -> Result<TrinityClients, ProviderError> {
    let trinity = &config.trinity;
    let wrap = |role: Role, client: SharedClient| -> SharedClient {
        Arc::new(ResilientClient::new(client, config.retry.policy(role.as_str())))
    };

    Ok(TrinityClients {
        architect: wrap(
            Role::Architect,
            create_client(ProviderKind::Anthropic, &trinity.architect_config())?,
        ),
        critic: wrap(
            Role::Critic,
            create_client(ProviderKind::OpenAi, &trinity.critic_config())?,
        ),
        advocate: wrap(
            Role::Advocate,
            create_client(ProviderKind::Gemini, &trinity.advocate_config())?,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_from_str() {
        assert_eq!("anthropic".parse::<ProviderKind>().unwrap(), ProviderKind::Anthropic);
        assert_eq!("Claude".parse::<ProviderKind>().unwrap(), ProviderKind::Anthropic);
        assert_eq!("GPT".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!("google".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
        assert!("mistral".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_provider_kind_display_round_trips() {
        for kind in [ProviderKind::Anthropic, ProviderKind::OpenAi, ProviderKind::Gemini] {
            assert_eq!(kind.to_string().parse::<ProviderKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_create_client_requires_key() {
        let result = create_client(ProviderKind::Gemini, &ProviderConfig::default());
        assert!(matches!(result, Err(ProviderError::NotConfigured(_))));
    }

    #[test]
    fn test_create_trinity_clients() {
        let mut config = ResolvedConfig::default();
        assert!(create_trinity_clients(&config).is_err());

        config.trinity.anthropic_api_key = Some("a".into());
        config.trinity.openai_api_key = Some("o".into());
        config.trinity.gemini_api_key = Some("g".into());
        config.trinity.critic_model = "gpt-4o-mini".into();

        let clients = create_trinity_clients(&config).unwrap();
        assert_eq!(clients.get(Role::Architect).provider(), "anthropic");
        assert_eq!(clients.get(Role::Critic).model(), "gpt-4o-mini");
        assert_eq!(clients.get(Role::Advocate).provider(), "gemini");
    }
}
