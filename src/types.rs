// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Core provider-facing types.
//!
//! Every LLM backend sits behind [`ProviderClient`]: one prompt in, one
//! [`LlmResponse`] out. Credentials and defaults travel in an explicit
//! [`ProviderConfig`]; nothing here reads the environment.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

// ============================================================================
// Responses
// ============================================================================

/// A single completion returned by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Generated text.
    pub content: String,
    /// Model that actually served the request.
    pub model: String,
    /// Provider identifier (`anthropic`, `openai`, `gemini`, ...).
    pub provider: String,
    /// Total tokens billed for the call.
    pub tokens_used: u32,
    /// Wall-clock latency in milliseconds.
    pub latency_ms: f64,
}

impl LlmResponse {
    /// Create a response with zero usage metrics.
    pub fn new(
        content: impl Into<String>,
        model: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
            provider: provider.into(),
            tokens_used: 0,
            latency_ms: 0.0,
        }
    }

    /// Attach usage metrics.
    pub fn with_usage(mut self, tokens_used: u32, latency_ms: f64) -> Self {
        self.tokens_used = tokens_used;
        self.latency_ms = latency_ms;
        self
    }
}

// ============================================================================
// Provider capability
// ============================================================================

/// Uniform async completion interface over an LLM backend.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Run one completion.
    ///
    /// `timeout` bounds how long the caller waits; it does not cancel work
    /// the provider has already started.
    async fn complete(
        &self,
        prompt: &str,
        system: Option<&str>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<LlmResponse, ProviderError>;

    /// Provider identifier.
    fn provider(&self) -> &str;

    /// Model this client will use for its next call.
    fn model(&self) -> String;
}

/// Type alias for a shared, dynamically-dispatched client.
pub type SharedClient = Arc<dyn ProviderClient>;

// ============================================================================
// Configuration
// ============================================================================

/// Explicit configuration handed to a provider constructor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// API key for authentication
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Base URL for the API endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Model identifier to use
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Models to fall back to, in order, when the configured one is unavailable
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback_models: Vec<String>,

    /// Request timeout in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl ProviderConfig {
    /// Create a new provider config with API key and model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            model: Some(model.into()),
            ..Default::default()
        }
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the fallback model chain.
    pub fn with_fallback_models(mut self, models: Vec<String>) -> Self {
        self.fallback_models = models;
        self
    }

    /// Set the request timeout.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Return the API key or a `NotConfigured` error naming the provider.
    pub fn require_api_key(&self, provider: &str) -> Result<String, ProviderError> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ProviderError::NotConfigured(format!("API key required for {provider}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_response_builder() {
        let response = LlmResponse::new("hi", "gpt-4o", "openai").with_usage(12, 3.5);
        assert_eq!(response.tokens_used, 12);
        assert_eq!(response.latency_ms, 3.5);
        assert_eq!(response.provider, "openai");
    }

    #[test]
    fn test_provider_config_builder() {
        let config = ProviderConfig::new("key", "claude-opus-4-5-20251101")
            .with_base_url("http://localhost:8080")
            .with_timeout_ms(5_000);

        assert_eq!(config.model.as_deref(), Some("claude-opus-4-5-20251101"));
        assert_eq!(config.base_url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(config.timeout_ms, Some(5_000));
    }

    #[test]
    fn test_require_api_key() {
        assert!(ProviderConfig::default().require_api_key("anthropic").is_err());
        assert!(ProviderConfig::new("  ", "m").require_api_key("anthropic").is_err());
        assert_eq!(
            ProviderConfig::new("sk-1", "m").require_api_key("anthropic").unwrap(),
            "sk-1"
        );
    }

    #[test]
    fn test_api_key_never_serialized() {
        let config = ProviderConfig::new("secret", "gpt-4o");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
