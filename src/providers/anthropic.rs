// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Anthropic Claude client (the Architect).
//!
//! Single-shot, non-streaming calls against the Messages API.
//!
//! # API Reference
//!
//! See [Anthropic Messages API](https://docs.anthropic.com/en/api/messages) for details.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use crate::error::ProviderError;
use crate::types::{LlmResponse, ProviderClient, ProviderConfig};

/// Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Default architect model.
pub const DEFAULT_MODEL: &str = "claude-opus-4-5-20251101";

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Provider identifier.
pub const PROVIDER: &str = "anthropic";

/// Claude client implementing [`ProviderClient`].
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicClient {
    /// Create a client from explicit configuration.
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let api_key = config.require_api_key("Anthropic")?;
        Ok(Self {
            client: Client::new(),
            api_key,
            model: config.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }

    fn build_request(&self, prompt: &str, system: Option<&str>, max_tokens: u32) -> AnthropicRequest {
        AnthropicRequest {
            model: self.model.clone(),
            max_tokens,
            system: system.map(String::from),
            messages: vec![ApiMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        }
    }

    async fn send(&self, request: &AnthropicRequest) -> Result<ApiResponse, ProviderError> {
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(handle_error_response(status.as_u16(), &error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl ProviderClient for AnthropicClient {
    async fn complete(
        &self,
        prompt: &str,
        system: Option<&str>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<LlmResponse, ProviderError> {
        let request = self.build_request(prompt, system, max_tokens);
        let start = Instant::now();

        debug!(model = %self.model, max_tokens, "Sending Anthropic request");

        let result = tokio::time::timeout(timeout, self.send(&request)).await;

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("anthropic.complete", start.elapsed());

        let api_response = match result {
            Ok(inner) => inner?,
            Err(_) => return Err(ProviderError::Timeout(timeout.as_millis() as u64)),
        };

        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        let tokens = api_response.usage.input_tokens + api_response.usage.output_tokens;

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_tokens(
            PROVIDER,
            api_response.usage.input_tokens as u64,
            api_response.usage.output_tokens as u64,
        );

        Ok(LlmResponse::new(api_response.text(), &self.model, PROVIDER).with_usage(tokens, latency_ms))
    }

    fn provider(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> String {
        self.model.clone()
    }
}

/// Map an error response to a [`ProviderError`].
fn handle_error_response(status_code: u16, body: &str) -> ProviderError {
    if let Ok(error) = serde_json::from_str::<ApiError>(body) {
        let message = error.error.message;
        match error.error.error_type.as_str() {
            "authentication_error" | "permission_error" => ProviderError::AuthError(message),
            "rate_limit_error" => ProviderError::RateLimited(message),
            "not_found_error" => ProviderError::ModelNotFound(message),
            "invalid_request_error" if message.contains("model") => ProviderError::ModelNotFound(message),
            other => ProviderError::api_with_code(message, status_code, other),
        }
    } else {
        ProviderError::api(body.to_string(), status_code)
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    content: Vec<ApiContentBlock>,
    #[serde(default)]
    usage: ApiUsage,
}

impl ApiResponse {
    /// Concatenated text of all text blocks.
    fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| b.text.as_deref())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct ApiContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = AnthropicClient::new(&ProviderConfig::new("test-key", "claude-sonnet-4-20250514")).unwrap();
        assert_eq!(client.provider(), "anthropic");
        assert_eq!(client.model(), "claude-sonnet-4-20250514");
    }

    #[test]
    fn test_default_model_and_missing_key() {
        let config = ProviderConfig {
            api_key: Some("k".into()),
            ..Default::default()
        };
        assert_eq!(AnthropicClient::new(&config).unwrap().model(), DEFAULT_MODEL);
        assert!(matches!(
            AnthropicClient::new(&ProviderConfig::default()),
            Err(ProviderError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_request_serialization() {
        let client = AnthropicClient::new(&ProviderConfig::new("k", "claude-x")).unwrap();
        let request = client.build_request("Plan it", Some("You are an architect"), 2048);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "claude-x");
        assert_eq!(json["max_tokens"], 2048);
        assert_eq!(json["system"], "You are an architect");
        assert_eq!(json["messages"][0]["role"], "user");

        let request = client.build_request("Plan it", None, 10);
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("system").is_none());
    }

    #[test]
    fn test_response_text_and_usage() {
        let body = r#"{
            "content": [{"type": "text", "text": "Hello"}, {"type": "text", "text": " world"}],
            "usage": {"input_tokens": 10, "output_tokens": 5}
        }"#;
        let response: ApiResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.text(), "Hello world");
        assert_eq!(response.usage.input_tokens + response.usage.output_tokens, 15);
    }

    #[test]
    fn test_error_mapping() {
        let auth = r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#;
        assert!(matches!(handle_error_response(401, auth), ProviderError::AuthError(_)));

        let overloaded = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        let err = handle_error_response(529, overloaded);
        assert_eq!(err.status_code(), Some(529));
        assert!(matches!(err, ProviderError::ApiError { code: Some(ref c), .. } if c == "overloaded_error"));

        let err = handle_error_response(502, "<html>bad gateway</html>");
        assert_eq!(err.status_code(), Some(502));
    }
}
