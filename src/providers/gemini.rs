// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Google Gemini client (the Advocate).
//!
//! The generateContent endpoint has no separate system slot in the form
//! used here, so a system prompt is prepended to the user prompt.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use crate::error::ProviderError;
use crate::types::{LlmResponse, ProviderClient, ProviderConfig};

/// Default advocate model.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Provider identifier.
pub const PROVIDER: &str = "gemini";

/// Gemini client implementing [`ProviderClient`].
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    /// Create a client from explicit configuration.
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let api_key = config.require_api_key("Gemini")?;
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

    fn build_request(prompt: &str, system: Option<&str>, max_tokens: u32) -> GenerateRequest {
        let text = match system {
            Some(system) => format!("{system}\n\n{prompt}"),
            None => prompt.to_string(),
        };
        GenerateRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part { text: Some(text) }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: max_tokens,
            },
        }
    }

    async fn send(&self, request: &GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model
            ))
            .query(&[("key", self.api_key.as_str())])
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(handle_error_response(status.as_u16(), &error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.without_url().to_string()))
    }
}

#[async_trait]
impl ProviderClient for GeminiClient {
    async fn complete(
        &self,
        prompt: &str,
        system: Option<&str>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<LlmResponse, ProviderError> {
        let request = Self::build_request(prompt, system, max_tokens);
        let start = Instant::now();

        debug!(model = %self.model, max_tokens, "Sending Gemini request");

        let result = tokio::time::timeout(timeout, self.send(&request)).await;

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("gemini.complete", start.elapsed());

        let response = match result {
            Ok(inner) => inner?,
            Err(_) => return Err(ProviderError::Timeout(timeout.as_millis() as u64)),
        };

        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        let tokens = response.tokens_used();

        #[cfg(feature = "telemetry")]
        if let Some(usage) = &response.usage_metadata {
            GLOBAL_METRICS.record_tokens(
                PROVIDER,
                usage.prompt_token_count as u64,
                usage.candidates_token_count as u64,
            );
        }

        Ok(LlmResponse::new(response.text(), &self.model, PROVIDER).with_usage(tokens, latency_ms))
    }

    fn provider(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> String {
        self.model.clone()
    }
}

/// Map an error response to a [`ProviderError`].
///
/// Google errors carry a textual `status` such as `RESOURCE_EXHAUSTED`.
fn handle_error_response(status_code: u16, body: &str) -> ProviderError {
    if let Ok(error) = serde_json::from_str::<ApiError>(body) {
        let message = error.error.message;
        match error.error.status.as_deref() {
            Some("UNAUTHENTICATED") | Some("PERMISSION_DENIED") => ProviderError::AuthError(message),
            Some("NOT_FOUND") => ProviderError::ModelNotFound(message),
            Some(status) => ProviderError::api_with_code(message, status_code, status),
            None => ProviderError::api(message, status_code),
        }
    } else {
        ProviderError::api(body.to_string(), status_code)
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

impl GenerateResponse {
    /// Text of the first candidate's parts.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Total token count, falling back to prompt plus candidates.
    fn tokens_used(&self) -> u32 {
        match &self.usage_metadata {
            Some(usage) if usage.total_token_count > 0 => usage.total_token_count,
            Some(usage) => usage.prompt_token_count + usage.candidates_token_count,
            None => 0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(default)]
    status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_defaults() {
        let config = ProviderConfig {
            api_key: Some("g-key".into()),
            ..Default::default()
        };
        let client = GeminiClient::new(&config).unwrap();
        assert_eq!(client.provider(), "gemini");
        assert_eq!(client.model(), DEFAULT_MODEL);
    }

    #[test]
    fn test_system_prompt_is_prepended() {
        let request = GeminiClient::build_request("Advocate", Some("You are the user"), 512);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "You are the user\n\nAdvocate");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 512);
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{
            "candidates": [{"content": {"role": "model", "parts": [{"text": "Users "}, {"text": "first"}]}}],
            "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 6, "totalTokenCount": 11}
        }"#;
        let response: GenerateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.text(), "Users first");
        assert_eq!(response.tokens_used(), 11);

        let body = r#"{"candidates": [], "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 6}}"#;
        let response: GenerateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.text(), "");
        assert_eq!(response.tokens_used(), 10);
    }

    #[test]
    fn test_error_mapping() {
        let quota = r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        let err = handle_error_response(429, quota);
        assert!(matches!(err, ProviderError::ApiError { code: Some(ref c), .. } if c == "RESOURCE_EXHAUSTED"));

        let auth = r#"{"error":{"code":403,"message":"API key not valid","status":"PERMISSION_DENIED"}}"#;
        assert!(matches!(handle_error_response(403, auth), ProviderError::AuthError(_)));
    }
}
