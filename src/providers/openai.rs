// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! OpenAI GPT client (the Critic).
//!
//! Uses the Chat Completions API with a model fallback chain: when a model
//! is reported missing the next one is tried, and the first model that
//! answers is cached for later calls.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use crate::error::ProviderError;
use crate::types::{LlmResponse, ProviderClient, ProviderConfig};

/// Default critic model.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Provider identifier.
pub const PROVIDER: &str = "openai";

/// Models tried after the configured one.
pub const FALLBACK_CHAIN: [&str; 4] = ["gpt-5.2", "gpt-4o", "gpt-4o-mini", "gpt-4-turbo"];

/// GPT client implementing [`ProviderClient`].
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    models: Vec<String>,
    cached_model: Mutex<Option<String>>,
}

impl OpenAiClient {
    /// Create a client from explicit configuration.
    ///
    /// The chain is the configured model followed by `fallback_models`
    /// (or [`FALLBACK_CHAIN`] when none are given), without duplicates.
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let api_key = config.require_api_key("OpenAI")?;
        let primary = config.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let fallbacks: Vec<String> = if config.fallback_models.is_empty() {
            FALLBACK_CHAIN.iter().map(|m| m.to_string()).collect()
        } else {
            config.fallback_models.clone()
        };

        let mut models = vec![primary];
        for model in fallbacks {
            if !models.contains(&model) {
                models.push(model);
            }
        }

        Ok(Self {
            client: Client::new(),
            api_key,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            models,
            cached_model: Mutex::new(None),
        })
    }

    /// Ordered model chain.
    pub fn models(&self) -> &[String] {
        &self.models
    }

    fn cached(&self) -> Option<String> {
        self.cached_model
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_cached(&self, model: Option<String>) {
        *self
            .cached_model
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = model;
    }

    fn build_request(&self, model: &str, prompt: &str, system: Option<&str>, max_tokens: u32) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        });

        ChatRequest {
            model: model.to_string(),
            max_completion_tokens: max_tokens,
            messages,
        }
    }

    async fn send(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
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

    /// Walk the chain until a model answers.
    async fn complete_with_fallback(
        &self,
        prompt: &str,
        system: Option<&str>,
        max_tokens: u32,
    ) -> Result<(String, ChatResponse), ProviderError> {
        let mut candidates: Vec<String> = match self.cached() {
            Some(model) => vec![model],
            None => self.models.clone(),
        };
        let mut from_cache = self.cached().is_some();
        let mut last_error: Option<ProviderError> = None;

        let mut index = 0;
        while index < candidates.len() {
            let model = candidates[index].clone();
            let request = self.build_request(&model, prompt, system, max_tokens);
            match self.send(&request).await {
                Ok(response) => {
                    self.set_cached(Some(model.clone()));
                    return Ok((model, response));
                }
                Err(ProviderError::ModelNotFound(message)) => {
                    warn!(model = %model, "OpenAI model unavailable, trying next in chain");
                    last_error = Some(ProviderError::ModelNotFound(message));
                    if from_cache {
                        self.set_cached(None);
                        candidates = self.models.clone();
                        from_cache = false;
                        index = 0;
                        continue;
                    }
                }
                Err(e) => return Err(e),
            }
            index += 1;
        }

        Err(ProviderError::ModelNotFound(format!(
            "All GPT models in fallback chain failed. Last error: {}",
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }
}

#[async_trait]
impl ProviderClient for OpenAiClient {
    async fn complete(
        &self,
        prompt: &str,
        system: Option<&str>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<LlmResponse, ProviderError> {
        let start = Instant::now();
        debug!(chain = ?self.models, max_tokens, "Sending OpenAI request");

        let result = tokio::time::timeout(timeout, self.complete_with_fallback(prompt, system, max_tokens)).await;

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("openai.complete", start.elapsed());

        let (model, response) = match result {
            Ok(inner) => inner?,
            Err(_) => return Err(ProviderError::Timeout(timeout.as_millis() as u64)),
        };

        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        let (prompt_tokens, completion_tokens) = response
            .usage
            .as_ref()
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_tokens(PROVIDER, prompt_tokens as u64, completion_tokens as u64);

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        Ok(LlmResponse::new(content, model, PROVIDER).with_usage(prompt_tokens + completion_tokens, latency_ms))
    }

    fn provider(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> String {
        self.cached().unwrap_or_else(|| self.models[0].clone())
    }
}

/// Map an error response to a [`ProviderError`].
fn handle_error_response(status_code: u16, body: &str) -> ProviderError {
    if let Ok(error) = serde_json::from_str::<ApiError>(body) {
        let message = error.error.message;
        let code = error.error.code.or(error.error.error_type);
        match code.as_deref() {
            Some("invalid_api_key") | Some("authentication_error") => ProviderError::AuthError(message),
            Some("rate_limit_exceeded") | Some("rate_limit_error") => ProviderError::RateLimited(message),
            Some("model_not_found") => ProviderError::ModelNotFound(message),
            _ if status_code == 404 => ProviderError::ModelNotFound(message),
            Some(code) => ProviderError::api_with_code(message, status_code, code),
            None => ProviderError::api(message, status_code),
        }
    } else if status_code == 404 {
        ProviderError::ModelNotFound(body.to_string())
    } else {
        ProviderError::api(body.to_string(), status_code)
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_completion_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(rename = "type", default)]
    error_type: Option<String>,
    #[serde(default)]
    code: Option<String>,
}
