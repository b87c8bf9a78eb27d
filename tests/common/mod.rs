// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Scripted provider clients shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use adw::error::ProviderError;
use adw::providers::TrinityClients;
use adw::types::{LlmResponse, ProviderClient};

/// Tokens reported by every scripted success.
pub const TOKENS_PER_CALL: u32 = 10;

pub const PLAN_JSON: &str = r#"{
    "summary": "Add a CSV export endpoint",
    "approach": "Stream rows through a writer",
    "files_to_modify": ["src/api.rs"],
    "files_to_create": ["src/export.rs"],
    "test_strategy": "Integration tests against a seeded database",
    "risks": ["Large exports exhaust memory; stream instead of buffering"],
    "estimated_complexity": "medium"
}"#;

pub enum Reply {
    Text(String),
    Status(u16),
    Auth,
}

/// A prompt the client received.
#[derive(Debug, Clone)]
pub struct Call {
    pub prompt: String,
    pub system: Option<String>,
}

pub struct FakeClient {
    provider: &'static str,
    model: &'static str,
    replies: Mutex<VecDeque<Reply>>,
    delay: Duration,
    calls: AtomicU32,
    log: Mutex<Vec<Call>>,
}

impl FakeClient {
    pub fn new(provider: &'static str, model: &'static str) -> Self {
        Self {
            provider,
            model,
            replies: Mutex::new(VecDeque::new()),
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(self, text: impl Into<String>) -> Self {
        self.replies.lock().unwrap().push_back(Reply::Text(text.into()));
        self
    }

    pub fn fail(self, status: u16) -> Self {
        self.replies.lock().unwrap().push_back(Reply::Status(status));
        self
    }

    pub fn fail_auth(self) -> Self {
        self.replies.lock().unwrap().push_back(Reply::Auth);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> Vec<Call> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderClient for FakeClient {
    async fn complete(
        &self,
        prompt: &str,
        system: Option<&str>,
        _max_tokens: u32,
        _timeout: Duration,
    ) -> Result<LlmResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(Call {
            prompt: prompt.to_string(),
            system: system.map(str::to_string),
        });
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Text(text)) => Ok(LlmResponse::new(text, self.model, self.provider)
                .with_usage(TOKENS_PER_CALL, 5.0)),
            Some(Reply::Status(status)) => Err(ProviderError::api(
                format!("scripted HTTP {status}"),
                status,
            )),
            Some(Reply::Auth) => Err(ProviderError::AuthError("bad key".to_string())),
            None => Err(ProviderError::api_message("no scripted reply left")),
        }
    }

    fn provider(&self) -> &str {
        self.provider
    }

    fn model(&self) -> String {
        self.model.to_string()
    }
}

/// Three fakes plus the `TrinityClients` bundle pointing at them.
pub struct Trio {
    pub architect: Arc<FakeClient>,
    pub critic: Arc<FakeClient>,
    pub advocate: Arc<FakeClient>,
}

impl Trio {
    pub fn new(architect: FakeClient, critic: FakeClient, advocate: FakeClient) -> Self {
        Self {
            architect: Arc::new(architect),
            critic: Arc::new(critic),
            advocate: Arc::new(advocate),
        }
    }

    pub fn clients(&self) -> TrinityClients {
        TrinityClients::new(
            self.architect.clone(),
            self.critic.clone(),
            self.advocate.clone(),
        )
    }
}

pub fn architect() -> FakeClient {
    FakeClient::new("anthropic", "claude-opus-4-5-20251101")
}

pub fn critic() -> FakeClient {
    FakeClient::new("openai", "gpt-4o")
}

pub fn advocate() -> FakeClient {
    FakeClient::new("gemini", "gemini-2.0-flash-exp")
}
