// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Retry decorator for any [`ProviderClient`].

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::resilience::{run_with_resilience, AttemptError, RetryPolicy};
use crate::types::{LlmResponse, ProviderClient, SharedClient};

/// Wraps a client so each completion runs under a [`RetryPolicy`].
///
/// The caller's `timeout` bounds each attempt; the policy's own timeout is
/// only used as an upper limit.
pub struct ResilientClient {
    inner: SharedClient,
    policy: RetryPolicy,
}

impl ResilientClient {
    pub fn new(inner: SharedClient, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl ProviderClient for ResilientClient {
    async fn complete(
        &self,
        prompt: &str,
        system: Option<&str>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<LlmResponse, ProviderError> {
        let attempt_timeout = timeout.min(self.policy.timeout);
        let policy = self.policy.clone().with_timeout(attempt_timeout);
        let inner = &self.inner;

        let outcome = run_with_resilience(&policy, move || {
            inner.complete(prompt, system, max_tokens, attempt_timeout)
        })
        .await;

        let attempts = outcome.attempts;
        match outcome.result {
            Ok(response) => Ok(response),
            Err(failure) if attempts > 1 && policy.is_retryable(&failure) => {
                Err(ProviderError::RetriesExhausted {
                    attempts,
                    message: outcome.error.unwrap_or_default(),
                })
            }
            Err(AttemptError::Failed(e)) => Err(e),
            Err(AttemptError::TimedOut(limit)) => Err(ProviderError::Timeout(limit.as_millis() as u64)),
            Err(AttemptError::Panicked(message)) => Err(ProviderError::api_message(message)),
        }
    }

    fn provider(&self) -> &str {
        self.inner.provider()
    }

    fn model(&self) -> String {
        self.inner.model()
    }
}
