// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Timeout and retry wrapper for external calls.
//!
//! Each attempt is time-boxed. Only timeouts and HTTP failures whose status
//! is in the policy's retryable set are retried, with a `base * 2^attempt`
//! delay. Exhaustion produces a [`CallOutcome`] rather than an error so that
//! callers aggregating several independent calls can keep partial results.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;
use tracing::{error, info, warn};

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use crate::error::ProviderError;
use crate::state::write_atomic;

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 45;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 1;

/// Default retryable HTTP statuses.
pub const DEFAULT_RETRYABLE_STATUS_CODES: [u16; 3] = [502, 503, 504];

// ============================================================================
// Policy
// ============================================================================

/// Timeout and retry policy for one external source.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub source_id: String,
    pub dashboard_url: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retryable_status_codes: Vec<u16>,
    /// Delay before the first retry; doubles on each further retry.
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            source_id: "default".to_string(),
            dashboard_url: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS_CODES.to_vec(),
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retryable_status_codes(mut self, codes: Vec<u16>) -> Self {
        self.retryable_status_codes = codes;
        self
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn with_dashboard_url(mut self, url: impl Into<String>) -> Self {
        self.dashboard_url = Some(url.into());
        self
    }

    /// Delay before retry number `attempt + 1`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Whether `failure` is worth another attempt under this policy.
    pub fn is_retryable<F: FailureKind>(&self, failure: &F) -> bool {
        failure.is_timeout()
            || failure
                .http_status()
                .is_some_and(|status| self.retryable_status_codes.contains(&status))
    }
}

// ============================================================================
// Failure classification
// ============================================================================

/// How the wrapper classifies and describes an error.
pub trait FailureKind: fmt::Display + fmt::Debug {
    /// HTTP status behind the failure, if it came from an HTTP response.
    fn http_status(&self) -> Option<u16> {
        None
    }

    fn is_timeout(&self) -> bool {
        false
    }

    /// Human-readable message, preferring structured provider details.
    fn clean_message(&self) -> String {
        self.to_string()
    }
}

impl FailureKind for ProviderError {
    fn http_status(&self) -> Option<u16> {
        self.status_code()
    }

    fn is_timeout(&self) -> bool {
        matches!(self, ProviderError::Timeout(_))
    }

    fn clean_message(&self) -> String {
        match self {
            ProviderError::ApiError {
                message,
                code: Some(code),
                ..
            } => format!("{code}: {message}"),
            ProviderError::ApiError {
                message,
                status_code: Some(status),
                code: None,
            } => format!("HTTP {status}: {}", truncate_chars(message, 200)),
            other => other.to_string(),
        }
    }
}

impl FailureKind for anyhow::Error {
    fn http_status(&self) -> Option<u16> {
        self.downcast_ref::<ProviderError>()
            .and_then(ProviderError::status_code)
    }

    fn is_timeout(&self) -> bool {
        self.downcast_ref::<ProviderError>()
            .is_some_and(|e| e.is_timeout())
            || self.downcast_ref::<tokio::time::error::Elapsed>().is_some()
    }

    fn clean_message(&self) -> String {
        match self.downcast_ref::<ProviderError>() {
            Some(e) => e.clean_message(),
            None => self.to_string(),
        }
    }
}

/// Why a single attempt failed.
#[derive(Debug)]
pub enum AttemptError<E> {
    TimedOut(Duration),
    Failed(E),
    /// The task running the call panicked.
    Panicked(String),
}

impl<E: fmt::Display> fmt::Display for AttemptError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::TimedOut(limit) => write!(f, "Timed out after {:.1}s", limit.as_secs_f64()),
            AttemptError::Failed(e) => write!(f, "{e}"),
            AttemptError::Panicked(message) => write!(f, "Call panicked: {message}"),
        }
    }
}

impl<E: FailureKind> FailureKind for AttemptError<E> {
    fn http_status(&self) -> Option<u16> {
        match self {
            AttemptError::TimedOut(_) | AttemptError::Panicked(_) => None,
            AttemptError::Failed(e) => e.http_status(),
        }
    }

    fn is_timeout(&self) -> bool {
        match self {
            AttemptError::TimedOut(_) => true,
            AttemptError::Failed(e) => e.is_timeout(),
            AttemptError::Panicked(_) => false,
        }
    }

    fn clean_message(&self) -> String {
        match self {
            AttemptError::TimedOut(_) | AttemptError::Panicked(_) => self.to_string(),
            AttemptError::Failed(e) => e.clean_message(),
        }
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// Uniform result of a wrapped call, successful or not.
#[derive(Debug)]
pub struct CallOutcome<T, E> {
    pub source: String,
    pub dashboard_url: Option<String>,
    pub result: Result<T, AttemptError<E>>,
    /// Clean error message on failure.
    pub error: Option<String>,
    /// Debug rendering of the final error, plus a backtrace when enabled.
    pub traceback: Option<String>,
    pub attempts: u32,
    pub duration_ms: f64,
    pub completed_at: DateTime<Utc>,
}

impl<T, E> CallOutcome<T, E> {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn value(&self) -> Option<&T> {
        self.result.as_ref().ok()
    }
}

fn round_ms(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 10_000.0).round() / 10.0
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn trace_of<E: fmt::Debug>(err: &E) -> String {
    let backtrace = Backtrace::capture();
    match backtrace.status() {
        BacktraceStatus::Captured => format!("{err:?}\n\nstack backtrace:\n{backtrace}"),
        _ => format!("{err:?}"),
    }
}

// ============================================================================
// Runner
// ============================================================================

/// Run `factory` under `policy`, producing a fresh future per attempt.
pub async fn run_with_resilience<T, E, F, Fut>(policy: &RetryPolicy, mut factory: F) -> CallOutcome<T, E>
where
    E: FailureKind,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let start = Instant::now();
    let mut attempt: u32 = 0;

    let failure = loop {
        let failure = match tokio::time::timeout(policy.timeout, factory()).await {
            Ok(Ok(value)) => {
                #[cfg(feature = "telemetry")]
                GLOBAL_METRICS.record_call(&policy.source_id, start.elapsed(), attempt + 1, true);

                return CallOutcome {
                    source: policy.source_id.clone(),
                    dashboard_url: policy.dashboard_url.clone(),
                    result: Ok(value),
                    error: None,
                    traceback: None,
                    attempts: attempt + 1,
                    duration_ms: round_ms(start.elapsed()),
                    completed_at: Utc::now(),
                };
            }
            Ok(Err(e)) => AttemptError::Failed(e),
            Err(_) => AttemptError::TimedOut(policy.timeout),
        };

        if attempt < policy.max_retries && policy.is_retryable(&failure) {
            let delay = policy.backoff(attempt);
            warn!(
                source = %policy.source_id,
                attempt = attempt + 1,
                max_attempts = policy.max_retries + 1,
                delay_ms = delay.as_millis() as u64,
                "Call failed, retrying: {}",
                failure
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
            continue;
        }
        break failure;
    };

    let message = failure.clean_message();
    error!(source = %policy.source_id, attempts = attempt + 1, "Call permanently failed: {}", message);

    #[cfg(feature = "telemetry")]
    GLOBAL_METRICS.record_call(&policy.source_id, start.elapsed(), attempt + 1, false);

    CallOutcome {
        source: policy.source_id.clone(),
        dashboard_url: policy.dashboard_url.clone(),
        traceback: Some(trace_of(&failure)),
        error: Some(message),
        result: Err(failure),
        attempts: attempt + 1,
        duration_ms: round_ms(start.elapsed()),
        completed_at: Utc::now(),
    }
}

/// Run independent wrapped calls concurrently, returning outcomes in input order.
pub async fn run_all<T, E, F, Fut>(calls: Vec<(RetryPolicy, F)>) -> Vec<CallOutcome<T, E>>
where
    T: Send + 'static,
    E: FailureKind + Send + 'static,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    let start = Instant::now();
    let tasks: Vec<_> = calls
        .into_iter()
        .map(|(policy, factory)| {
            let source = policy.source_id.clone();
            let dashboard_url = policy.dashboard_url.clone();
            let handle = tokio::spawn(async move { run_with_resilience(&policy, factory).await });
            (source, dashboard_url, handle)
        })
        .collect();

    let mut outcomes = Vec::with_capacity(tasks.len());
    for (source, dashboard_url, handle) in tasks {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(source = %source, "Wrapped call task panicked: {}", e);
                let failure = AttemptError::Panicked(e.to_string());
                CallOutcome {
                    source,
                    dashboard_url,
                    error: Some(failure.to_string()),
                    traceback: Some(format!("{e:?}")),
                    result: Err(failure),
                    attempts: 1,
                    duration_ms: round_ms(start.elapsed()),
                    completed_at: Utc::now(),
                }
            }
        };
        outcomes.push(outcome);
    }
    outcomes
}

// ============================================================================
// Failure manifest
// ============================================================================

/// Write `{output_dir}/failures/{date}.json` listing every failed outcome.
///
/// Returns `None` without touching disk when nothing failed.
pub fn write_failure_manifest<T, E>(
    outcomes: &[CallOutcome<T, E>],
    date: NaiveDate,
    output_dir: &Path,
) -> std::io::Result<Option<PathBuf>> {
    let failures: Vec<serde_json::Value> = outcomes
        .iter()
        .filter(|o| !o.is_success())
        .map(|o| {
            json!({
                "source": o.source,
                "error": o.error,
                "traceback": o.traceback,
                "dashboard_url": o.dashboard_url,
                "timestamp": o.completed_at.to_rfc3339(),
                "attempts": o.attempts,
            })
        })
        .collect();

    if failures.is_empty() {
        return Ok(None);
    }

    let date_str = date.format("%Y-%m-%d").to_string();
    let dir = output_dir.join("failures");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{date_str}.json"));

    let manifest = json!({ "date": date_str, "failures": failures });
    let body = serde_json::to_string_pretty(&manifest).map_err(std::io::Error::other)?;
    write_atomic(&path, body.as_bytes(), ".failures_")?;

    info!(path = %path.display(), count = failures.len(), "Failure manifest written");
    Ok(Some(path))
}
