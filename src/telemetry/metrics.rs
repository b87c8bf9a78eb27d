// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-process metrics for provider calls, state I/O and phases.
//!
//! Three tables, all keyed by name:
//! - calls: one row per retry-policy source (`architect`, `critic`, ...)
//! - tokens: one row per provider (`anthropic`, `openai`, `gemini`)
//! - operations: dotted names such as `state.save`, `trinity.converge`, `phase.plan`

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

/// Process-wide registry.
pub static GLOBAL_METRICS: Lazy<Metrics> = Lazy::new(Metrics::new);

/// Upper bounds of the latency buckets, in milliseconds. One overflow
/// bucket follows the last bound.
pub const LATENCY_BOUNDS_MS: [u64; 6] = [1, 10, 100, 1_000, 10_000, 60_000];

#[derive(Debug)]
pub struct Metrics {
    registry: Mutex<Registry>,
    started: Instant,
}

#[derive(Debug, Clone, Default)]
struct Registry {
    calls: BTreeMap<String, CallMetrics>,
    tokens: BTreeMap<String, TokenUsage>,
    operations: BTreeMap<String, OperationMetrics>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            started: Instant::now(),
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a finished call, including every retry it took.
    pub fn record_call(&self, source: &str, elapsed: Duration, attempts: u32, success: bool) {
        self.registry()
            .calls
            .entry(source.to_string())
            .or_default()
            .record(elapsed, attempts, success);
    }

    pub fn record_tokens(&self, provider: &str, input: u64, output: u64) {
        let mut registry = self.registry();
        let usage = registry.tokens.entry(provider.to_string()).or_default();
        usage.input += input;
        usage.output += output;
    }

    pub fn record_operation(&self, name: &str, elapsed: Duration) {
        self.registry()
            .operations
            .entry(name.to_string())
            .or_default()
            .record(elapsed);
    }

    pub fn call_metrics(&self, source: &str) -> Option<CallMetrics> {
        self.registry().calls.get(source).cloned()
    }

    pub fn token_usage(&self, provider: &str) -> TokenUsage {
        self.registry().tokens.get(provider).copied().unwrap_or_default()
    }

    pub fn operation_metrics(&self, name: &str) -> Option<OperationMetrics> {
        self.registry().operations.get(name).cloned()
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let registry = self.registry().clone();
        MetricsSnapshot {
            calls: registry.calls,
            tokens: registry.tokens,
            operations: registry.operations,
            uptime: self.uptime(),
        }
    }

    pub fn reset(&self) {
        *self.registry() = Registry::default();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Rows
// ============================================================================

/// Outcomes of calls made through one retry policy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallMetrics {
    pub calls: u64,
    pub failures: u64,
    /// Attempts beyond the first, summed over all calls.
    pub retries: u64,
    pub total: Duration,
    pub slowest: Duration,
}

impl CallMetrics {
    fn record(&mut self, elapsed: Duration, attempts: u32, success: bool) {
        self.calls += 1;
        if !success {
            self.failures += 1;
        }
        self.retries += u64::from(attempts.saturating_sub(1));
        self.total += elapsed;
        self.slowest = self.slowest.max(elapsed);
    }

    pub fn succeeded(&self) -> u64 {
        self.calls - self.failures
    }

    pub fn mean(&self) -> Duration {
        mean(self.total, self.calls)
    }
}

/// Tokens reported by one provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input + self.output
    }
}

/// Timings of one named operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationMetrics {
    pub count: u64,
    pub total: Duration,
    pub slowest: Duration,
    pub latency: LatencyHistogram,
}

impl OperationMetrics {
    fn record(&mut self, elapsed: Duration) {
        self.count += 1;
        self.total += elapsed;
        self.slowest = self.slowest.max(elapsed);
        self.latency.record(elapsed);
    }

    pub fn mean(&self) -> Duration {
        mean(self.total, self.count)
    }

    /// Upper bound of the bucket holding quantile `q`, capped at the slowest
    /// observation. Zero when nothing was recorded.
    pub fn quantile(&self, q: f64) -> Duration {
        match self.latency.bucket_of(q) {
            Some(i) if i < LATENCY_BOUNDS_MS.len() => {
                Duration::from_millis(LATENCY_BOUNDS_MS[i]).min(self.slowest)
            }
            Some(_) => self.slowest,
            None => Duration::ZERO,
        }
    }
}

fn mean(total: Duration, count: u64) -> Duration {
    match u32::try_from(count) {
        Ok(0) => Duration::ZERO,
        Ok(n) => total / n,
        Err(_) => Duration::from_secs_f64(total.as_secs_f64() / count as f64),
    }
}

/// Counts per [`LATENCY_BOUNDS_MS`] bucket plus overflow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LatencyHistogram {
    counts: [u64; LATENCY_BOUNDS_MS.len() + 1],
}

impl LatencyHistogram {
    pub fn record(&mut self, elapsed: Duration) {
        let ms = elapsed.as_millis();
        let bucket = LATENCY_BOUNDS_MS
            .iter()
            .position(|&bound| ms <= u128::from(bound))
            .unwrap_or(LATENCY_BOUNDS_MS.len());
        self.counts[bucket] += 1;
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn len(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of the bucket containing quantile `q` (`0.0..=1.0`).
    pub fn bucket_of(&self, q: f64) -> Option<usize> {
        let total = self.len();
        if total == 0 {
            return None;
        }
        let rank = ((total as f64) * q.clamp(0.0, 1.0)).ceil().max(1.0) as u64;
        let mut seen = 0;
        self.counts.iter().position(|&count| {
            seen += count;
            seen >= rank
        })
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Point-in-time copy of every table, sorted by name.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub calls: BTreeMap<String, CallMetrics>,
    pub tokens: BTreeMap<String, TokenUsage>,
    pub operations: BTreeMap<String, OperationMetrics>,
    pub uptime: Duration,
}

impl MetricsSnapshot {
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty() && self.tokens.is_empty() && self.operations.is_empty()
    }

    /// Plain-text report for stderr.
    pub fn format_report(&self) -> String {
        let mut out = format!("ADW metrics (uptime {:.2?})\n", self.uptime);

        if !self.calls.is_empty() {
            out.push_str("\nProvider calls\n");
            for (source, m) in &self.calls {
                let _ = writeln!(
                    out,
                    "  {source:<12} {:>4} ok {:>3} failed {:>3} retries  mean {:.2?}  max {:.2?}",
                    m.succeeded(),
                    m.failures,
                    m.retries,
                    m.mean(),
                    m.slowest,
                );
            }
        }

        if !self.tokens.is_empty() {
            out.push_str("\nTokens\n");
            for (provider, usage) in &self.tokens {
                let _ = writeln!(
                    out,
                    "  {provider:<12} {:>8} in {:>8} out",
                    usage.input, usage.output
                );
            }
        }

        if !self.operations.is_empty() {
            out.push_str("\nOperations\n");
            for (name, m) in &self.operations {
                let _ = writeln!(
                    out,
                    "  {name:<18} {:>4}x  mean {:.2?}  p50 {:.2?}  p99 {:.2?}",
                    m.count,
                    m.mean(),
                    m.quantile(0.5),
                    m.quantile(0.99),
                );
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_metrics_count_retries_and_failures() {
        let metrics = Metrics::new();
        metrics.record_call("critic", Duration::from_millis(300), 1, true);
        metrics.record_call("critic", Duration::from_millis(900), 3, false);

        let critic = metrics.call_metrics("critic").unwrap();
        assert_eq!(critic.calls, 2);
        assert_eq!(critic.succeeded(), 1);
        assert_eq!(critic.retries, 2);
        assert_eq!(critic.mean(), Duration::from_millis(600));
        assert_eq!(critic.slowest, Duration::from_millis(900));
        assert!(metrics.call_metrics("architect").is_none());
    }

    #[test]
    fn test_tokens_accumulate_per_provider() {
        let metrics = Metrics::new();
        metrics.record_tokens("anthropic", 1000, 200);
        metrics.record_tokens("anthropic", 500, 100);
        metrics.record_tokens("gemini", 10, 5);

        assert_eq!(
            metrics.token_usage("anthropic"),
            TokenUsage { input: 1500, output: 300 }
        );
        assert_eq!(metrics.token_usage("gemini").total(), 15);
        assert_eq!(metrics.token_usage("openai"), TokenUsage::default());
    }

    #[test]
    fn test_histogram_buckets() {
        let mut hist = LatencyHistogram::default();
        hist.record(Duration::from_micros(500));
        hist.record(Duration::from_millis(5));
        hist.record(Duration::from_secs(120));

        assert_eq!(hist.counts()[0], 1);
        assert_eq!(hist.counts()[1], 1);
        assert_eq!(hist.counts()[LATENCY_BOUNDS_MS.len()], 1);
        assert_eq!(hist.len(), 3);
        assert_eq!(LatencyHistogram::default().bucket_of(0.5), None);
    }

    #[test]
    fn test_operation_quantiles() {
        let mut op = OperationMetrics::default();
        for _ in 0..98 {
            op.record(Duration::from_millis(5));
        }
        op.record(Duration::from_millis(50));
        op.record(Duration::from_secs(90));

        assert_eq!(op.count, 100);
        assert_eq!(op.quantile(0.5), Duration::from_millis(10));
        assert_eq!(op.quantile(0.99), Duration::from_millis(100));
        assert_eq!(op.quantile(1.0), Duration::from_secs(90));
        assert_eq!(OperationMetrics::default().quantile(0.5), Duration::ZERO);
    }

    #[test]
    fn test_quantile_capped_by_slowest() {
        let mut op = OperationMetrics::default();
        op.record(Duration::from_millis(150));
        assert_eq!(op.quantile(0.5), Duration::from_millis(150));
    }

    #[test]
    fn test_snapshot_and_reset() {
        let metrics = Metrics::new();
        metrics.record_operation("state.save", Duration::from_millis(2));
        metrics.record_operation("phase.plan", Duration::from_secs(3));
        metrics.record_call("architect", Duration::from_secs(2), 1, true);
        metrics.record_tokens("anthropic", 40, 60);

        let snapshot = metrics.snapshot();
        let names: Vec<&str> = snapshot.operations.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["phase.plan", "state.save"]);

        let report = snapshot.format_report();
        assert!(report.starts_with("ADW metrics"));
        assert!(report.contains("Provider calls"));
        assert!(report.contains("architect"));
        assert!(report.contains("Tokens"));
        assert!(report.contains("Operations"));

        metrics.reset();
        assert!(metrics.snapshot().is_empty());
        assert!(metrics.operation_metrics("state.save").is_none());
    }
}
