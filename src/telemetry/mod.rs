// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Logging and in-process metrics.
//!
//! The binary installs a `tracing` subscriber once at startup:
//!
//! ```rust,ignore
//! use adw::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(&TelemetryConfig::verbose())?;
//! ```
//!
//! Library code only emits events and, with the `telemetry` feature,
//! records into [`GLOBAL_METRICS`].

mod init;
pub mod metrics;

pub use init::{init_telemetry, LogStyle, TelemetryConfig, TelemetryGuard};
pub use metrics::{
    CallMetrics, LatencyHistogram, Metrics, MetricsSnapshot, OperationMetrics, TokenUsage,
    GLOBAL_METRICS, LATENCY_BOUNDS_MS,
};
