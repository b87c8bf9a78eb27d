// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Subscriber setup for the `adw` binary.

use std::io;

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// How much of each event line to print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStyle {
    /// Level and message, one line per event.
    Compact,
    /// Targets, source locations and span enter/close events.
    Detailed,
}

/// Logging configuration.
///
/// Filter precedence: `RUST_LOG`, then `directive`, then `level`.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub level: Level,
    /// Filter such as `adw=debug,reqwest=warn`.
    pub directive: Option<String>,
    pub style: LogStyle,
    pub ansi: bool,
}

impl Default for TelemetryConfig {
    /// Warnings only.
    fn default() -> Self {
        Self {
            level: Level::WARN,
            directive: None,
            style: LogStyle::Compact,
            ansi: true,
        }
    }
}

impl TelemetryConfig {
    /// Profile for the CLI's `--verbose` and `--debug` flags.
    pub fn for_flags(verbose: bool, debug: bool) -> Self {
        if debug {
            Self::debug()
        } else if verbose {
            Self::verbose()
        } else {
            Self::default()
        }
    }

    /// Phase and provider progress.
    pub fn verbose() -> Self {
        Self {
            level: Level::INFO,
            ..Self::default()
        }
    }

    /// Debug output from this crate only, with spans and source locations.
    pub fn debug() -> Self {
        Self {
            level: Level::DEBUG,
            directive: Some("adw=debug".to_string()),
            style: LogStyle::Detailed,
            ansi: true,
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Use a configured filter. Blank directives are ignored.
    pub fn with_filter(mut self, directive: impl Into<String>) -> Self {
        let directive = directive.into();
        if !directive.trim().is_empty() {
            self.directive = Some(directive);
        }
        self
    }

    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }

    /// Resolve the filter. An unparseable directive falls back to `level`.
    fn env_filter(&self) -> EnvFilter {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return filter;
        }
        self.directive
            .as_deref()
            .and_then(|d| EnvFilter::try_new(d).ok())
            .unwrap_or_else(|| EnvFilter::new(self.level.to_string()))
    }
}

/// Keeps the subscriber installed for the life of the process.
#[must_use]
pub struct TelemetryGuard {
    _private: (),
}

/// Install the global subscriber on stderr, keeping stdout for command output.
///
/// Fails if a subscriber is already installed.
pub fn init_telemetry(config: &TelemetryConfig) -> io::Result<TelemetryGuard> {
    let filter = config.env_filter();
    let detailed = config.style == LogStyle::Detailed;

    let layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(config.ansi)
        .with_target(detailed)
        .with_file(detailed)
        .with_line_number(detailed)
        .with_span_events(if detailed {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        });

    let installed = match config.style {
        LogStyle::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(layer.compact())
            .try_init(),
        LogStyle::Detailed => tracing_subscriber::registry().with(filter).with(layer).try_init(),
    };
    installed.map_err(io::Error::other)?;

    Ok(TelemetryGuard { _private: () })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_quiet() {
        let config = TelemetryConfig::default();
        assert_eq!(config.level, Level::WARN);
        assert_eq!(config.style, LogStyle::Compact);
        assert!(config.directive.is_none());
    }

    #[test]
    fn test_flag_profiles() {
        assert_eq!(TelemetryConfig::for_flags(false, false).level, Level::WARN);
        assert_eq!(TelemetryConfig::for_flags(true, false).level, Level::INFO);

        let debug = TelemetryConfig::for_flags(true, true);
        assert_eq!(debug.level, Level::DEBUG);
        assert_eq!(debug.style, LogStyle::Detailed);
        assert_eq!(debug.directive.as_deref(), Some("adw=debug"));
    }

    #[test]
    fn test_builder() {
        let config = TelemetryConfig::default()
            .with_level(Level::DEBUG)
            .with_filter("adw=trace")
            .with_ansi(false);

        assert_eq!(config.level, Level::DEBUG);
        assert_eq!(config.directive.as_deref(), Some("adw=trace"));
        assert!(!config.ansi);
    }

    #[test]
    fn test_blank_filter_ignored() {
        let config = TelemetryConfig::verbose().with_filter("  ");
        assert!(config.directive.is_none());
    }
}
