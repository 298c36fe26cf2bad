// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::{fmt, str::FromStr};

use serde::Deserialize;
use thiserror::Error;
use tracing_subscriber::{fmt as tfmt, EnvFilter};

/// Installs the global subscriber. `RUST_LOG` wins over `default_level` when set.
pub fn init_tracing(default_level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_directive()));
    let _ = tfmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}

/// Backend-neutral severity, used where messages arrive from outside `tracing`
/// (driver callbacks, validation layers).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_directive())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown log level `{0}` (expected trace, debug, info, warn or error)")]
pub struct ParseLogLevelError(pub String);

impl FromStr for LogLevel {
    type Err = ParseLogLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(ParseLogLevelError(other.to_owned())),
        }
    }
}

/// Forwards an externally produced message into `tracing` at the mapped level.
pub fn log_message(level: LogLevel, source: &str, kind: &str, message: &str) {
    match level {
        LogLevel::Trace => tracing::trace!(source, kind, "{message}"),
        LogLevel::Debug => tracing::debug!(source, kind, "{message}"),
        LogLevel::Info => tracing::info!(source, kind, "{message}"),
        LogLevel::Warn => tracing::warn!(source, kind, "{message}"),
        LogLevel::Error => tracing::error!(source, kind, "{message}"),
    }
}
