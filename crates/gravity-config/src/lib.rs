//! Shared configuration for the Gravity inference service.
//!
//! The command-line front end resolves its flags into a [`Config`] record
//! which is then handed, immutable, to the protocol server. The record carries
//! the listening port, the managed and debug mode switches, and the logging
//! settings consumed by the runtime telemetry layer.

mod defaults;
mod logging;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_DEBUG_LOG, DEFAULT_LOG_FILTER, DEFAULT_PORT, LOOPBACK_HOST, default_debug_log,
    default_log_filter_string, default_log_format, default_port,
};
pub use logging::LogFormat;

/// Immutable settings for a serving process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// WebSocket port bound on the loopback interface.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Enables the idle watchdog and stdout status chirps.
    #[serde(default)]
    pub managed: bool,
    /// Appends timestamped diagnostics to [`Config::debug_log`].
    #[serde(default)]
    pub debug: bool,
    /// `tracing` filter expression applied to stderr logging.
    #[serde(default = "default_log_filter_string")]
    pub log_filter: String,
    /// Output format for stderr logging.
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
    /// Append-only diagnostic file written in debug mode.
    #[serde(default = "default_debug_log")]
    pub debug_log: Utf8PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            managed: false,
            debug: false,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            debug_log: default_debug_log(),
        }
    }
}

impl Config {
    /// Checks the record before any socket is opened.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPort`] when the port is zero and
    /// [`ConfigError::EmptyLogFilter`] when the filter expression is blank.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort { port: self.port });
        }
        if self.log_filter.trim().is_empty() {
            return Err(ConfigError::EmptyLogFilter);
        }
        Ok(())
    }

    /// Returns the `tracing` filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Returns the configured log format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Returns the `host:port` pair the server binds to.
    #[must_use]
    pub const fn bind_target(&self) -> (&'static str, u16) {
        (LOOPBACK_HOST, self.port)
    }
}

/// Errors raised while validating a [`Config`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The requested port cannot be bound.
    #[error("invalid port {port}: expected a value between 1 and 65535")]
    InvalidPort {
        /// Port that failed validation.
        port: u16,
    },
    /// The log filter expression was blank.
    #[error("log filter must not be empty")]
    EmptyLogFilter,
}
