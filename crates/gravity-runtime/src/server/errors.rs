//! Error types for protocol server operations.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Errors that stop the protocol server.
#[derive(Debug, Error)]
pub enum ServeError {
    /// Serving was requested without a registered handler.
    #[error(
        "Request handler has not been registered. Please register a handler that accepts two \
         arguments (input path, output path)."
    )]
    HandlerNotRegistered,
    /// The listening socket could not be bound.
    #[error("failed to bind TCP listener at {host}:{port}: {source}")]
    Bind {
        /// Requested host.
        host: String,
        /// Requested port.
        port: u16,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The bound socket could not report its address.
    #[error("failed to read listener address: {0}")]
    LocalAddr(#[source] io::Error),
    /// Managed mode saw no clients for the whole idle window.
    #[error("no active connections for {}s; shutting down", .idle_for.as_secs())]
    IdleTimeout {
        /// Quiet time observed by the watchdog.
        idle_for: Duration,
    },
    /// The watchdog task ended abnormally.
    #[error("idle watchdog task failed: {0}")]
    WatchdogFailed(String),
}

