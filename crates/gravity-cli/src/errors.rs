//! Error types for the command-line runtime.

use std::io;

use gravity_config::ConfigError;
use gravity_runtime::{OneShotError, ServeError, TelemetryError};
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Telemetry(#[from] TelemetryError),
    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] io::Error),
    #[error("{0}")]
    OneShot(#[from] OneShotError),
    #[error("{0}")]
    Serve(#[from] ServeError),
}
