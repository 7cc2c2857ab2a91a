//! Structured telemetry initialisation.

use std::fs::{File, OpenOptions};
use std::io::{self, IsTerminal};
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use gravity_config::{Config, LogFormat};
use once_cell::sync::OnceCell;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::{self, time::UtcTime};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer};

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Handle returned when telemetry has been initialised.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to parse the configured log filter expression.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Failed to open the debug log for appending.
    #[error("failed to open debug log {path}: {source}")]
    DebugLog {
        /// Debug log location.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Failed to install the tracing subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(TryInitError),
}

/// Configures the global tracing subscriber when invoked for the first time.
///
/// Events go to stderr, filtered by [`Config::log_filter`]. With
/// [`Config::debug`] set, every DEBUG-and-above event is also appended to
/// [`Config::debug_log`]. Later calls return a fresh [`TelemetryHandle`]
/// without touching the global state again.
///
/// # Errors
///
/// Returns a [`TelemetryError`] when the filter is invalid, the debug log
/// cannot be opened, or another subscriber is already installed.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(config))
        .map(|_| TelemetryHandle)
}

fn install_subscriber(config: &Config) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(config.log_filter())
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;

    let console = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_writer(io::stderr)
        // Colour only on interactive terminals.
        .with_ansi(io::stderr().is_terminal())
        .with_timer(UtcTime::rfc_3339());
    let console = match config.log_format() {
        LogFormat::Json => console.json().flatten_event(true).boxed(),
        LogFormat::Compact => console.compact().boxed(),
    }
    .with_filter(filter);

    let debug_file = if config.debug {
        Some(open_debug_log(&config.debug_log)?)
    } else {
        None
    };
    let debug_layer = debug_file.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .with_timer(UtcTime::rfc_3339())
            .with_filter(LevelFilter::DEBUG)
    });

    tracing_subscriber::registry()
        .with(console)
        .with(debug_layer)
        .try_init()
        .map_err(TelemetryError::Subscriber)
}

fn open_debug_log(path: &Utf8Path) -> Result<File, TelemetryError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| TelemetryError::DebugLog {
            path: path.to_path_buf(),
            source,
        })
}
