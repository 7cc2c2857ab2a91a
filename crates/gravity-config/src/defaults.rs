use camino::Utf8PathBuf;

/// Port the protocol server binds when none is supplied.
pub const DEFAULT_PORT: u16 = 4500;

/// Loopback host the protocol server binds to.
pub const LOOPBACK_HOST: &str = "127.0.0.1";

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// File that receives debug diagnostics when debug mode is enabled.
pub const DEFAULT_DEBUG_LOG: &str = "gravity-debug.log";

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Compact
}

/// Default path of the append-only debug log.
#[must_use]
pub fn default_debug_log() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_DEBUG_LOG)
}

/// Default listening port.
#[must_use]
pub const fn default_port() -> u16 {
    DEFAULT_PORT
}
