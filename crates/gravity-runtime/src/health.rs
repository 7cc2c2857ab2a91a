//! Structured health reporting for server lifecycle events.

use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;

use crate::connections::ConnectionId;
use crate::executor::ExecutionError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observation recorded by the idle watchdog on each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogTick {
    /// Connections open when the tick fired.
    pub open_connections: usize,
    /// Consecutive quiet ticks, after this one was counted.
    pub idle_ticks: u32,
}

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked once the listening socket is bound.
    fn server_listening(&self, address: SocketAddr, managed: bool);

    /// Invoked after a client connection is accepted.
    fn connection_opened(&self, id: ConnectionId, peer: SocketAddr);

    /// Invoked when a client connection is deregistered.
    fn connection_closed(&self, id: ConnectionId);

    /// Invoked when a request passes validation.
    fn request_accepted(&self, id: ConnectionId, request_id: &str);

    /// Invoked when a request reaches its terminal status.
    fn request_finished(
        &self,
        id: ConnectionId,
        request_id: &str,
        result: Result<(), &ExecutionError>,
    );

    /// Invoked on every idle watchdog tick.
    fn watchdog_tick(&self, tick: WatchdogTick);

    /// Invoked when the watchdog gives up waiting for clients.
    fn idle_timeout(&self, idle_for: Duration);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn server_listening(&self, address: SocketAddr, managed: bool) {
        (**self).server_listening(address, managed);
    }

    fn connection_opened(&self, id: ConnectionId, peer: SocketAddr) {
        (**self).connection_opened(id, peer);
    }

    fn connection_closed(&self, id: ConnectionId) {
        (**self).connection_closed(id);
    }

    fn request_accepted(&self, id: ConnectionId, request_id: &str) {
        (**self).request_accepted(id, request_id);
    }

    fn request_finished(
        &self,
        id: ConnectionId,
        request_id: &str,
        result: Result<(), &ExecutionError>,
    ) {
        (**self).request_finished(id, request_id, result);
    }

    fn watchdog_tick(&self, tick: WatchdogTick) {
        (**self).watchdog_tick(tick);
    }

    fn idle_timeout(&self, idle_for: Duration) {
        (**self).idle_timeout(idle_for);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn server_listening(&self, address: SocketAddr, managed: bool) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "server_listening",
            %address,
            managed,
            "protocol server listening"
        );
    }

    fn connection_opened(&self, id: ConnectionId, peer: SocketAddr) {
        tracing::debug!(
            target: HEALTH_TARGET,
            event = "connection_opened",
            connection = %id,
            %peer,
            "client connected"
        );
    }

    fn connection_closed(&self, id: ConnectionId) {
        tracing::debug!(
            target: HEALTH_TARGET,
            event = "connection_closed",
            connection = %id,
            "client disconnected"
        );
    }

    fn request_accepted(&self, id: ConnectionId, request_id: &str) {
        tracing::debug!(
            target: HEALTH_TARGET,
            event = "request_accepted",
            connection = %id,
            request_id,
            "request accepted"
        );
    }

    fn request_finished(
        &self,
        id: ConnectionId,
        request_id: &str,
        result: Result<(), &ExecutionError>,
    ) {
        match result {
            Ok(()) => tracing::info!(
                target: HEALTH_TARGET,
                event = "request_complete",
                connection = %id,
                request_id,
                "request complete"
            ),
            Err(error) => tracing::warn!(
                target: HEALTH_TARGET,
                event = "request_failed",
                connection = %id,
                request_id,
                %error,
                "request failed"
            ),
        }
    }

    fn watchdog_tick(&self, tick: WatchdogTick) {
        tracing::debug!(
            target: HEALTH_TARGET,
            event = "watchdog_tick",
            open_connections = tick.open_connections,
            idle_ticks = tick.idle_ticks,
            "idle watchdog tick"
        );
    }

    fn idle_timeout(&self, idle_for: Duration) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "idle_timeout",
            idle_secs = idle_for.as_secs(),
            "no active clients; shutting down"
        );
    }
}

/// Status line written to stdout in managed mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Chirp {
    /// The socket is bound and accepting clients.
    Listening {
        /// Bound port.
        port: u16,
    },
    /// A watchdog tick found no open connections.
    Idle {
        /// Consecutive quiet ticks so far.
        ticks: u32,
    },
    /// A watchdog tick found open connections.
    Active {
        /// Connections open at the tick.
        connections: usize,
    },
    /// The process is about to exit.
    Shutdown {
        /// Why the process is exiting.
        reason: &'static str,
    },
}

/// Reporter for managed mode: logs through [`StructuredHealthReporter`] and
/// writes [`Chirp`] lines for the supervising process.
pub struct ChirpingHealthReporter {
    inner: StructuredHealthReporter,
    sink: Mutex<Box<dyn Write + Send>>,
}

impl ChirpingHealthReporter {
    /// Writes chirps to the process's stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::with_sink(Box::new(io::stdout()))
    }

    /// Writes chirps to `sink`.
    #[must_use]
    pub fn with_sink(sink: Box<dyn Write + Send>) -> Self {
        Self {
            inner: StructuredHealthReporter,
            sink: Mutex::new(sink),
        }
    }

    fn chirp(&self, chirp: Chirp) {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        let written = serde_json::to_writer(&mut *sink, &chirp)
            .map_err(io::Error::from)
            .and_then(|()| sink.write_all(b"\n"))
            .and_then(|()| sink.flush());
        if let Err(error) = written {
            tracing::warn!(target: HEALTH_TARGET, %error, "failed to write status chirp");
        }
    }
}

impl std::fmt::Debug for ChirpingHealthReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChirpingHealthReporter").finish_non_exhaustive()
    }
}

impl HealthReporter for ChirpingHealthReporter {
    fn server_listening(&self, address: SocketAddr, managed: bool) {
        self.inner.server_listening(address, managed);
        self.chirp(Chirp::Listening {
            port: address.port(),
        });
    }

    fn connection_opened(&self, id: ConnectionId, peer: SocketAddr) {
        self.inner.connection_opened(id, peer);
    }

    fn connection_closed(&self, id: ConnectionId) {
        self.inner.connection_closed(id);
    }

    fn request_accepted(&self, id: ConnectionId, request_id: &str) {
        self.inner.request_accepted(id, request_id);
    }

    fn request_finished(
        &self,
        id: ConnectionId,
        request_id: &str,
        result: Result<(), &ExecutionError>,
    ) {
        self.inner.request_finished(id, request_id, result);
    }

    fn watchdog_tick(&self, tick: WatchdogTick) {
        self.inner.watchdog_tick(tick);
        if tick.open_connections == 0 {
            self.chirp(Chirp::Idle {
                ticks: tick.idle_ticks,
            });
        } else {
            self.chirp(Chirp::Active {
                connections: tick.open_connections,
            });
        }
    }

    fn idle_timeout(&self, idle_for: Duration) {
        self.inner.idle_timeout(idle_for);
        self.chirp(Chirp::Shutdown { reason: "idle" });
    }
}
