//! WebSocket protocol server.
//!
//! Clients exchange JSON text frames over a loopback WebSocket. Each accepted
//! connection runs in its own task on the single-threaded runtime; the
//! idle watchdog runs alongside the accept loop in managed mode and its
//! verdict ends [`BoundServer::serve`].

mod errors;
mod session;

use std::future;
use std::io;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use gravity_config::Config;
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, warn};

pub use self::errors::ServeError;

use self::session::Session;
use crate::connections::ConnectionSet;
use crate::executor::RequestExecutor;
use crate::health::{ChirpingHealthReporter, HealthReporter, StructuredHealthReporter};
use crate::registry::{HandlerRegistry, panic_message};
use crate::watchdog::{IDLE_TICK_LIMIT, IdleWatchdog, WATCHDOG_INTERVAL};

pub(crate) const SERVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::server");
pub(crate) const SESSION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::session");

/// Largest inbound WebSocket message accepted.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// Unbound server carrying its configuration and collaborators.
pub struct ProtocolServer {
    config: Config,
    registry: Arc<HandlerRegistry>,
    reporter: Arc<dyn HealthReporter>,
    watchdog_schedule: (Duration, u32),
    max_frame_bytes: usize,
}

impl ProtocolServer {
    /// Creates a server for `registry`.
    ///
    /// Managed mode reports through [`ChirpingHealthReporter`] on stdout;
    /// otherwise events are only logged.
    ///
    /// # Errors
    ///
    /// Returns [`ServeError::HandlerNotRegistered`] when the registry is empty.
    pub fn new(config: Config, registry: Arc<HandlerRegistry>) -> Result<Self, ServeError> {
        let reporter: Arc<dyn HealthReporter> = if config.managed {
            Arc::new(ChirpingHealthReporter::stdout())
        } else {
            Arc::new(StructuredHealthReporter::new())
        };
        Self::with_reporter(config, registry, reporter)
    }

    /// Creates a server that reports lifecycle events to `reporter`.
    ///
    /// # Errors
    ///
    /// Returns [`ServeError::HandlerNotRegistered`] when the registry is empty.
    pub fn with_reporter(
        config: Config,
        registry: Arc<HandlerRegistry>,
        reporter: Arc<dyn HealthReporter>,
    ) -> Result<Self, ServeError> {
        if !registry.check_registered() {
            return Err(ServeError::HandlerNotRegistered);
        }
        Ok(Self {
            config,
            registry,
            reporter,
            watchdog_schedule: (WATCHDOG_INTERVAL, IDLE_TICK_LIMIT),
            max_frame_bytes: MAX_FRAME_BYTES,
        })
    }

    /// Overrides the idle watchdog schedule used in managed mode.
    #[must_use]
    pub const fn with_watchdog_schedule(mut self, interval: Duration, limit: u32) -> Self {
        self.watchdog_schedule = (interval, limit);
        self
    }

    /// Overrides the inbound message size limit.
    #[must_use]
    pub const fn with_max_frame_bytes(mut self, limit: usize) -> Self {
        self.max_frame_bytes = limit;
        self
    }

    /// Binds the listening socket on the loopback interface.
    ///
    /// # Errors
    ///
    /// Returns [`ServeError::Bind`] when the port cannot be bound.
    pub async fn bind(self) -> Result<BoundServer, ServeError> {
        let (host, port) = self.config.bind_target();
        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|source| ServeError::Bind {
                host: host.to_owned(),
                port,
                source,
            })?;
        Ok(BoundServer {
            listener,
            managed: self.config.managed,
            executor: RequestExecutor::new(self.registry),
            connections: Arc::new(ConnectionSet::new()),
            reporter: self.reporter,
            watchdog_schedule: self.watchdog_schedule,
            max_frame_bytes: self.max_frame_bytes,
        })
    }

    /// Binds and serves until the process is told to stop.
    ///
    /// # Errors
    ///
    /// See [`ProtocolServer::bind`] and [`BoundServer::serve`].
    pub async fn run(self) -> Result<(), ServeError> {
        self.bind().await?.serve().await
    }
}

impl std::fmt::Debug for ProtocolServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolServer")
            .field("config", &self.config)
            .field("watchdog_schedule", &self.watchdog_schedule)
            .field("max_frame_bytes", &self.max_frame_bytes)
            .finish_non_exhaustive()
    }
}

/// Server with a bound socket, ready to accept clients.
pub struct BoundServer {
    listener: TcpListener,
    managed: bool,
    executor: RequestExecutor,
    connections: Arc<ConnectionSet>,
    reporter: Arc<dyn HealthReporter>,
    watchdog_schedule: (Duration, u32),
    max_frame_bytes: usize,
}

impl BoundServer {
    /// Address the socket is bound to.
    ///
    /// # Errors
    ///
    /// Returns [`ServeError::LocalAddr`] when the socket cannot report it.
    pub fn local_addr(&self) -> Result<SocketAddr, ServeError> {
        self.listener.local_addr().map_err(ServeError::LocalAddr)
    }

    /// Live connection set shared with the watchdog.
    #[must_use]
    pub fn connections(&self) -> Arc<ConnectionSet> {
        Arc::clone(&self.connections)
    }

    /// Accepts clients until the idle watchdog fires.
    ///
    /// Outside managed mode there is no watchdog and the future only ends
    /// when it is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ServeError::IdleTimeout`] when managed mode saw no clients
    /// for the whole idle window.
    pub async fn serve(self) -> Result<(), ServeError> {
        let address = self.local_addr()?;
        self.reporter.server_listening(address, self.managed);

        let watchdog = self.managed.then(|| {
            let (interval, limit) = self.watchdog_schedule;
            tokio::spawn(
                IdleWatchdog::new(self.connections(), Arc::clone(&self.reporter))
                    .with_schedule(interval, limit)
                    .run(),
            )
        });
        let idle = async move {
            match watchdog {
                Some(task) => task.await,
                None => future::pending().await,
            }
        };
        tokio::pin!(idle);

        let mut last_error = None::<io::ErrorKind>;
        loop {
            tokio::select! {
                verdict = &mut idle => {
                    return match verdict {
                        Ok(timeout) => Err(ServeError::IdleTimeout { idle_for: timeout.idle_for }),
                        Err(join_error) => Err(ServeError::WatchdogFailed(join_error.to_string())),
                    };
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        last_error = None;
                        self.spawn_session(stream, peer);
                    }
                    Err(error) => {
                        let kind = error.kind();
                        if last_error != Some(kind) {
                            warn!(target: SERVER_TARGET, %error, "socket accept error");
                        }
                        last_error = Some(kind);
                        tokio::time::sleep(ERROR_BACKOFF).await;
                    }
                },
            }
        }
    }

    fn spawn_session(&self, stream: TcpStream, peer: SocketAddr) {
        let guard = self.connections.on_accept();
        let id = guard.id();
        self.reporter.connection_opened(id, peer);

        let executor = self.executor.clone();
        let reporter = Arc::clone(&self.reporter);
        let max_frame_bytes = self.max_frame_bytes;
        tokio::spawn(async move {
            let session = Session::run(
                stream,
                guard,
                executor,
                Arc::clone(&reporter),
                max_frame_bytes,
            );
            if let Err(payload) = AssertUnwindSafe(session).catch_unwind().await {
                error!(
                    target: SESSION_TARGET,
                    connection = %id,
                    panic = %panic_message(payload.as_ref()),
                    "connection task panicked"
                );
            }
            reporter.connection_closed(id);
        });
    }
}

impl std::fmt::Debug for BoundServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundServer")
            .field("listener", &self.listener)
            .field("managed", &self.managed)
            .field("connections", &self.connections.open_count())
            .finish_non_exhaustive()
    }
}
