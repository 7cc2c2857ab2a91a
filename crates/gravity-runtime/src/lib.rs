//! Runtime for the Gravity inference service.
//!
//! A host program registers exactly one handler in a [`HandlerRegistry`].
//! The handler turns an input file into an output file and is either
//! blocking or suspending. The runtime then drives it in one of two ways:
//!
//! - [`run_once`] executes a single request straight from the command line.
//! - [`ProtocolServer`] accepts JSON requests as WebSocket text frames on
//!   the loopback interface and answers each with a `pending` status followed by exactly one terminal
//!   status (`complete` or `error`).
//!
//! Both paths share [`RequestExecutor`], whose checks decide the failure
//! text a client sees. In managed mode an [`IdleWatchdog`] samples the
//! live [`ConnectionSet`] and ends the server after a quiet window.
//!
//! Everything runs on a single-threaded Tokio runtime. A blocking handler
//! therefore holds up every other connection and the watchdog until it
//! returns; a suspending handler lets them interleave.

mod connections;
mod executor;
mod health;
mod oneshot;
mod registry;
mod server;
mod telemetry;
mod watchdog;

pub use connections::{ConnectionGuard, ConnectionId, ConnectionSet};
pub use executor::{ExecutionError, RequestExecutor};
pub use health::{
    Chirp, ChirpingHealthReporter, HealthReporter, StructuredHealthReporter, WatchdogTick,
};
pub use oneshot::{OneShotError, run_once};
pub use registry::{
    BlockingHandler, HandlerFault, HandlerKind, HandlerOutcome, HandlerRegistry, HandlerResult,
    RegisteredHandler, RegistryError, SuspendingHandler,
};
pub use server::{BoundServer, MAX_FRAME_BYTES, ProtocolServer, ServeError};
pub use telemetry::{TelemetryError, TelemetryHandle, initialise as initialise_telemetry};
pub use watchdog::{
    IDLE_TICK_LIMIT, IdleTimeout, IdleTracker, IdleWatchdog, WATCHDOG_INTERVAL, WatchdogState,
};

#[cfg(test)]
mod tests;
