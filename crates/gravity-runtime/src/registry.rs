//! Registration slot for the process's single inference handler.
//!
//! A handler maps an input path and an output path to a [`HandlerOutcome`].
//! Two invocation kinds exist and the registry preserves the distinction:
//!
//! - [`BlockingHandler`] runs to completion on the calling task. While it
//!   runs, the single-threaded event loop cannot make progress on other
//!   connections.
//! - [`SuspendingHandler`] returns a future and may yield to the scheduler,
//!   letting other requests interleave with it.
//!
//! The kind is fixed when the handler is wrapped in a [`RegisteredHandler`]
//! and the slot can be filled exactly once.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use once_cell::sync::OnceCell;
use thiserror::Error;

/// Result type returned by handlers. `Err` is treated as a raised fault.
pub type HandlerResult = anyhow::Result<HandlerOutcome>;

/// What a handler reports when it returns normally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// The handler finished without reporting a problem.
    Success,
    /// The handler explicitly reported a failure.
    Failed(String),
}

impl HandlerOutcome {
    /// Builds a [`HandlerOutcome::Failed`] from any displayable detail.
    pub fn failed(detail: impl Into<String>) -> Self {
        Self::Failed(detail.into())
    }
}

/// Scheduling behaviour of a registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    /// Runs to completion without yielding.
    Blocking,
    /// May suspend the calling task.
    Suspending,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocking => f.write_str("blocking"),
            Self::Suspending => f.write_str("suspending"),
        }
    }
}

/// Handler invoked synchronously on the event loop.
pub trait BlockingHandler: Send + Sync + 'static {
    /// Reads `input` and writes `output`.
    fn invoke(&self, input: &Path, output: &Path) -> HandlerResult;
}

impl<F> BlockingHandler for F
where
    F: Fn(&Path, &Path) -> HandlerResult + Send + Sync + 'static,
{
    fn invoke(&self, input: &Path, output: &Path) -> HandlerResult {
        self(input, output)
    }
}

/// Handler whose invocation may yield to the scheduler.
#[async_trait]
pub trait SuspendingHandler: Send + Sync + 'static {
    /// Reads `input` and writes `output`.
    async fn invoke(&self, input: &Path, output: &Path) -> HandlerResult;
}

/// Fault raised while a handler ran: an `Err` return or a panic.
#[derive(Debug, Error)]
pub enum HandlerFault {
    /// The handler returned an error.
    #[error("{0:#}")]
    Error(anyhow::Error),
    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panic(String),
}

/// A handler together with its invocation kind.
#[derive(Clone)]
pub enum RegisteredHandler {
    /// See [`BlockingHandler`].
    Blocking(Arc<dyn BlockingHandler>),
    /// See [`SuspendingHandler`].
    Suspending(Arc<dyn SuspendingHandler>),
}

impl RegisteredHandler {
    /// Wraps a handler that must run to completion.
    pub fn blocking(handler: impl BlockingHandler) -> Self {
        Self::Blocking(Arc::new(handler))
    }

    /// Wraps a handler that may suspend.
    pub fn suspending(handler: impl SuspendingHandler) -> Self {
        Self::Suspending(Arc::new(handler))
    }

    /// The invocation kind fixed at registration.
    #[must_use]
    pub const fn kind(&self) -> HandlerKind {
        match self {
            Self::Blocking(_) => HandlerKind::Blocking,
            Self::Suspending(_) => HandlerKind::Suspending,
        }
    }

    /// Invokes the handler, converting errors and panics into [`HandlerFault`].
    ///
    /// Blocking handlers are called inline and hold the calling task until
    /// they return; suspending handlers are awaited.
    pub async fn invoke(
        &self,
        input: &Path,
        output: &Path,
    ) -> Result<HandlerOutcome, HandlerFault> {
        let result = match self {
            Self::Blocking(handler) => {
                panic::catch_unwind(AssertUnwindSafe(|| handler.invoke(input, output)))
            }
            Self::Suspending(handler) => {
                AssertUnwindSafe(handler.invoke(input, output))
                    .catch_unwind()
                    .await
            }
        };
        match result {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(error)) => Err(HandlerFault::Error(error)),
            Err(payload) => Err(HandlerFault::Panic(panic_message(payload.as_ref()))),
        }
    }
}

impl fmt::Debug for RegisteredHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredHandler")
            .field("kind", &self.kind())
            .finish_non_exhaustive()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

/// Errors raised by [`HandlerRegistry::register`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The slot was already filled.
    #[error("a {kind} request handler is already registered")]
    AlreadyRegistered {
        /// Kind of the handler that holds the slot.
        kind: HandlerKind,
    },
}

/// Holds at most one handler for the lifetime of the process.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    slot: OnceCell<RegisteredHandler>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry that already holds `handler`.
    #[must_use]
    pub fn with_handler(handler: RegisteredHandler) -> Self {
        Self {
            slot: OnceCell::with_value(handler),
        }
    }

    /// Stores the handler.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyRegistered`] when a handler is present.
    pub fn register(&self, handler: RegisteredHandler) -> Result<(), RegistryError> {
        self.slot
            .set(handler)
            .map_err(|_| RegistryError::AlreadyRegistered {
                kind: self.slot.get().map_or(HandlerKind::Blocking, RegisteredHandler::kind),
            })
    }

    /// Registers a handler that must run to completion.
    ///
    /// # Errors
    ///
    /// See [`HandlerRegistry::register`].
    pub fn register_blocking(&self, handler: impl BlockingHandler) -> Result<(), RegistryError> {
        self.register(RegisteredHandler::blocking(handler))
    }

    /// Registers a handler that may suspend.
    ///
    /// # Errors
    ///
    /// See [`HandlerRegistry::register`].
    pub fn register_suspending(
        &self,
        handler: impl SuspendingHandler,
    ) -> Result<(), RegistryError> {
        self.register(RegisteredHandler::suspending(handler))
    }

    /// Returns true when a handler is present and can be invoked.
    #[must_use]
    pub fn check_registered(&self) -> bool {
        self.slot.get().is_some()
    }

    /// The registered handler, if any.
    #[must_use]
    pub fn handler(&self) -> Option<&RegisteredHandler> {
        self.slot.get()
    }
}
