//! Transport-agnostic execution of a single inference request.
//!
//! Both the protocol server and the one-shot runner drive requests through
//! [`RequestExecutor::execute`]. Each step is a hard gate: the first failure
//! is returned and later steps do not run.

use std::io;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::registry::{HandlerFault, HandlerOutcome, HandlerRegistry};

const EXECUTOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::executor");

/// Reasons a request did not complete.
///
/// The display text is what clients and the command line see.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// No handler is registered.
    #[error("Request Handler is not callable.")]
    HandlerUnavailable,
    /// The input path does not name an existing file.
    #[error("Input file not found.")]
    InputNotFound,
    /// The handler returned [`HandlerOutcome::Failed`].
    #[error("Error returned during processing: {detail}")]
    HandlerFailed {
        /// Detail reported by the handler, verbatim.
        detail: String,
    },
    /// The handler returned an error or panicked.
    #[error("Exception generated during processing: {fault}")]
    HandlerFault {
        /// The captured fault.
        #[source]
        fault: HandlerFault,
    },
    /// The handler succeeded but the output path is not a file.
    #[error("Output file not generated during processing.")]
    OutputMissing,
}

/// Runs requests against the registered handler.
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    registry: Arc<HandlerRegistry>,
}

impl RequestExecutor {
    /// Creates an executor backed by `registry`.
    #[must_use]
    pub const fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }

    /// Executes one request.
    ///
    /// A suspending handler may yield here; a blocking one holds the calling
    /// task until it returns. Faults raised by the handler never escape.
    ///
    /// # Errors
    ///
    /// Returns the first failing gate as an [`ExecutionError`].
    pub async fn execute(&self, input: &Path, output: &Path) -> Result<(), ExecutionError> {
        let handler = self
            .registry
            .handler()
            .ok_or(ExecutionError::HandlerUnavailable)?;

        if !is_file(input).await {
            return Err(ExecutionError::InputNotFound);
        }

        debug!(
            target: EXECUTOR_TARGET,
            kind = %handler.kind(),
            input = %input.display(),
            output = %output.display(),
            "invoking handler"
        );

        match handler.invoke(input, output).await {
            Ok(HandlerOutcome::Success) => {}
            Ok(HandlerOutcome::Failed(detail)) => {
                return Err(ExecutionError::HandlerFailed { detail });
            }
            Err(fault) => return Err(ExecutionError::HandlerFault { fault }),
        }

        if !is_file(output).await {
            return Err(ExecutionError::OutputMissing);
        }
        Ok(())
    }
}

async fn is_file(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata.is_file(),
        Err(error) => {
            if error.kind() != io::ErrorKind::NotFound {
                debug!(
                    target: EXECUTOR_TARGET,
                    path = %path.display(),
                    %error,
                    "failed to stat path"
                );
            }
            false
        }
    }
}
