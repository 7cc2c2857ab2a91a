//! Single request execution from the command line.
//!
//! The runner bypasses the protocol server entirely: it resolves the two
//! paths against the working directory, checks JSON inputs up front, and
//! drives one call through [`RequestExecutor::execute`].

use std::io;
use std::path::{self, Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::executor::{ExecutionError, RequestExecutor};

const ONESHOT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::oneshot");

/// Reasons a one-shot run failed.
#[derive(Debug, Error)]
pub enum OneShotError {
    /// A `.json` input was empty or not well-formed.
    #[error("JSON input is not in a valid format. Please check the format of the input file.")]
    InvalidJsonInput,
    /// A path could not be made absolute.
    #[error("failed to resolve path {}: {source}", .path.display())]
    ResolvePath {
        /// Path as given.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The executor rejected the request.
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// Runs the registered handler once over `input` and `output`.
///
/// # Errors
///
/// Returns [`OneShotError`] when preflight checks or execution fail.
pub async fn run_once(
    executor: &RequestExecutor,
    input: &Path,
    output: &Path,
) -> Result<(), OneShotError> {
    let input = resolve_input(input)?;
    let output = resolve(output)?;
    check_json_input(&input).await?;

    info!(
        target: ONESHOT_TARGET,
        input = %input.display(),
        output = %output.display(),
        "running single request"
    );
    executor.execute(&input, &output).await?;
    info!(target: ONESHOT_TARGET, output = %output.display(), "single request complete");
    Ok(())
}

fn resolve(path: &Path) -> Result<PathBuf, OneShotError> {
    path::absolute(path).map_err(|source| OneShotError::ResolvePath {
        path: path.to_path_buf(),
        source,
    })
}

/// Canonicalises an existing input; a missing one is left to the executor.
fn resolve_input(path: &Path) -> Result<PathBuf, OneShotError> {
    match path.canonicalize() {
        Ok(canonical) => Ok(canonical),
        Err(error) => {
            debug!(
                target: ONESHOT_TARGET,
                path = %path.display(),
                %error,
                "input could not be canonicalised"
            );
            resolve(path)
        }
    }
}

async fn check_json_input(input: &Path) -> Result<(), OneShotError> {
    let is_json = input.extension().is_some_and(|extension| extension == "json");
    if !is_json {
        return Ok(());
    }
    let Ok(contents) = tokio::fs::read(input).await else {
        return Ok(());
    };
    if contents.iter().all(u8::is_ascii_whitespace) {
        return Err(OneShotError::InvalidJsonInput);
    }
    serde_json::from_slice::<serde_json::Value>(&contents)
        .map(|_| ())
        .map_err(|_| OneShotError::InvalidJsonInput)
}
