//! Command-line front end for a Gravity inference handler.
//!
//! Host binaries register their handler in a [`HandlerRegistry`] and hand it
//! to [`run`] together with the process arguments. Two subcommands are
//! available:
//!
//! - `run <INPUT> <OUTPUT>` executes the handler once and exits.
//! - `serve` starts the protocol server on the loopback interface.
//!
//! Help and version output exit with status 0. Every other failure is
//! written to stderr and exits with status 2.

mod cli;
mod errors;

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::error::ErrorKind;
use gravity_runtime::{ProtocolServer, RequestExecutor, initialise_telemetry, run_once};
use tokio::runtime::{Builder, Runtime};

pub use gravity_runtime::{HandlerOutcome, HandlerRegistry, HandlerResult, RegisteredHandler};

use crate::cli::{Cli, CliCommand};
use crate::errors::AppError;

/// Exit status for usage, validation, and execution failures.
pub const FAILURE_EXIT_CODE: u8 = 2;

/// Runs the CLI using the provided arguments, handler registry, and IO handles.
#[must_use]
pub fn run<I, W, E>(
    args: I,
    registry: Arc<HandlerRegistry>,
    stdout: &mut W,
    stderr: &mut E,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => return report_usage(&error, stdout, stderr),
    };

    match execute(cli, registry) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let _ = writeln!(stderr, "{error}");
            ExitCode::from(FAILURE_EXIT_CODE)
        }
    }
}

fn report_usage<W, E>(error: &clap::Error, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    W: Write,
    E: Write,
{
    let rendered = error.render();
    match error.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            let _ = write!(stdout, "{rendered}");
            ExitCode::SUCCESS
        }
        _ => {
            let _ = write!(stderr, "{rendered}");
            ExitCode::from(FAILURE_EXIT_CODE)
        }
    }
}

fn execute(cli: Cli, registry: Arc<HandlerRegistry>) -> Result<(), AppError> {
    let config = cli.config();
    config.validate()?;

    match cli.command {
        CliCommand::Run { input, output } => {
            initialise_telemetry(&config)?;
            let executor = RequestExecutor::new(registry);
            runtime()?.block_on(run_once(&executor, &input, &output))?;
        }
        CliCommand::Serve(_) => {
            let server = ProtocolServer::new(config.clone(), registry)?;
            initialise_telemetry(&config)?;
            runtime()?.block_on(server.run())?;
        }
    }
    Ok(())
}

fn runtime() -> Result<Runtime, AppError> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(AppError::Runtime)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use rstest::rstest;

    use super::*;

    fn copy_file(input: &Path, output: &Path) -> HandlerResult {
        fs::copy(input, output)?;
        Ok(HandlerOutcome::Success)
    }

    fn invoke(args: &[&str], registry: HandlerRegistry) -> (ExitCode, String, String) {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let args = std::iter::once("gravity")
            .chain(args.iter().copied())
            .map(OsString::from);
        let exit = run(args, Arc::new(registry), &mut stdout, &mut stderr);
        (
            exit,
            String::from_utf8(stdout).expect("utf8 stdout"),
            String::from_utf8(stderr).expect("utf8 stderr"),
        )
    }

    fn copy_registry() -> HandlerRegistry {
        HandlerRegistry::with_handler(RegisteredHandler::blocking(copy_file))
    }

    #[rstest]
    #[case(&["--help"])]
    #[case(&["--version"])]
    #[case(&["serve", "--help"])]
    fn help_and_version_succeed(#[case] args: &[&str]) {
        let (exit, stdout, _) = invoke(args, copy_registry());
        assert_eq!(exit, ExitCode::SUCCESS);
        assert!(!stdout.is_empty());
    }

    #[rstest]
    #[case(&["run", "only-input.csv"])]
    #[case(&["serve", "--port", "not-a-port"])]
    #[case(&["explode"])]
    fn usage_errors_exit_with_two(#[case] args: &[&str]) {
        let (exit, _, stderr) = invoke(args, copy_registry());
        assert_eq!(exit, ExitCode::from(FAILURE_EXIT_CODE));
        assert!(!stderr.is_empty());
    }

    #[test]
    fn port_zero_is_rejected_before_serving() {
        let (exit, _, stderr) = invoke(&["serve", "--port", "0"], copy_registry());
        assert_eq!(exit, ExitCode::from(FAILURE_EXIT_CODE));
        assert!(stderr.contains("invalid port 0"), "stderr: {stderr}");
    }

    #[test]
    fn serving_without_a_handler_fails() {
        let (exit, _, stderr) = invoke(&["serve"], HandlerRegistry::new());
        assert_eq!(exit, ExitCode::from(FAILURE_EXIT_CODE));
        assert!(
            stderr.contains("Request handler has not been registered."),
            "stderr: {stderr}"
        );
    }

    #[test]
    fn missing_input_fails_the_run() {
        let dir = tempfile::tempdir().expect("temp dir");
        let input = dir.path().join("absent.csv");
        let output = dir.path().join("out.csv");
        let (exit, _, stderr) = invoke(
            &[
                "run",
                input.to_str().expect("utf8 path"),
                output.to_str().expect("utf8 path"),
            ],
            copy_registry(),
        );
        assert_eq!(exit, ExitCode::from(FAILURE_EXIT_CODE));
        assert!(stderr.contains("Input file not found."), "stderr: {stderr}");
    }

    #[test]
    fn run_executes_the_handler_once() {
        let dir = tempfile::tempdir().expect("temp dir");
        let input = dir.path().join("in.csv");
        let output = dir.path().join("out.csv");
        fs::write(&input, "a,b\n").expect("write input");

        let (exit, _, stderr) = invoke(
            &[
                "run",
                input.to_str().expect("utf8 path"),
                output.to_str().expect("utf8 path"),
            ],
            copy_registry(),
        );

        assert_eq!(exit, ExitCode::SUCCESS, "stderr: {stderr}");
        assert_eq!(fs::read_to_string(&output).expect("read output"), "a,b\n");
    }
}
