//! Reference service binary whose handler copies the input file to the
//! output path.

use std::fs;
use std::io;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use gravity_cli::{HandlerOutcome, HandlerRegistry, HandlerResult, RegisteredHandler};

fn copy_file(input: &Path, output: &Path) -> HandlerResult {
    fs::copy(input, output).with_context(|| {
        format!(
            "failed to copy {} to {}",
            input.display(),
            output.display()
        )
    })?;
    Ok(HandlerOutcome::Success)
}

fn main() -> ExitCode {
    let registry = HandlerRegistry::with_handler(RegisteredHandler::blocking(copy_file));
    gravity_cli::run(
        std::env::args_os(),
        Arc::new(registry),
        &mut io::stdout(),
        &mut io::stderr(),
    )
}
