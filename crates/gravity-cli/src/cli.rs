//! Command-line argument definitions.

use std::path::PathBuf;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use gravity_config::{Config, DEFAULT_DEBUG_LOG, DEFAULT_LOG_FILTER, DEFAULT_PORT, LogFormat};

/// Command-line interface for a Gravity inference handler.
#[derive(Parser, Debug)]
#[command(name = "gravity", version, disable_help_subcommand = true)]
pub(crate) struct Cli {
    /// `tracing` filter expression for stderr logging.
    #[arg(long, global = true, default_value = DEFAULT_LOG_FILTER)]
    pub(crate) log_filter: String,
    /// Stderr log format (`compact` or `json`).
    #[arg(long, global = true, default_value_t = LogFormat::Compact)]
    pub(crate) log_format: LogFormat,
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum CliCommand {
    /// Runs the handler once over an input file.
    Run {
        /// File the handler reads.
        #[arg(value_name = "INPUT")]
        input: PathBuf,
        /// File the handler must produce.
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,
    },
    /// Serves requests over a loopback WebSocket.
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
pub(crate) struct ServeArgs {
    /// Port to listen on.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub(crate) port: u16,
    /// Runs under a supervisor: emits status lines on stdout and exits when
    /// no clients connect for 30 seconds.
    #[arg(long)]
    pub(crate) managed: bool,
    /// Appends debug diagnostics to the debug log.
    #[arg(long)]
    pub(crate) debug: bool,
    /// Location of the debug log.
    #[arg(long, default_value = DEFAULT_DEBUG_LOG)]
    pub(crate) debug_log: Utf8PathBuf,
}

impl Cli {
    /// Resolves the flags into a configuration record.
    pub(crate) fn config(&self) -> Config {
        let mut config = Config {
            log_filter: self.log_filter.clone(),
            log_format: self.log_format,
            ..Config::default()
        };
        if let CliCommand::Serve(serve) = &self.command {
            config.port = serve.port;
            config.managed = serve.managed;
            config.debug = serve.debug;
            config.debug_log = serve.debug_log.clone();
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("gravity").chain(args.iter().copied()))
            .expect("arguments parse")
    }

    #[test]
    fn serve_defaults_match_the_service_defaults() {
        let config = parse(&["serve"]).config();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn serve_flags_reach_the_config() {
        let config = parse(&[
            "serve",
            "--port",
            "5123",
            "--managed",
            "--debug",
            "--log-format",
            "json",
        ])
        .config();
        assert_eq!(config.port, 5123);
        assert!(config.managed);
        assert!(config.debug);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn run_takes_two_positional_paths() {
        let cli = parse(&["run", "in.csv", "out.csv"]);
        assert!(matches!(
            cli.command,
            CliCommand::Run { ref input, ref output }
                if input == &PathBuf::from("in.csv") && output == &PathBuf::from("out.csv")
        ));
    }

    #[rstest]
    #[case(&["run", "in.csv"])]
    #[case(&["serve", "--port", "70000"])]
    #[case(&["serve", "--log-format", "pretty"])]
    #[case(&[])]
    fn invalid_arguments_are_usage_errors(#[case] args: &[&str]) {
        let result = Cli::try_parse_from(std::iter::once("gravity").chain(args.iter().copied()));
        assert!(result.is_err());
    }
}
