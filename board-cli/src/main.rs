//! Binary crate for the `bvg-board` command-line tool.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Dispatching `nearby`, `show` and `watch`
//! - Exit codes and terminal output

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cmd = match cli::Cli::try_parse() {
        Ok(cmd) => cmd,
        Err(err) => {
            // --help and --version land here too.
            let code = if err.use_stderr() { cli::EXIT_INVALID } else { 0 };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    if let Err(err) = init_logging(cmd.verbose) {
        eprintln!("Error: {err:#}");
        return ExitCode::from(cli::EXIT_INVALID);
    }

    cmd.run().await
}

fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to initialise logging: {err}"))
}
