use clap::Parser;
use std::io;
use std::process::ExitCode;
use studyhub_core::CoreError;
use tokio::runtime::Runtime;
use tracing::error;
use tracing_subscriber::EnvFilter;

use studyhub_app::cli::commands::run_cli;
use studyhub_app::cli::opts::{Cli, Command};

fn main() -> ExitCode {
    let args = Cli::parse();

    // Interactive commands own the terminal, so they only log warnings unless
    // RUST_LOG says otherwise. Logs always go to stderr.
    let default_level = match args.cmd {
        Command::Api(_) => "info",
        _ => "warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let result = Runtime::new()
        .map_err(anyhow::Error::from)
        .and_then(|rt| rt.block_on(run_cli(args)));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = format!("{e:#}"), "command failed");
            match e.downcast_ref::<CoreError>() {
                Some(core) => eprintln!("error: {}", core.public_message()),
                None => eprintln!("error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}
