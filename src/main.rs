//! pcapherd CLI entry point.

mod cli;

use anyhow::Result;
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use cli::{Args, Command};

fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let filter = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    // One interrupt cancels the governing scope; every worker observes it
    // at its next suspension point.
    let (canceller, token) = pcapherd_core::cancel_pair();
    ctrlc::set_handler(move || {
        canceller.cancel();
    })?;

    let result = match args.command {
        Command::Map(args) => cli::map::run(args, &token),
        Command::Replay(args) => cli::replay::run(args, &token),
        Command::Filter(args) => cli::filter::run(args, &token),
        Command::Eve2Filter(args) => cli::eve2filter::run(args),
        Command::TarExtract(args) => cli::tar_extract::run(args),
        Command::ExampleConfig => cli::example_config::run(),
        Command::Version => {
            println!("pcapherd {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    };

    // An operator interrupt is a clean stop, not a failure.
    match result {
        Err(e) => match e.downcast_ref::<pcapherd_core::Error>() {
            Some(core) if core.is_early_exit() => {
                warn!("interrupted, stopping early");
                Ok(())
            }
            _ => Err(e),
        },
        ok => ok,
    }
}
