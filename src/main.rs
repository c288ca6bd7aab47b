mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command, commands};
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Command::Merge {
            shards,
            discard,
            no_finalize,
            no_vacuum,
        } => commands::merge(shards, *discard, *no_finalize, *no_vacuum),
        Command::Validate { shards } => commands::validate(shards),
        Command::Finalize { database, config } => commands::finalize(database, config.as_ref()),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "shardmerge=debug" } else { "shardmerge=info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
