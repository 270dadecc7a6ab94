//! `saml`: metadata, decoding, configuration checks and an in-process
//! login simulation for the SSO engines.

#![forbid(unsafe_code)]

use clap::Parser;
use saml_cli::{
    cli::{Cli, Command},
    commands::{run_check, run_decode, run_metadata, run_simulate},
    output::error,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match &cli.command {
        Command::Metadata(args) => run_metadata(args),
        Command::Decode(args) => run_decode(args, cli.output),
        Command::Check(args) => run_check(args),
        Command::Simulate(args) => run_simulate(args, cli.output),
    };

    if let Err(e) = result {
        error(&e.to_string());
        std::process::exit(e.exit_code());
    }
}
