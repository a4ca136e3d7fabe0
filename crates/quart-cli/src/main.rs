use std::process::ExitCode;

use clap::Parser;

use quart_cli::args::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    quart_cli::run::run(Cli::parse()).await
}
