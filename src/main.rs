mod cli;
mod commands;
mod config;
mod engine;
mod error;
mod fingerprint;
mod lockfile;
mod logging;
mod meta;
mod registry;
mod report;
mod sources;
mod store;
mod transform;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use crate::cli::Cli;

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            error!(error = %err, "command failed");
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;

    let cwd = std::env::current_dir().context("failed to get current working directory")?;
    info!(cwd = %cwd.display(), "starting command");

    commands::execute(&cwd, cli.command)
}
