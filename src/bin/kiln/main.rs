//! kiln CLI - generate Make, Ninja or MSBuild files from a kiln.toml

use std::io::IsTerminal;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    let color = !cli.no_color && std::io::stderr().is_terminal();

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            kiln::util::diagnostic::emit(&kiln::error::diagnose(&e), color);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("kiln=debug")
    } else {
        EnvFilter::new("kiln=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    // Execute command
    match cli.command {
        Commands::Configure(args) => commands::configure::execute(args).map(|_| 0),
        Commands::Refresh(args) => commands::refresh::execute(args).map(|_| 0),
        Commands::Check(args) => commands::check::execute(args),
        Commands::Backends(args) => commands::backends::execute(args).map(|_| 0),
    }
}
