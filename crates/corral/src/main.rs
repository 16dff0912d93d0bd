//! corral CLI - package pipelines across a cluster
//!
//! This is the main entry point for the corral command-line interface.

mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Init(args) => commands::init::run(args).await,
        Commands::Bootstrap(args) => commands::bootstrap::run(args).await,
        Commands::Config(cmd) => commands::config::run(cmd).await,
        Commands::Repo(cmd) => commands::repo::run(cmd).await,
        Commands::Hostfile(cmd) => commands::hostfile::run(cmd).await,
        Commands::Rg(cmd) => commands::rg::run(cmd).await,
        Commands::Ppl(cmd) => commands::ppl::run(cmd).await,
        Commands::Reset(args) => commands::reset::run(args).await,
    }
}

/// Initialize tracing with appropriate verbosity
fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            // Lifecycle progress is logged at info
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}
