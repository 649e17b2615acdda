//! Diode Registry Binary
//!
//! Runs the registry in-process: scripted scenarios, JSON replays, config
//! presets and ticket signing for testing relay nodes.

#![allow(missing_docs)]

mod config;
mod replay;
mod sign;
mod simulate;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Diode registry tooling
#[derive(Debug, Parser)]
#[command(name = "diode", version, about = "Diode ticket accounting and staking registry")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the staking, ticket and reward scenarios against a fresh registry
    Simulate(simulate::SimulateArgs),
    /// Apply a JSON list of operations and print the receipts
    Replay(replay::ReplayArgs),
    /// Print or write a network preset
    Config(config::ConfigArgs),
    /// Sign a connection ticket and print its words
    SignTicket(sign::SignTicketArgs),
}

fn init_tracing() -> eyre::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| eyre::eyre!(err))
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    init_tracing()?;

    match Cli::parse().command {
        Command::Simulate(args) => simulate::run(args).await,
        Command::Replay(args) => replay::run(args),
        Command::Config(args) => config::run(args),
        Command::SignTicket(args) => sign::run(args),
    }
}
