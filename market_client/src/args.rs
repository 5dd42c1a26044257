//! Command-line arguments for the market client.
//!
//! This module defines the CLI interface using `clap`. See `main` for end-to-end usage.
use clap::{Parser, ValueEnum};
use market_common::net::{self, AGGREGATOR_PORT, BROKER_PORT};

/// What the client does once connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Fetch one aggregated response and print it.
    Aggregator,
    /// Subscribe to a topic and print every update.
    Subscribe,
}

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Client mode.
    #[clap(long, value_enum, default_value_t = Mode::Aggregator)]
    pub mode: Mode,

    /// Aggregator address used in `aggregator` mode.
    #[clap(long, default_value_t = net::addr("localhost", AGGREGATOR_PORT))]
    pub aggregator: String,

    /// Broker address used in `subscribe` mode.
    #[clap(long, default_value_t = net::addr("localhost", BROKER_PORT))]
    pub broker: String,

    /// Topic to subscribe to.
    #[clap(long, default_value = "PETR4")]
    pub topic: String,
}
