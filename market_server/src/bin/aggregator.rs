//! Aggregator service.
//!
//! Every accepted connection triggers one scatter/gather over the core service and
//! the history shards; the combined result is written back as a single JSON object.
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use market_common::config::AggregatorConfig;
use market_common::logging::init_logger;
use market_common::net::{self, AGGREGATOR_PORT, CORE_PORT, SHARD_PORTS};
use market_common::Result;
use market_server::aggregator::Aggregator;
use market_server::listener;

/// Aggregator arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Port to listen on.
    #[clap(long, default_value_t = AGGREGATOR_PORT)]
    port: u16,

    /// Core quote service address.
    #[clap(long, default_value_t = net::addr("localhost", CORE_PORT))]
    core: String,

    /// History shard addresses, comma separated.
    #[clap(long, value_delimiter = ',', default_values_t = SHARD_PORTS.iter().map(|p| net::addr("localhost", *p)).collect::<Vec<_>>())]
    shards: Vec<String>,

    /// Connect and round-trip deadline per backend, in milliseconds.
    #[clap(long, default_value_t = 2000)]
    timeout_ms: u64,
}

fn main() -> Result<()> {
    init_logger();
    let args = Args::parse();
    let config = AggregatorConfig {
        bind_addr: net::addr("0.0.0.0", args.port),
        core_addr: args.core,
        shards: args.shards,
        request_timeout: Duration::from_millis(args.timeout_ms),
    };
    config.validate()?;

    let listener = listener::bind(&config.bind_addr)?;
    let shutdown = listener::shutdown_signal()?;
    let aggregator = Arc::new(Aggregator::new(config));
    log::info!("Aggregator Service running on :{}", args.port);

    listener::serve(listener, shutdown, move |stream| aggregator.handle_client(stream))
}
