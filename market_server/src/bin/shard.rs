//! History shard.
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use market_common::config::ShardConfig;
use market_common::logging::init_logger;
use market_common::net::{self, SHARD_PORTS};
use market_common::Result;
use market_server::listener;
use market_server::mock::shard::HistoryShard;

/// Shard arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Port to listen on.
    #[clap(long, default_value_t = SHARD_PORTS[0])]
    port: u16,

    /// Shard ID, used as the transaction id prefix.
    #[clap(long, default_value = "Shard-A")]
    id: String,

    /// Artificial processing delay in milliseconds (to demonstrate parallelism).
    #[clap(long, default_value_t = 100)]
    delay_ms: u64,
}

fn main() -> Result<()> {
    init_logger();
    let args = Args::parse();
    let config = ShardConfig {
        bind_addr: net::addr("0.0.0.0", args.port),
        id: args.id,
        delay: Duration::from_millis(args.delay_ms),
    };

    let listener = listener::bind(&config.bind_addr)?;
    let shutdown = listener::shutdown_signal()?;
    let shard = Arc::new(HistoryShard::new(config));
    log::info!(
        "History shard running on :{} with {} records (Delay: {}ms)",
        args.port,
        shard.records().len(),
        args.delay_ms
    );

    listener::serve(listener, shutdown, move |stream| shard.handle_connection(stream))
}
