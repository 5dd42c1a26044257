//! Publish/subscribe broker.
//!
//! Subscribers send `SUBSCRIBE <topic>` and keep the connection open; publishers send
//! `PUBLISH <topic>` envelopes that are fanned out to every subscriber of that topic.
//! Subscribers whose delivery fails are dropped.
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use market_common::config::BrokerConfig;
use market_common::logging::init_logger;
use market_common::net::{self, BROKER_PORT};
use market_common::Result;
use market_server::broker::Broker;
use market_server::listener;

/// Broker arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Port to listen on.
    #[clap(long, default_value_t = BROKER_PORT)]
    port: u16,

    /// Write timeout for one delivery to a subscriber, in milliseconds.
    #[clap(long, default_value_t = 2000)]
    delivery_timeout_ms: u64,
}

fn main() -> Result<()> {
    init_logger();
    let args = Args::parse();
    let config = BrokerConfig {
        bind_addr: net::addr("0.0.0.0", args.port),
        delivery_timeout: Duration::from_millis(args.delivery_timeout_ms),
    };

    let listener = listener::bind(&config.bind_addr)?;
    let shutdown = listener::shutdown_signal()?;
    let broker = Arc::new(Broker::new(config));
    log::info!("Broker Service running on :{}", args.port);

    listener::serve(listener, shutdown, move |stream| broker.handle_connection(stream))
}
