//! Core quote service.
//!
//! Answers `REQ_QUOTE` from the aggregator by calling the external quote source through
//! a circuit breaker, then forwards each quote to the broker on its symbol's topic.
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use market_common::config::{BreakerConfig, CoreConfig, PublisherConfig};
use market_common::logging::init_logger;
use market_common::net::{self, BROKER_PORT, CORE_PORT, EXTERNAL_PORT};
use market_common::Result;
use market_server::core_service::QuoteCore;
use market_server::listener;

/// Core service arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Port to listen on.
    #[clap(long, default_value_t = CORE_PORT)]
    port: u16,

    /// External quote source address.
    #[clap(long, default_value_t = net::addr("localhost", EXTERNAL_PORT))]
    upstream: String,

    /// Broker address.
    #[clap(long, default_value_t = net::addr("localhost", BROKER_PORT))]
    broker: String,

    /// Connect and round-trip deadline for the upstream call, in milliseconds.
    #[clap(long, default_value_t = 2000)]
    upstream_timeout_ms: u64,

    /// Consecutive failures that open the circuit.
    #[clap(long, default_value_t = 3)]
    threshold: u32,

    /// Cooldown before an open circuit lets a probe through, in milliseconds.
    #[clap(long, default_value_t = 5000)]
    reset_timeout_ms: u64,

    /// Allow a single probe while half-open and reject concurrent callers.
    #[clap(long)]
    single_probe: bool,

    /// Dial timeout for the broker link, in milliseconds.
    #[clap(long, default_value_t = 500)]
    broker_dial_timeout_ms: u64,
}

fn main() -> Result<()> {
    init_logger();
    let args = Args::parse();
    let config = CoreConfig {
        bind_addr: net::addr("0.0.0.0", args.port),
        upstream_addr: args.upstream,
        upstream_timeout: Duration::from_millis(args.upstream_timeout_ms),
        breaker: BreakerConfig {
            threshold: args.threshold,
            reset_timeout: Duration::from_millis(args.reset_timeout_ms),
            single_probe: args.single_probe,
        },
        publisher: PublisherConfig {
            broker_addr: args.broker,
            dial_timeout: Duration::from_millis(args.broker_dial_timeout_ms),
        },
    };
    config.validate()?;

    let listener = listener::bind(&config.bind_addr)?;
    let shutdown = listener::shutdown_signal()?;
    let core = Arc::new(QuoteCore::new(config));

    {
        let core = Arc::clone(&core);
        thread::spawn(move || core.healthcheck());
    }
    log::info!("Core Service running on :{}", args.port);

    listener::serve(listener, shutdown, move |stream| core.handle_connection(stream))
}
