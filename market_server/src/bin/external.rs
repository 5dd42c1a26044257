//! Mock external quote source with injected failures and latency.
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use market_common::config::ExternalConfig;
use market_common::logging::init_logger;
use market_common::net::{self, EXTERNAL_PORT};
use market_common::Result;
use market_server::listener;
use market_server::mock::external::ExternalQuoteSource;

/// External mock arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Port to listen on.
    #[clap(long, default_value_t = EXTERNAL_PORT)]
    port: u16,

    /// Symbol to quote.
    #[clap(long, default_value = "PETR4")]
    symbol: String,

    /// Probability of dropping the connection instead of answering.
    #[clap(long, default_value_t = 0.2)]
    failure_rate: f64,

    /// Probability of answering late.
    #[clap(long, default_value_t = 0.2)]
    delay_rate: f64,

    /// Delay for late answers, in milliseconds.
    #[clap(long, default_value_t = 2000)]
    delay_ms: u64,
}

fn main() -> Result<()> {
    init_logger();
    let args = Args::parse();
    let config = ExternalConfig {
        bind_addr: net::addr("0.0.0.0", args.port),
        symbol: args.symbol,
        failure_rate: args.failure_rate,
        delay_rate: args.delay_rate,
        delay: Duration::from_millis(args.delay_ms),
    };
    config.validate()?;

    let listener = listener::bind(&config.bind_addr)?;
    let shutdown = listener::shutdown_signal()?;
    let source = Arc::new(ExternalQuoteSource::new(config));
    log::info!("External Quote Service (Mock) running on :{}", args.port);

    listener::serve(listener, shutdown, move |stream| source.handle_connection(stream))
}
