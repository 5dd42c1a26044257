//! Market Client — talks to the aggregator or the broker.
//!
//! - `--mode aggregator` connects to the aggregator, which answers every connection with
//!   one aggregated JSON response, and pretty-prints it.
//! - `--mode subscribe` sends a `SUBSCRIBE` for `--topic` to the broker and logs every
//!   published update until Ctrl+C.
//!
//! Usage example (CLI):
//! ```bash
//! market_client --mode subscribe --broker 127.0.0.1:8081 --topic PETR4
//! ```
#![warn(missing_docs)]
mod args;

use crate::args::{Args, Mode};
use clap::Parser;
use log::{info, warn};
use market_common::logging::init_logger;
use market_common::model::AggregatedResult;
use market_common::{Envelope, MessageType, Result, ServiceError, protocol};
use std::net::{Shutdown, TcpStream};

fn run_aggregator_client(addr: &str) -> Result<()> {
    info!("Requesting Aggregated Data from {}...", addr);
    let stream = TcpStream::connect(addr).map_err(|e| ServiceError::Connection {
        peer: addr.to_string(),
        source: e,
    })?;

    let response: AggregatedResult = protocol::read_json(&stream)?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    if !response.errors.is_empty() {
        warn!("Partial response: {} backend(s) failed", response.errors.len());
    }
    Ok(())
}

fn run_subscriber(addr: &str, topic: &str) -> Result<()> {
    let stream = TcpStream::connect(addr).map_err(|e| ServiceError::Connection {
        peer: addr.to_string(),
        source: e,
    })?;

    // Closing the socket from the signal handler unblocks the read loop below.
    let closer = stream.try_clone()?;
    ctrlc::set_handler(move || {
        info!("Ctrl+C received. Shutting down client...");
        let _ = closer.shutdown(Shutdown::Both);
    })
    .map_err(|e| ServiceError::Signal(e.to_string()))?;

    protocol::send(&stream, &Envelope::subscribe(topic))?;
    info!("Subscribed to {}. Waiting for updates...", topic);

    loop {
        match protocol::receive(&stream) {
            Ok(envelope) if envelope.kind == MessageType::Publish => {
                let payload = envelope.payload.unwrap_or_default();
                info!("Received Update: {}", payload);
            }
            Ok(envelope) => warn!("Ignoring {}", envelope.kind),
            Err(ServiceError::ConnectionClosed) => {
                info!("Connection closed");
                return Ok(());
            }
            Err(e) => return Err(e),
        }
    }
}

fn main() -> Result<()> {
    init_logger();
    let args = Args::parse();

    match args.mode {
        Mode::Aggregator => run_aggregator_client(&args.aggregator),
        Mode::Subscribe => run_subscriber(&args.broker, &args.topic),
    }
}
