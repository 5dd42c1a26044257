//! Mock external quote source.
//!
//! Serves `REQ_QUOTE` in a loop on each connection. For every request it rolls once:
//! below `failure_rate` it drops the connection, below `failure_rate + delay_rate` it
//! answers late, and otherwise it answers at once with a random price in `[20, 30)`.
use std::net::TcpStream;
use std::thread;

use log::{debug, info};
use market_common::config::ExternalConfig;
use market_common::model::Quote;
use market_common::{Envelope, MessageType, Result, ServiceError, protocol};
use rand::Rng;

/// What the mock does with one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Close the connection without answering.
    Drop,
    /// Answer after the configured delay.
    Delayed,
    /// Answer immediately.
    Immediate,
}

/// Chaotic quote generator.
pub struct ExternalQuoteSource {
    config: ExternalConfig,
}

impl ExternalQuoteSource {
    /// Creates the mock from `config`.
    pub fn new(config: ExternalConfig) -> Self {
        Self { config }
    }

    /// Maps a uniform roll in `[0, 1)` to a reply.
    pub fn decide(&self, roll: f64) -> Reply {
        if roll < self.config.failure_rate {
            Reply::Drop
        } else if roll < self.config.failure_rate + self.config.delay_rate {
            Reply::Delayed
        } else {
            Reply::Immediate
        }
    }

    /// Builds a fresh quote for the configured symbol.
    pub fn next_quote(&self) -> Quote {
        let mut rng = rand::rng();
        Quote::now(&self.config.symbol, 20.0 + rng.random_range(0.0..10.0))
    }

    /// Serves requests on `stream` until the peer disconnects or a drop is rolled.
    pub fn handle_connection(&self, stream: TcpStream) -> Result<()> {
        loop {
            let request = match protocol::receive(&stream) {
                Ok(request) => request,
                Err(ServiceError::ConnectionClosed) => return Ok(()),
                Err(e) => return Err(e),
            };
            if request.kind != MessageType::RequestQuote {
                debug!("Ignoring {}", request.kind);
                continue;
            }

            match self.decide(rand::rng().random::<f64>()) {
                Reply::Drop => {
                    info!("Simulating failure...");
                    return Ok(());
                }
                Reply::Delayed => {
                    info!("Simulating slow answer ({:?})", self.config.delay);
                    thread::sleep(self.config.delay);
                }
                Reply::Immediate => {}
            }

            let reply = Envelope::with_payload(MessageType::RespQuote, &self.next_quote())?;
            protocol::send(&stream, &reply)?;
        }
    }
}
