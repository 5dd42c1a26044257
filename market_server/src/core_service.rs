//! Current-value quote service.
//!
//! Answers `REQ_QUOTE` by calling the external quote source through a circuit breaker.
//! A successful quote is returned to the caller first and then forwarded to the broker
//! on the topic named after its symbol; a failed forward is only logged because the
//! broker is a side channel.
use std::net::TcpStream;
use std::time::Duration;

use log::{info, warn};
use market_common::config::CoreConfig;
use market_common::model::Quote;
use market_common::{Envelope, MessageType, Result, protocol};
use serde_json::Value;

use crate::aggregator::fetch_quote;
use crate::circuit_breaker::CircuitBreaker;
use crate::publisher::ReconnectingPublisher;

/// Topic used for the startup reachability publish.
pub const HEALTHCHECK_TOPIC: &str = "healthcheck";

/// Quote service state shared by all connection threads.
pub struct QuoteCore {
    upstream_addr: String,
    upstream_timeout: Duration,
    breaker: CircuitBreaker,
    publisher: ReconnectingPublisher,
}

impl QuoteCore {
    /// Builds the breaker and publisher from `config`. Nothing is dialed yet.
    pub fn new(config: CoreConfig) -> Self {
        Self {
            breaker: CircuitBreaker::new("Core", config.breaker),
            publisher: ReconnectingPublisher::new(config.publisher),
            upstream_addr: config.upstream_addr,
            upstream_timeout: config.upstream_timeout,
        }
    }

    /// The breaker guarding the upstream call.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Fetches the current quote from upstream, through the breaker.
    pub fn current_quote(&self) -> Result<Quote> {
        self.breaker
            .execute(|| fetch_quote(&self.upstream_addr, self.upstream_timeout))
    }

    /// Best-effort publish used at startup to find out early whether the broker is up.
    pub fn healthcheck(&self) {
        if let Err(e) = self.publisher.publish(HEALTHCHECK_TOPIC, Value::Null) {
            warn!("Initial broker check failed (will retry on demand): {}", e);
        }
    }

    /// Serves one request on `stream`.
    pub fn handle_connection(&self, stream: TcpStream) -> Result<()> {
        let request = protocol::receive(&stream)?;
        if request.kind != MessageType::RequestQuote {
            warn!("Ignoring unsupported request {}", request.kind);
            return Ok(());
        }

        let quote = match self.current_quote() {
            Ok(quote) => quote,
            Err(e) => return protocol::send(&stream, &Envelope::error(e.to_string())),
        };

        protocol::send(&stream, &Envelope::with_payload(MessageType::RespQuote, &quote)?)?;
        self.forward(&quote);
        Ok(())
    }

    fn forward(&self, quote: &Quote) {
        let outcome = serde_json::to_value(quote)
            .map_err(Into::into)
            .and_then(|payload| self.publisher.publish(&quote.symbol, payload));
        match outcome {
            Ok(()) => info!("Published {} to broker", quote.symbol),
            Err(e) => warn!("Failed to publish quote {}: {}", quote.symbol, e),
        }
    }
}
