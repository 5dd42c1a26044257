//! Scatter/gather over the current-value backend and the history shards.
//!
//! Every backend call runs on its own scoped thread with its own connect and
//! round-trip deadline, so the whole request takes roughly as long as the slowest
//! backend (capped by the deadline), not the sum. Each thread records its outcome in
//! the shared result under one mutex. Failures are kept as labelled strings; the
//! aggregate call itself never fails.
use std::net::TcpStream;
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use log::{info, warn};
use market_common::config::AggregatorConfig;
use market_common::model::{AggregatedResult, Quote, Transaction};
use market_common::{Envelope, MessageType, Result, net, protocol};

/// One fan-out target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// The current-value (quote) service.
    Core(String),
    /// A history shard.
    Shard(String),
}

impl Backend {
    /// Prefix used for this backend's entries in `AggregatedResult::errors`.
    pub fn label(&self) -> String {
        match self {
            Backend::Core(_) => String::from("Core"),
            Backend::Shard(addr) => format!("Shard({})", addr),
        }
    }
}

enum Outcome {
    Quote(Quote),
    History(Vec<Transaction>),
}

/// Scatter/gather coordinator.
pub struct Aggregator {
    config: AggregatorConfig,
}

impl Aggregator {
    /// Creates an aggregator over the configured backends.
    pub fn new(config: AggregatorConfig) -> Self {
        Self { config }
    }

    /// The backends one `aggregate` call fans out to, core first.
    pub fn backends(&self) -> Vec<Backend> {
        std::iter::once(Backend::Core(self.config.core_addr.clone()))
            .chain(self.config.shards.iter().cloned().map(Backend::Shard))
            .collect()
    }

    /// Queries every backend in parallel and joins on all of them.
    pub fn aggregate(&self) -> AggregatedResult {
        let started = Instant::now();
        let result = Mutex::new(AggregatedResult::default());
        let backends = self.backends();
        let timeout = self.config.request_timeout;

        thread::scope(|scope| {
            for backend in &backends {
                let result = &result;
                scope.spawn(move || {
                    let outcome = fetch(backend, timeout);
                    record(result, backend, outcome);
                });
            }
        });

        let result = result.into_inner().unwrap_or_else(PoisonError::into_inner);
        info!(
            "Scatter/Gather finished in {:?}. Errors: {}",
            started.elapsed(),
            result.errors.len()
        );
        result
    }

    /// Answers one client connection with a fresh aggregated result.
    pub fn handle_client(&self, stream: TcpStream) -> Result<()> {
        info!("Received client request, starting Scatter/Gather...");
        let result = self.aggregate();
        protocol::write_json(&stream, &result)
    }
}

fn fetch(backend: &Backend, timeout: Duration) -> Result<Outcome> {
    match backend {
        Backend::Core(addr) => fetch_quote(addr, timeout).map(Outcome::Quote),
        Backend::Shard(addr) => fetch_history(addr, timeout).map(Outcome::History),
    }
}

fn record(result: &Mutex<AggregatedResult>, backend: &Backend, outcome: Result<Outcome>) {
    let mut result = result.lock().unwrap_or_else(PoisonError::into_inner);
    match outcome {
        Ok(Outcome::Quote(quote)) => result.current_price = quote,
        Ok(Outcome::History(mut txs)) => result.history.append(&mut txs),
        Err(e) => {
            let message = format!("{}: {}", backend.label(), e);
            warn!("Error fetching from backend: {}", message);
            result.errors.push(message);
        }
    }
}

/// Asks the quote service at `addr` for the current price.
pub fn fetch_quote(addr: &str, timeout: Duration) -> Result<Quote> {
    net::request(addr, &Envelope::new(MessageType::RequestQuote), timeout)?
        .expect(MessageType::RespQuote)?
        .decode_payload()
}

/// Asks the shard at `addr` for its transaction history.
pub fn fetch_history(addr: &str, timeout: Duration) -> Result<Vec<Transaction>> {
    net::request(addr, &Envelope::new(MessageType::RequestHistory), timeout)?
        .expect(MessageType::RespHistory)?
        .decode_payload()
}
