//! Mock history shard.
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use log::{info, warn};
use market_common::config::ShardConfig;
use market_common::model::Transaction;
use market_common::{Envelope, MessageType, Result, protocol};

/// Symbol every generated transaction is booked under.
pub const SHARD_SYMBOL: &str = "PETR4";
/// Records generated per shard.
pub const SHARD_RECORDS: usize = 10;

/// Generates `count` transactions for `shard_id`, newest first, one hour apart.
pub fn generate_history(shard_id: &str, count: usize) -> Vec<Transaction> {
    let now = Utc::now();
    (0..count)
        .map(|i| Transaction {
            id: format!("{}-{}", shard_id, i),
            symbol: SHARD_SYMBOL.to_string(),
            price: 20.0 + i as f64,
            quantity: 100 * (i as i64 + 1),
            timestamp: now - chrono::Duration::hours(i as i64),
        })
        .collect()
}

/// In-memory history partition.
pub struct HistoryShard {
    id: String,
    delay: Duration,
    records: Vec<Transaction>,
}

impl HistoryShard {
    /// Creates the shard and fills it with generated records.
    pub fn new(config: ShardConfig) -> Self {
        let records = generate_history(&config.id, SHARD_RECORDS);
        Self {
            id: config.id,
            delay: config.delay,
            records,
        }
    }

    /// Stored records.
    pub fn records(&self) -> &[Transaction] {
        &self.records
    }

    /// Serves one `REQ_HIST` on `stream` after the artificial delay.
    pub fn handle_connection(&self, stream: TcpStream) -> Result<()> {
        let request = protocol::receive(&stream)?;
        if request.kind != MessageType::RequestHistory {
            warn!("[{}] Ignoring unsupported request {}", self.id, request.kind);
            return Ok(());
        }

        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }

        let reply = Envelope::with_payload(MessageType::RespHistory, &self.records)?;
        protocol::send(&stream, &reply)?;
        info!("[{}] Served history request (latency: {:?})", self.id, self.delay);
        Ok(())
    }
}
