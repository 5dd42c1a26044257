//! Value records exchanged between services.
//!
//! `Quote` and `Transaction` travel inside envelope payloads; `AggregatedResult` is the
//! record the aggregator returns to its clients.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Priced instrument snapshot.
///
/// `Default` is the zero value the aggregator reports when no price is available.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Instrument symbol, also used as the broker topic.
    pub symbol: String,
    /// Last price.
    pub price: f64,
    /// Time the quote was produced.
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    /// Creates a quote stamped with the current time.
    pub fn now(symbol: &str, price: f64) -> Self {
        Quote {
            symbol: symbol.to_string(),
            price,
            timestamp: Utc::now(),
        }
    }

    /// Returns `true` for the zero-valued quote.
    pub fn is_empty(&self) -> bool {
        self.symbol.is_empty()
    }
}

/// One historical trade record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Record identifier, unique within its shard.
    pub id: String,
    /// Instrument symbol.
    pub symbol: String,
    /// Execution price.
    pub price: f64,
    /// Executed quantity.
    pub quantity: i64,
    /// Execution time.
    pub timestamp: DateTime<Utc>,
}

/// Partial-success response built by one scatter/gather.
///
/// `history` is in completion order, not backend order. `errors` holds one entry per
/// failed backend, prefixed with that backend's label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    /// Current price, or the zero quote when the current-value backend failed.
    pub current_price: Quote,
    /// Concatenated history from every shard that answered.
    #[serde(default)]
    pub history: Vec<Transaction>,
    /// Labelled failures.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}
