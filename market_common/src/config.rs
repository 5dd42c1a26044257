//! Service configuration.
//!
//! Every service receives one of these structs, built once in `main` from command-line
//! arguments and handed to the component constructors. Nothing here is global.
use std::time::Duration;

use crate::error::ServiceError;
use crate::net::{self, AGGREGATOR_PORT, BROKER_PORT, CORE_PORT, EXTERNAL_PORT, SHARD_PORTS};
use crate::result::Result;

/// Circuit breaker tuning.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    pub threshold: u32,
    /// Cooldown before an open circuit lets a probe through.
    pub reset_timeout: Duration,
    /// Allow exactly one probe while half-open and reject concurrent callers.
    pub single_probe: bool,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 3,
            reset_timeout: Duration::from_secs(5),
            single_probe: false,
        }
    }
}

impl BreakerConfig {
    /// Rejects a zero threshold.
    pub fn validate(&self) -> Result<()> {
        if self.threshold == 0 {
            return Err(ServiceError::Config("breaker threshold must be > 0".into()));
        }
        Ok(())
    }
}

/// Outbound link to the broker.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Broker ingress address.
    pub broker_addr: String,
    /// Dial timeout for the first connection and the reconnect.
    pub dial_timeout: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            broker_addr: net::addr("localhost", BROKER_PORT),
            dial_timeout: Duration::from_millis(500),
        }
    }
}

/// Broker process settings.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Listen address.
    pub bind_addr: String,
    /// Write timeout applied to each subscriber connection; bounds one delivery.
    pub delivery_timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bind_addr: net::addr("0.0.0.0", BROKER_PORT),
            delivery_timeout: Duration::from_secs(2),
        }
    }
}

/// Core quote service settings.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Listen address.
    pub bind_addr: String,
    /// External quote source address.
    pub upstream_addr: String,
    /// Connect and round-trip deadline for the upstream call.
    pub upstream_timeout: Duration,
    /// Breaker guarding the upstream call.
    pub breaker: BreakerConfig,
    /// Link used to forward quotes to the broker.
    pub publisher: PublisherConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            bind_addr: net::addr("0.0.0.0", CORE_PORT),
            upstream_addr: net::addr("localhost", EXTERNAL_PORT),
            upstream_timeout: Duration::from_secs(2),
            breaker: BreakerConfig::default(),
            publisher: PublisherConfig::default(),
        }
    }
}

impl CoreConfig {
    /// Rejects a zero upstream deadline or an invalid breaker.
    pub fn validate(&self) -> Result<()> {
        if self.upstream_timeout.is_zero() {
            return Err(ServiceError::Config("upstream timeout must be > 0".into()));
        }
        self.breaker.validate()
    }
}

/// History shard settings.
#[derive(Debug, Clone)]
pub struct ShardConfig {
    /// Listen address.
    pub bind_addr: String,
    /// Shard identifier, used as the transaction id prefix.
    pub id: String,
    /// Artificial processing delay per request.
    pub delay: Duration,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            bind_addr: net::addr("0.0.0.0", SHARD_PORTS[0]),
            id: String::from("Shard-A"),
            delay: Duration::from_millis(100),
        }
    }
}

/// Mock external quote source settings.
#[derive(Debug, Clone)]
pub struct ExternalConfig {
    /// Listen address.
    pub bind_addr: String,
    /// Symbol quoted by the mock.
    pub symbol: String,
    /// Probability of dropping the connection instead of answering.
    pub failure_rate: f64,
    /// Probability of answering only after `delay`.
    pub delay_rate: f64,
    /// Delay applied to slow answers.
    pub delay: Duration,
}

impl Default for ExternalConfig {
    fn default() -> Self {
        Self {
            bind_addr: net::addr("0.0.0.0", EXTERNAL_PORT),
            symbol: String::from("PETR4"),
            failure_rate: 0.2,
            delay_rate: 0.2,
            delay: Duration::from_secs(2),
        }
    }
}

impl ExternalConfig {
    /// Rejects rates outside `[0, 1]` or summing above 1.
    pub fn validate(&self) -> Result<()> {
        let in_range = |r: f64| (0.0..=1.0).contains(&r);
        if !in_range(self.failure_rate) || !in_range(self.delay_rate) {
            return Err(ServiceError::Config("rates must be within [0, 1]".into()));
        }
        if self.failure_rate + self.delay_rate > 1.0 {
            return Err(ServiceError::Config("failure_rate + delay_rate must be <= 1".into()));
        }
        Ok(())
    }
}

/// Aggregator settings.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Listen address.
    pub bind_addr: String,
    /// Current-value backend address.
    pub core_addr: String,
    /// History shard addresses, one fan-out task each.
    pub shards: Vec<String>,
    /// Connect and round-trip deadline applied to every backend call.
    pub request_timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: net::addr("0.0.0.0", AGGREGATOR_PORT),
            core_addr: net::addr("localhost", CORE_PORT),
            shards: SHARD_PORTS.iter().map(|p| net::addr("localhost", *p)).collect(),
            request_timeout: Duration::from_secs(2),
        }
    }
}

impl AggregatorConfig {
    /// Rejects an empty shard list or a zero deadline.
    pub fn validate(&self) -> Result<()> {
        if self.shards.is_empty() {
            return Err(ServiceError::Config("at least one shard is required".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(ServiceError::Config("request timeout must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(CoreConfig::default().validate().is_ok());
        assert!(AggregatorConfig::default().validate().is_ok());
        assert!(ExternalConfig::default().validate().is_ok());
        assert_eq!(AggregatorConfig::default().shards.len(), 3);
    }

    #[test]
    fn rejects_zero_threshold() {
        let config = BreakerConfig {
            threshold: 0,
            ..BreakerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ServiceError::Config(_))));
    }

    #[test]
    fn rejects_empty_shards() {
        let config = AggregatorConfig {
            shards: Vec::new(),
            ..AggregatorConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
