//! Publish/subscribe broker.
//!
//! - `registry` — topic → subscriber handles, with snapshot broadcast and self-healing.
//! - `subscriber` — the TCP implementation of a subscriber handle.
//!
//! `Broker` runs one read loop per connection: `SUBSCRIBE` registers the connection under
//! a topic, `PUBLISH` broadcasts the envelope to that topic. A connection may do both.
pub mod registry;
pub mod subscriber;

use std::net::TcpStream;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, info, warn};
use market_common::config::BrokerConfig;
use market_common::{MessageType, Result, ServiceError, protocol};

use crate::broker::registry::TopicRegistry;
use crate::broker::subscriber::TcpSubscriber;

/// Broker state shared by all connection threads.
pub struct Broker {
    config: BrokerConfig,
    registry: TopicRegistry<TcpSubscriber>,
    next_id: AtomicU64,
}

impl Broker {
    /// Creates a broker with an empty registry.
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            registry: TopicRegistry::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// The subscriber registry.
    pub fn registry(&self) -> &TopicRegistry<TcpSubscriber> {
        &self.registry
    }

    /// Serves one connection until the peer closes it or sends garbage.
    ///
    /// Every topic this connection subscribed to is unsubscribed when the loop ends.
    pub fn handle_connection(&self, stream: TcpStream) -> Result<()> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = TcpSubscriber::new(id, stream.try_clone()?, self.config.delivery_timeout)?;
        let mut joined: Vec<String> = Vec::new();

        let outcome = loop {
            let envelope = match protocol::receive(&stream) {
                Ok(envelope) => envelope,
                Err(ServiceError::ConnectionClosed) => break Ok(()),
                Err(e) => break Err(e),
            };

            let Some(topic) = envelope.topic.clone() else {
                warn!("Connection #{} sent {} without a topic", id, envelope.kind);
                continue;
            };

            match envelope.kind {
                MessageType::Subscribe => {
                    self.registry.subscribe(&topic, handle.clone());
                    joined.push(topic);
                }
                MessageType::Publish => {
                    self.registry.publish(&topic, &envelope);
                }
                other => debug!("Connection #{} sent unsupported {}", id, other),
            }
        };

        for topic in &joined {
            self.registry.unsubscribe(topic, &handle);
        }
        info!("Connection #{} closed", id);
        outcome
    }
}
