//! Outbound publishing link to the broker.
//!
//! `ReconnectingPublisher` holds at most one connection and a mutex that covers the
//! whole connect → write → reconnect → retry sequence of a call, so writes from
//! concurrent callers never interleave on the shared socket. A call makes at most two
//! write attempts and never queues: a message that fails both is reported to the
//! caller and dropped.
use std::io::{self, Write};
use std::net::TcpStream;
use std::sync::Mutex;
use std::time::Duration;

use log::{info, warn};
use market_common::config::PublisherConfig;
use market_common::{Envelope, Result, ServiceError, net, protocol};
use serde_json::Value;

/// Opens connections to the broker.
pub trait Connector: Send + Sync {
    /// Connection type written to by the publisher.
    type Conn: Write + Send;

    /// Dials a fresh connection.
    fn connect(&self) -> io::Result<Self::Conn>;
}

/// Dials the broker over TCP.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
    timeout: Duration,
}

impl TcpConnector {
    /// Dials `addr`, giving up after `timeout`. Writes on the resulting connection are
    /// bounded by the same timeout.
    pub fn new(addr: &str, timeout: Duration) -> Self {
        Self {
            addr: addr.to_string(),
            timeout,
        }
    }
}

impl Connector for TcpConnector {
    type Conn = TcpStream;

    fn connect(&self) -> io::Result<TcpStream> {
        let stream = net::connect(&self.addr, self.timeout)?;
        stream.set_write_timeout(Some(self.timeout))?;
        Ok(stream)
    }
}

/// Publisher that lazily connects and retries once through a fresh connection.
pub struct ReconnectingPublisher<C: Connector = TcpConnector> {
    connector: C,
    conn: Mutex<Option<C::Conn>>,
}

impl ReconnectingPublisher<TcpConnector> {
    /// Creates a TCP publisher for `config.broker_addr`. No connection is made yet.
    pub fn new(config: PublisherConfig) -> Self {
        Self::with_connector(TcpConnector::new(&config.broker_addr, config.dial_timeout))
    }
}

impl<C: Connector> ReconnectingPublisher<C> {
    /// Creates a publisher over an arbitrary connector.
    pub fn with_connector(connector: C) -> Self {
        Self {
            connector,
            conn: Mutex::new(None),
        }
    }

    /// Returns `true` while a connection is held.
    pub fn is_connected(&self) -> bool {
        self.conn.lock().map(|conn| conn.is_some()).unwrap_or(false)
    }

    /// Publishes `payload` on `topic`.
    ///
    /// Errors:
    /// - `BrokerOffline` — no connection was held and dialing failed.
    /// - `ReconnectFailed` — the write failed and the re-dial failed.
    /// - `RetryFailed` — the write through the fresh connection failed as well.
    pub fn publish(&self, topic: &str, payload: Value) -> Result<()> {
        let frame = protocol::encode(&Envelope::publish(topic, payload))?;
        let mut slot = self.conn.lock()?;

        let mut conn = match slot.take() {
            Some(conn) => conn,
            None => self.connector.connect().map_err(ServiceError::BrokerOffline)?,
        };

        match write_frame(&mut conn, &frame) {
            Ok(()) => {
                *slot = Some(conn);
                return Ok(());
            }
            Err(e) => {
                warn!("Error publishing to broker: {}. Attempting reconnection...", e);
                drop(conn);
            }
        }

        let mut conn = self.connector.connect().map_err(ServiceError::ReconnectFailed)?;
        info!("Reconnected to broker. Retrying publish on {}...", topic);
        write_frame(&mut conn, &frame).map_err(ServiceError::RetryFailed)?;
        *slot = Some(conn);
        Ok(())
    }
}

fn write_frame<W: Write>(conn: &mut W, frame: &[u8]) -> io::Result<()> {
    conn.write_all(frame)?;
    conn.flush()
}
