//! TCP-backed subscriber handle.
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use market_common::protocol;
use market_common::{Envelope, Result};

use crate::broker::registry::Subscriber;

/// Write side of one broker connection.
///
/// Clones share the socket; equality is by connection id. A per-handle write lock keeps
/// concurrent deliveries from interleaving bytes, and the socket's write timeout
/// bounds each delivery.
#[derive(Clone, Debug)]
pub struct TcpSubscriber {
    id: u64,
    peer: Option<SocketAddr>,
    stream: Arc<TcpStream>,
    write_lock: Arc<Mutex<()>>,
}

impl TcpSubscriber {
    /// Wraps `stream` as connection `id`, applying `delivery_timeout` to its writes.
    pub fn new(id: u64, stream: TcpStream, delivery_timeout: Duration) -> Result<Self> {
        stream.set_write_timeout(Some(delivery_timeout))?;
        Ok(Self {
            id,
            peer: stream.peer_addr().ok(),
            stream: Arc::new(stream),
            write_lock: Arc::new(Mutex::new(())),
        })
    }
}

impl PartialEq for TcpSubscriber {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TcpSubscriber {}

impl Subscriber for TcpSubscriber {
    fn deliver(&self, envelope: &Envelope) -> Result<()> {
        let _guard = self.write_lock.lock()?;
        protocol::send(&*self.stream, envelope)
    }

    fn close(&self) {
        // Already-closed sockets report NotConnected; nothing left to do then.
        let _ = self.stream.shutdown(Shutdown::Both);
    }

    fn describe(&self) -> String {
        match self.peer {
            Some(peer) => format!("#{} ({})", self.id, peer),
            None => format!("#{}", self.id),
        }
    }
}
