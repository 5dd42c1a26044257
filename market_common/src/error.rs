//! Error types shared by every service in the workspace.
//!
//! The `ServiceError` enum covers transport failures, decode failures, the circuit
//! breaker's fast-fail signal, and the publisher's reconnect phases, so each crate can
//! propagate a single error type with `?` and report it as data.
use std::io;
use std::sync::PoisonError;

use thiserror::Error;

/// Unified error type shared by servers and clients.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// I/O error that is not attributed to a specific peer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Dial, read, or write failure against a named peer.
    #[error("connection to {peer} failed: {source}")]
    Connection {
        /// Address of the remote side.
        peer: String,
        /// Underlying transport error.
        #[source]
        source: io::Error,
    },

    /// The peer closed the stream before a complete envelope arrived.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// A connect or round-trip deadline expired.
    #[error("deadline exceeded after {0:?}")]
    Timeout(std::time::Duration),

    /// A received envelope or payload could not be decoded.
    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    /// The peer answered with an envelope of the wrong type.
    #[error("unexpected message: expected {expected}, got {got}")]
    UnexpectedMessage {
        /// Wire name of the expected type.
        expected: String,
        /// Wire name of the received type.
        got: String,
    },

    /// The peer answered with an `ERROR` envelope carrying this message.
    #[error("{0}")]
    Remote(String),

    /// The circuit breaker rejected the call without attempting it.
    #[error("circuit breaker is OPEN")]
    CircuitOpen,

    /// First dial to the broker failed.
    #[error("broker offline: {0}")]
    BrokerOffline(#[source] io::Error),

    /// Re-dial after a failed write failed.
    #[error("reconnection failed: {0}")]
    ReconnectFailed(#[source] io::Error),

    /// The single retried write failed as well.
    #[error("retry failed: {0}")]
    RetryFailed(#[source] io::Error),

    /// Invalid configuration rejected at startup.
    #[error("Config error: {0}")]
    Config(String),

    /// Installing the Ctrl+C handler failed.
    #[error("Signal handler error: {0}")]
    Signal(String),

    /// The accept thread stopped feeding the serving loop.
    #[error("Channel receive failed: {0}")]
    ChannelRecv(String),

    /// A thread panicked while holding a shared lock.
    #[error("Mutex Lock Poisoned: {0}")]
    MutexLock(String),
}

impl ServiceError {
    /// Wrap a transport error with the address of the peer it happened against.
    ///
    /// Socket timeouts are folded into `Timeout` so callers can tell a slow backend
    /// from a refused one.
    pub fn connection(peer: impl Into<String>, source: io::Error, deadline: std::time::Duration) -> Self {
        match source.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ServiceError::Timeout(deadline),
            _ => ServiceError::Connection {
                peer: peer.into(),
                source,
            },
        }
    }

    /// Returns `true` for `Timeout` errors.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ServiceError::Timeout(_))
    }
}

impl<T> From<PoisonError<T>> for ServiceError {
    fn from(err: PoisonError<T>) -> Self {
        ServiceError::MutexLock(err.to_string())
    }
}
