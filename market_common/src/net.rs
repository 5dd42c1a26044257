//! Networking defaults and the one-shot request/response primitive.

use std::io::{self, BufReader, Read};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use crate::error::ServiceError;
use crate::protocol::{self, Envelope};
use crate::result::Result;

/// Aggregator port (client → aggregator).
pub const AGGREGATOR_PORT: u16 = 8000;
/// External quote source port (core → external).
pub const EXTERNAL_PORT: u16 = 8080;
/// Broker port (publishers and subscribers → broker).
pub const BROKER_PORT: u16 = 8081;
/// Core quote service port (aggregator → core).
pub const CORE_PORT: u16 = 8082;
/// Default history shard ports.
pub const SHARD_PORTS: [u16; 3] = [9001, 9002, 9003];

/// Helper to format a host and port like "host:port".
pub fn addr(host: &str, port: u16) -> String {
    format!("{}:{}", host, port)
}

/// Resolves `addr` and connects to the first resolved address within `timeout`.
pub fn connect(addr: &str, timeout: Duration) -> std::io::Result<TcpStream> {
    let target = resolve(addr)?;
    TcpStream::connect_timeout(&target, timeout)
}

fn resolve(addr: &str) -> std::io::Result<SocketAddr> {
    addr.to_socket_addrs()?.next().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            format!("no address resolved for {addr}"),
        )
    })
}

/// Time left before a fixed instant, used to spread one deadline over several socket
/// operations.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    /// Starts a deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Deadline {
            at: Instant::now() + budget,
            budget,
        }
    }

    /// Remaining time, or `Timeout` when it has already passed.
    pub fn remaining(&self) -> Result<Duration> {
        let left = self.at.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return Err(ServiceError::Timeout(self.budget));
        }
        Ok(left)
    }

    /// Total budget this deadline was created with.
    pub fn budget(&self) -> Duration {
        self.budget
    }
}

/// Reader that re-arms the socket read timeout before every read, so the whole
/// response has to arrive before `deadline` and not just each chunk of it.
///
/// `serde_json` pulls its input a byte at a time. Callers wrap this in a `BufReader` to
/// turn that into one syscall per arriving segment; the buffer may read past the
/// envelope, so that is only done when the envelope is the last thing on the
/// connection.
pub struct DeadlineReader<'a> {
    stream: &'a TcpStream,
    deadline: Deadline,
}

impl<'a> DeadlineReader<'a> {
    /// Reads from `stream` until `deadline` passes.
    pub fn new(stream: &'a TcpStream, deadline: Deadline) -> Self {
        Self { stream, deadline }
    }
}

impl Read for DeadlineReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let left = self.deadline.remaining().map_err(|_| {
            io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no complete reply within {:?}", self.deadline.budget()),
            )
        })?;
        self.stream.set_read_timeout(Some(left))?;
        self.stream.read(buf)
    }
}

/// Performs one request/response exchange against `addr`.
///
/// Connecting, sending, and receiving all share a single deadline of `timeout`; a
/// backend that has not finished its answer when it expires fails with
/// `ServiceError::Timeout`, however steadily it trickles bytes. Transport failures are
/// tagged with `addr`.
pub fn request(addr: &str, envelope: &Envelope, timeout: Duration) -> Result<Envelope> {
    let deadline = Deadline::after(timeout);
    let wrap = |e: std::io::Error| ServiceError::connection(addr, e, timeout);

    let stream = connect(addr, deadline.remaining()?).map_err(wrap)?;
    stream.set_write_timeout(Some(deadline.remaining()?)).map_err(wrap)?;
    protocol::send(&stream, envelope).map_err(|e| tag(e, addr, timeout))?;

    // The reply is the last envelope on this connection, so buffering is safe.
    let reader = BufReader::new(DeadlineReader::new(&stream, deadline));
    protocol::receive(reader).map_err(|e| tag(e, addr, timeout))
}

fn tag(err: ServiceError, addr: &str, timeout: Duration) -> ServiceError {
    match err {
        ServiceError::Io(source) => ServiceError::connection(addr, source, timeout),
        other => other,
    }
}
