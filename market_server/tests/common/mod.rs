//! Loopback fixtures shared by the integration tests.
#![allow(dead_code)]

use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Sender, bounded};
use market_common::model::Quote;
use market_common::{Envelope, MessageType, Result, protocol};
use market_server::listener;

/// Running server; stops accepting when dropped.
pub struct TestServer {
    pub addr: String,
    _stop: Sender<()>,
}

/// Serves `handler` on an ephemeral loopback port.
pub fn spawn<F>(handler: F) -> TestServer
where
    F: Fn(TcpStream) -> Result<()> + Send + Sync + 'static,
{
    let listener = listener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let (stop_tx, stop_rx) = bounded::<()>(1);
    thread::spawn(move || listener::serve(listener, stop_rx, handler));
    TestServer { addr, _stop: stop_tx }
}

/// Address nobody listens on.
pub fn dead_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}

/// Upstream that answers every `REQ_QUOTE` with `price` for `symbol`.
pub fn healthy_upstream(symbol: &'static str, price: f64) -> TestServer {
    spawn(move |stream| {
        let request = protocol::receive(&stream)?;
        assert_eq!(request.kind, MessageType::RequestQuote);
        protocol::send(
            &stream,
            &Envelope::with_payload(MessageType::RespQuote, &Quote::now(symbol, price))?,
        )
    })
}

/// Upstream that drops every connection after reading the request.
pub fn failing_upstream() -> TestServer {
    spawn(|stream| {
        let _ = protocol::receive(&stream);
        Ok(())
    })
}

/// Upstream that never answers within `hold`.
pub fn silent_upstream(hold: Duration) -> TestServer {
    spawn(move |stream| {
        let _ = protocol::receive(&stream);
        thread::sleep(hold);
        Ok(())
    })
}

/// Upstream that sends `reply` one byte at a time, `gap` apart.
pub fn trickling_upstream(reply: &'static [u8], gap: Duration) -> TestServer {
    spawn(move |mut stream| {
        let _ = protocol::receive(&stream);
        for byte in reply {
            thread::sleep(gap);
            if stream.write_all(&[*byte]).is_err() {
                break;
            }
        }
        Ok(())
    })
}

/// Polls `check` until it holds or two seconds pass.
pub fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    check()
}
