//! Accept loop shared by every server process.
//!
//! An accept thread forwards incoming streams over a `crossbeam_channel`; the serving
//! loop `select!`s between that channel and a shutdown signal and hands each stream to
//! its own handler thread. A failing handler is logged and only affects its own
//! connection.
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, Sender, bounded, select, unbounded};
use log::{error, info};
use market_common::{Result, ServiceError};

/// Binds `bind_addr`. Failing to bind is the one error a service cannot degrade from.
pub fn bind(bind_addr: &str) -> Result<TcpListener> {
    let listener = TcpListener::bind(bind_addr)?;
    info!("Listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Returns a channel that fires once on Ctrl+C.
pub fn shutdown_signal() -> Result<Receiver<()>> {
    let (tx, rx) = bounded::<()>(1);
    ctrlc::set_handler(move || {
        info!("Ctrl+C received. Shutting down...");
        let _ = tx.try_send(());
    })
    .map_err(|e| ServiceError::Signal(e.to_string()))?;
    Ok(rx)
}

/// Serves connections from `listener` with `handler` until `shutdown` fires.
pub fn serve<F>(listener: TcpListener, shutdown: Receiver<()>, handler: F) -> Result<()>
where
    F: Fn(TcpStream) -> Result<()> + Send + Sync + 'static,
{
    let handler = Arc::new(handler);
    let (conn_tx, conn_rx) = unbounded::<TcpStream>();
    thread::spawn(move || accept_loop(listener, conn_tx));

    loop {
        select! {
            recv(shutdown) -> _ => {
                info!("Listener stopped");
                return Ok(());
            },
            recv(conn_rx) -> msg => match msg {
                Ok(stream) => {
                    let handler = Arc::clone(&handler);
                    thread::spawn(move || {
                        let peer = stream
                            .peer_addr()
                            .map_or_else(|_| String::from("unknown"), |a| a.to_string());
                        if let Err(e) = handler(stream) {
                            error!("Connection {} failed: {}", peer, e);
                        }
                    });
                },
                Err(e) => return Err(ServiceError::ChannelRecv(e.to_string())),
            }
        }
    }
}

fn accept_loop(listener: TcpListener, tx: Sender<TcpStream>) {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                if tx.send(stream).is_err() {
                    break;
                }
            }
            Err(e) => error!("TCP connection error: {}", e),
        }
    }
}
