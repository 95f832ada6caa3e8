// Connection handling module
// Accepts a single TCP connection and serves it on its own task

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::TcpStream;
use tokio::sync::{watch, Notify};

use super::idle::{ActivityTracker, TrackedStream};
use crate::config::AppState;
use crate::handler;
use crate::logger;

/// Number of open connections, with a wakeup when it drops to zero
#[derive(Default)]
pub struct ConnectionCounter {
    active: AtomicUsize,
    idle: Notify,
}

impl ConnectionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Reserve a slot, or `None` when `limit` connections are already open
    pub fn try_acquire(self: &Arc<Self>, limit: Option<u64>) -> Option<ConnectionGuard> {
        // Increment first, then check, so concurrent accepts cannot overshoot
        let prev = self.active.fetch_add(1, Ordering::SeqCst);
        if let Some(max) = limit {
            if prev >= usize::try_from(max).unwrap_or(usize::MAX) {
                self.release();
                return None;
            }
        }
        Some(ConnectionGuard {
            counter: Arc::clone(self),
        })
    }

    fn release(&self) {
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    /// Wait until every connection has closed
    pub async fn wait_idle(&self) {
        loop {
            // Register before checking so a release in between is not missed
            let notified = self.idle.notified();
            if self.active() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Holds one slot of the counter for the lifetime of a connection task
pub struct ConnectionGuard {
    counter: Arc<ConnectionCounter>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counter.release();
    }
}

/// Accept a connection, checking the connection limit.
///
/// Connections over `performance.max_connections` are dropped right away,
/// which closes the socket.
pub fn accept_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: &Arc<AppState>,
    counter: &Arc<ConnectionCounter>,
    shutdown: watch::Receiver<bool>,
) {
    let limit = state.config.performance.max_connections;
    let Some(guard) = counter.try_acquire(limit) else {
        logger::log_warning(&format!(
            "Max connections reached ({}). Connection from {peer_addr} rejected.",
            limit.unwrap_or_default()
        ));
        drop(stream);
        return;
    };

    logger::log_connection_accepted(&peer_addr);
    handle_connection(stream, peer_addr, Arc::clone(state), guard, shutdown);
}

/// Serve a connection in a spawned task.
///
/// The task:
/// 1. Wraps the stream so every read and write refreshes its idle timestamp
/// 2. Serves HTTP/1.1 with keep-alive and a header read timeout
/// 3. Starts a graceful close after `keep_alive_timeout` of silence, and drops
///    the connection if it is still silent one period later
/// 4. Starts a graceful close when server shutdown is broadcast
fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: Arc<AppState>,
    guard: ConnectionGuard,
    mut shutdown: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        let _guard = guard;
        let performance = &state.config.performance;
        let keep_alive_timeout = Duration::from_secs(performance.keep_alive_timeout);
        let header_read_timeout = Duration::from_secs(performance.header_read_timeout);

        let tracker = ActivityTracker::new();
        let io = TokioIo::new(TrackedStream::new(stream, tracker.clone()));

        let service_state = Arc::clone(&state);
        let service = service_fn(move |req| {
            handler::handle_request(req, Arc::clone(&service_state), peer_addr)
        });

        let mut builder = http1::Builder::new();
        builder
            .timer(TokioTimer::new())
            .keep_alive(true)
            .header_read_timeout(header_read_timeout);

        let conn = builder.serve_connection(io, service);
        tokio::pin!(conn);

        let mut closing = false;
        loop {
            tokio::select! {
                result = conn.as_mut() => {
                    if let Err(err) = result {
                        logger::log_connection_error(&peer_addr, &err);
                    }
                    break;
                }
                () = tracker.idle_for(keep_alive_timeout) => {
                    if closing {
                        logger::log_debug(&format!(
                            "[Connection] {peer_addr} still idle after close, dropping"
                        ));
                        break;
                    }
                    logger::log_debug(&format!("[Connection] {peer_addr} idle, closing"));
                    conn.as_mut().graceful_shutdown();
                    tracker.touch();
                    closing = true;
                }
                _ = shutdown.changed(), if !closing => {
                    conn.as_mut().graceful_shutdown();
                    closing = true;
                }
            }
        }
    });
}
