// Server loop module
// Accepts connections until shutdown, then drains open connections

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

use super::connection::{accept_connection, ConnectionCounter};
use crate::config::AppState;
use crate::logger;

/// Pause after a failed accept (e.g. out of file descriptors)
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Run the accept loop until `shutdown` completes.
///
/// Every accepted stream is handed to its own task; the loop never awaits a
/// client. On shutdown the listener is closed, open connections are told to
/// finish their in-flight response, and the loop waits at most
/// `performance.shutdown_grace_period` for them before returning.
pub async fn start_server_loop<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F)
where
    F: Future<Output = ()>,
{
    let counter = Arc::new(ConnectionCounter::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        accept_connection(
                            stream,
                            peer_addr,
                            &state,
                            &counter,
                            shutdown_rx.clone(),
                        );
                    }
                    Err(e) => {
                        logger::log_error(&format!("Failed to accept connection: {e}"));
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                }
            }
            () = &mut shutdown => break,
        }
    }

    drop(listener);
    logger::log_info(&format!(
        "Listener closed, draining {} open connection(s)",
        counter.active()
    ));
    let _ = shutdown_tx.send(true);

    let grace = Duration::from_secs(state.config.performance.shutdown_grace_period);
    if tokio::time::timeout(grace, counter.wait_idle()).await.is_err() {
        logger::log_warning(&format!(
            "Grace period of {}s elapsed with {} connection(s) still open",
            grace.as_secs(),
            counter.active()
        ));
    }
    logger::log_info("Server stopped");
}
