//! TCP accept loop. Every connection gets its own task, handshake and ticker.

use crate::session::Session;
use crate::state::AppState;
use std::future::Future;
use std::sync::atomic::Ordering;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Accepts until `shutdown` resolves. Per-session failures never end the loop.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()>,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Agent listening on ws://{addr}/");
    }
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutting down, {} client(s) connected", state.clients());
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    info!(%peer, "connection established");
                    spawn_session(stream, state.clone());
                }
                Err(e) => error!("accept failed: {e}"),
            }
        }
    }
}

pub fn spawn_session(stream: TcpStream, state: AppState) -> JoinHandle<()> {
    // Bump client count on connect; decrement on drop, however the task ends.
    state.client_count.fetch_add(1, Ordering::Relaxed);
    struct ClientGuard(AppState);
    impl Drop for ClientGuard {
        fn drop(&mut self) {
            self.0.client_count.fetch_sub(1, Ordering::Relaxed);
        }
    }
    let guard = ClientGuard(state.clone());

    let _ = stream.set_nodelay(true);
    tokio::spawn(async move {
        let _guard = guard;
        let mut session = Session::new(stream, &state);
        // errors are logged by the session itself
        let _ = session.run().await;
    })
}
