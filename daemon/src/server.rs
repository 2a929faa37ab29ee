//! Unix socket server for the daemon
//!
//! Every accepted connection becomes one search session over the shared
//! context; the session ends when the client hangs up.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info};

use crate::{handle_client, DaemonState};

/// Run the daemon server until Ctrl+C or an IPC shutdown
pub async fn run(state: Arc<DaemonState>) -> Result<()> {
    let socket_path = state.socket_path();

    let listener = UnixListener::bind(&socket_path)
        .with_context(|| format!("Failed to bind {:?}", socket_path))?;
    info!("Listening on {:?}", socket_path);

    let mut next_connection: u64 = 0;

    while !state.should_shutdown() {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, _addr)) => {
                    next_connection += 1;
                    open_session(stream, next_connection, &state);
                }
                Err(e) => error!("Accept error: {}", e),
            },
            _ = state.shutdown_requested() => {
                info!("Shutdown requested, stopping server");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                state.request_shutdown();
            }
        }
    }

    let open = state.active_sessions();
    if open > 0 {
        info!("Closing with {} session(s) still connected", open);
    }

    if socket_path.exists() {
        std::fs::remove_file(&socket_path)?;
    }

    info!("Daemon stopped");
    Ok(())
}

fn open_session(stream: UnixStream, connection: u64, state: &Arc<DaemonState>) {
    let state = Arc::clone(state);
    debug!("Connection {} accepted", connection);
    tokio::spawn(async move {
        match handle_client(stream, state).await {
            Ok(()) => debug!("Connection {} closed", connection),
            Err(e) => error!("Connection {} failed: {}", connection, e),
        }
    });
}
