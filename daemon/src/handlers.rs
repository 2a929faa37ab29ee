//! Message handlers for the daemon

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use medsearch_core::{
    DiagnosticInfo, IpcMessage, IpcResponse, SessionCommand, SessionHandle,
};

use crate::DaemonState;

/// Handle an incoming IPC message for the connection owning `session`
pub async fn handle_message(
    msg: IpcMessage,
    state: &Arc<DaemonState>,
    session: &mut SessionHandle,
) -> IpcResponse {
    match msg {
        IpcMessage::Ping => {
            debug!("Ping received");
            IpcResponse::Pong {
                uptime_secs: state.uptime_secs(),
                active_sessions: state.active_sessions(),
            }
        }

        IpcMessage::Shutdown => {
            info!("Shutdown requested via IPC");
            state.request_shutdown();
            IpcResponse::Ok
        }

        IpcMessage::Input { text, filters } => match session.input(text, filters) {
            Ok(_) => IpcResponse::Ok,
            Err(e) => IpcResponse::Error(e.to_string()),
        },

        IpcMessage::Snapshot { settle, timeout_ms } => {
            let result = if settle {
                session.settled(Duration::from_millis(timeout_ms)).await
            } else {
                session.snapshot().await
            };
            match result {
                Ok(snapshot) => IpcResponse::Snapshot(snapshot),
                Err(e) => IpcResponse::Error(e.to_string()),
            }
        }

        IpcMessage::AddToHistory { query } => {
            debug!("Add to history: {:?}", query);
            apply(session, SessionCommand::AddToHistory(query)).await
        }

        IpcMessage::History => {
            // Let queued history additions land first
            if let Err(e) = session.snapshot().await {
                return IpcResponse::Error(e.to_string());
            }
            IpcResponse::History(state.context.history().to_vec())
        }

        IpcMessage::ClearCache => {
            info!("Cache clear requested");
            apply(session, SessionCommand::ClearCache).await
        }

        IpcMessage::Refetch => apply(session, SessionCommand::Refetch).await,

        IpcMessage::Reset => apply(session, SessionCommand::Reset).await,

        IpcMessage::DoctorInfo => {
            debug!("Doctor info requested");
            IpcResponse::Doctor(diagnostics(state))
        }
    }
}

/// Send a command and wait until the session has applied it.
async fn apply(session: &mut SessionHandle, command: SessionCommand) -> IpcResponse {
    let result = match session.send(command) {
        Ok(_) => session.snapshot().await.map(|_| ()),
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => IpcResponse::Ok,
        Err(e) => IpcResponse::Error(e.to_string()),
    }
}

fn diagnostics(state: &DaemonState) -> DiagnosticInfo {
    let context = &state.context;
    let (cache_entries, cache_capacity, cache_ttl_secs) = {
        let cache = context.cache();
        (cache.len(), cache.capacity(), cache.ttl().as_secs())
    };

    DiagnosticInfo {
        uptime_secs: state.uptime_secs(),
        active_sessions: state.active_sessions(),
        cache_entries,
        cache_capacity,
        cache_ttl_secs,
        history_entries: context.history().len(),
        tracked_searches: context.searches().len(),
        tracked_suggestions: context.suggestions().len(),
        api_base_url: state.backend.base_url().to_string(),
    }
}
