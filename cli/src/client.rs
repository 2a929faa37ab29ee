//! Search session for the CLI: through the daemon when it is up, otherwise
//! in-process over a fresh context.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tracing::debug;

use medsearch_api::ApiClient;
use medsearch_core::config::Config;
use medsearch_core::{
    spawn_session, IpcClient, IpcConnection, IpcError, IpcMessage, IpcResponse, SearchContext,
    SearchFilters, SearchSession, SearchSnapshot, SessionCommand, SessionHandle, TokioClock,
};

/// Upper bound on waiting for a query to settle
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(15);

pub enum SearchClient {
    Daemon(IpcConnection),
    Local(LocalSession),
}

pub struct LocalSession {
    runtime: Runtime,
    context: SearchContext,
    handle: SessionHandle,
    _task: JoinHandle<()>,
}

impl SearchClient {
    /// Connect to the daemon, or start an in-process session if it is not
    /// running.
    pub fn connect() -> Result<Self> {
        let daemon = IpcClient::new().with_timeout(SETTLE_TIMEOUT + Duration::from_secs(5));
        match daemon.connect() {
            Ok(connection) => Ok(SearchClient::Daemon(connection)),
            Err(IpcError::DaemonNotRunning) => {
                eprintln!("Warning: daemon not running, searching in-process (nothing is cached between runs)");
                Ok(SearchClient::Local(LocalSession::new()?))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn input(&mut self, text: &str, filters: &SearchFilters) -> Result<()> {
        match self {
            SearchClient::Daemon(conn) => conn.input(text, filters)?,
            SearchClient::Local(local) => {
                local.handle.input(text, filters.clone())?;
            }
        }
        Ok(())
    }

    /// Wait for the session to settle and return its state.
    pub fn settled(&mut self) -> Result<SearchSnapshot> {
        match self {
            SearchClient::Daemon(conn) => Ok(conn.snapshot(true, SETTLE_TIMEOUT)?),
            SearchClient::Local(local) => {
                let snapshot = local
                    .runtime
                    .block_on(local.handle.settled(SETTLE_TIMEOUT))?;
                Ok(snapshot)
            }
        }
    }

    pub fn add_to_history(&mut self, query: &str) -> Result<()> {
        match self {
            SearchClient::Daemon(conn) => conn.expect_ok(&IpcMessage::AddToHistory {
                query: query.to_string(),
            })?,
            SearchClient::Local(local) => {
                local.command(SessionCommand::AddToHistory(query.to_string()))?
            }
        }
        Ok(())
    }

    pub fn history(&mut self) -> Result<Vec<String>> {
        match self {
            SearchClient::Daemon(conn) => match conn.request(&IpcMessage::History)? {
                IpcResponse::History(entries) => Ok(entries),
                _ => Err(IpcError::InvalidResponse("Unexpected response type".into()).into()),
            },
            SearchClient::Local(local) => Ok(local.context.history().to_vec()),
        }
    }

    pub fn refetch(&mut self) -> Result<()> {
        self.command(SessionCommand::Refetch, IpcMessage::Refetch)
    }

    pub fn clear_cache(&mut self) -> Result<()> {
        self.command(SessionCommand::ClearCache, IpcMessage::ClearCache)
    }

    pub fn reset(&mut self) -> Result<()> {
        self.command(SessionCommand::Reset, IpcMessage::Reset)
    }

    pub fn is_local(&self) -> bool {
        matches!(self, SearchClient::Local(_))
    }

    fn command(&mut self, command: SessionCommand, message: IpcMessage) -> Result<()> {
        match self {
            SearchClient::Daemon(conn) => conn.expect_ok(&message)?,
            SearchClient::Local(local) => local.command(command)?,
        }
        Ok(())
    }
}

impl LocalSession {
    fn new() -> Result<Self> {
        let config = Config::load_default()?;
        let backend = ApiClient::new(&config.api).context("Invalid [api] settings")?;
        debug!("In-process session against {}", backend.base_url());

        let runtime = Runtime::new().context("Failed to start tokio runtime")?;
        let context = SearchContext::with_clock(config.search, Arc::new(TokioClock));
        let session = SearchSession::new(Arc::new(backend), context.clone());

        let (handle, task) = {
            let _enter = runtime.enter();
            spawn_session(session)
        };

        Ok(Self {
            runtime,
            context,
            handle,
            _task: task,
        })
    }

    /// Send a command and wait until the session has applied it.
    fn command(&mut self, command: SessionCommand) -> Result<()> {
        self.handle.send(command)?;
        self.runtime.block_on(self.handle.snapshot())?;
        Ok(())
    }
}
