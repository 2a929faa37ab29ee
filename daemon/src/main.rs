//! medsearch daemon (medsearchd)
//!
//! Long-running service that keeps one search context alive across clients:
//! - Result cache, query dedup and history shared by every connection
//! - One debounced search session per connection
//!
//! Architecture:
//! - Unix socket listener at ~/.medsearch/medsearch.sock
//! - Line-delimited JSON messages (IpcMessage/IpcResponse)

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, info, warn};

mod background;
mod handlers;
mod server;

use medsearch_api::ApiClient;
use medsearch_core::config::{medsearch_home, Config};
use medsearch_core::{
    spawn_session, IpcMessage, IpcResponse, SearchContext, SearchSession, TokioClock,
};

/// Global state for the daemon.
pub struct DaemonState {
    /// When the daemon started
    start_time: Instant,

    /// Connections currently holding a session
    active_sessions: AtomicU64,

    /// Shutdown signal
    shutdown: watch::Sender<bool>,

    /// Path to the medsearch directory
    home: PathBuf,

    /// Cache, history and in-flight requests shared by all sessions
    pub context: SearchContext,

    pub backend: Arc<ApiClient>,
}

impl DaemonState {
    /// Create the daemon state from the config in `home`.
    ///
    /// # Errors
    /// Returns `anyhow::Error` if the directory, config or HTTP client fail.
    pub fn new(home: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&home)
            .with_context(|| format!("Failed to create {}", home.display()))?;

        let config = Config::load(&home)?;
        let backend = ApiClient::new(&config.api)?;
        info!("Search API at {}", backend.base_url());

        let context = SearchContext::with_clock(config.search, Arc::new(TokioClock));

        Ok(Self {
            start_time: Instant::now(),
            active_sessions: AtomicU64::new(0),
            shutdown: watch::Sender::new(false),
            home,
            context,
            backend: Arc::new(backend),
        })
    }

    /// Seconds since daemon start.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn active_sessions(&self) -> u64 {
        self.active_sessions.load(Ordering::Relaxed)
    }

    /// Check whether a shutdown has been requested.
    pub fn should_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Request a graceful shutdown.
    pub fn request_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Resolves once a shutdown has been requested.
    pub async fn shutdown_requested(&self) {
        let mut rx = self.shutdown.subscribe();
        // The sender lives as long as `self`
        let _ = rx.wait_for(|requested| *requested).await;
    }

    /// Path to the daemon socket.
    pub fn socket_path(&self) -> PathBuf {
        self.home.join("medsearch.sock")
    }
}

/// Counts a connection as an active session while alive.
struct SessionGuard<'a>(&'a DaemonState);

impl<'a> SessionGuard<'a> {
    fn new(state: &'a DaemonState) -> Self {
        state.active_sessions.fetch_add(1, Ordering::Relaxed);
        Self(state)
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.0.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("medsearchd=info".parse()?),
        )
        .init();

    info!("Starting medsearchd v{}", env!("CARGO_PKG_VERSION"));

    let state = Arc::new(DaemonState::new(medsearch_home())?);

    // Remove stale socket
    let socket_path = state.socket_path();
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)?;
    }

    tokio::spawn(background::garbage_collection_task(Arc::clone(&state)));

    server::run(state).await
}

/// Handle a single client connection with its own search session
async fn handle_client(mut stream: tokio::net::UnixStream, state: Arc<DaemonState>) -> Result<()> {
    let _guard = SessionGuard::new(&state);
    let session = SearchSession::new(Arc::clone(&state.backend), state.context.clone());
    let (mut session, task) = spawn_session(session);
    debug!("Session opened ({} active)", state.active_sessions());

    let (reader, mut writer) = stream.split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<IpcMessage>(&line) {
            Ok(msg) => handlers::handle_message(msg, &state, &mut session).await,
            Err(e) => {
                warn!("Invalid message: {}", e);
                IpcResponse::Error(format!("Invalid message: {}", e))
            }
        };

        let response_json = serde_json::to_string(&response)? + "\n";
        writer.write_all(response_json.as_bytes()).await?;

        line.clear();
    }

    drop(session);
    task.await?;
    debug!("Session closed");
    Ok(())
}
