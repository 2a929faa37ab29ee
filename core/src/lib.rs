//! medsearch core - global search for a medical practice
//!
//! This crate provides:
//! - Shared data types (search parameters, responses, IPC messages)
//! - Canonical cache keys and a bounded TTL/LRU result cache
//! - A debounce state machine and a deduplicating query layer
//! - The search session that ties them together, plus its tokio event loop
//! - Configuration and the daemon IPC client

pub mod backend;
pub mod cache;
pub mod clock;
pub mod config;
pub mod context;
pub mod debounce;
pub mod driver;
pub mod error;
pub mod history;
pub mod ipc;
pub mod key;
pub mod query;
pub mod session;
pub mod types;

pub use backend::SearchBackend;
pub use cache::SearchCache;
pub use clock::{Clock, ManualClock, SharedClock, SystemClock, TokioClock};
pub use config::Config;
pub use context::SearchContext;
pub use debounce::Debouncer;
pub use driver::{spawn_session, SessionCommand, SessionHandle};
pub use error::{Error, FetchError, Result};
pub use history::SearchHistory;
pub use ipc::{is_daemon_running, IpcClient, IpcConnection, IpcError};
pub use key::CacheKey;
pub use query::QueryClient;
pub use session::{FetchOutcome, FetchRequest, Fetcher, SearchSession};
pub use types::*;

/// Re-export commonly used items
pub mod prelude {
    pub use crate::error::{Error, FetchError};
    pub use crate::session::{FetchOutcome, FetchRequest, SearchSession};
    pub use crate::types::*;
    pub use crate::{CacheKey, SearchBackend, SearchContext};
}
