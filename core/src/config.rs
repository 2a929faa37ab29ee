//! Configuration loaded from `~/.medsearch/config.toml`
//!
//! Resolution order for the API section:
//! 1. `MEDSEARCH_API_URL` / `MEDSEARCH_API_TOKEN` environment variables
//! 2. `[api]` table in the config file
//! 3. Built-in defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

const DEFAULT_BASE_URL: &str = "http://localhost:3000/api";

/// Environment override for the API base URL
pub const API_URL_ENV: &str = "MEDSEARCH_API_URL";

/// Environment override for the API bearer token
pub const API_TOKEN_ENV: &str = "MEDSEARCH_API_TOKEN";

/// Directory holding config, socket and logs.
pub fn medsearch_home() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".medsearch"))
        .unwrap_or_else(|| PathBuf::from("/tmp/.medsearch"))
}

/// Search behaviour tuning
#[derive(Debug, Clone, Deserialize)]
pub struct SearchSettings {
    /// Quiet period before typed text is searched (default: 300)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Shortest query that reaches the backend (default: 2)
    #[serde(default = "default_min_query_len")]
    pub min_query_len: usize,
    /// Result cache capacity (default: 50)
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Result cache time-to-live (default: 300)
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Freshness window of the search query client (default: 300)
    #[serde(default = "default_search_stale_secs")]
    pub search_stale_secs: u64,
    /// Freshness window of the suggestions query client (default: 120)
    #[serde(default = "default_suggestions_stale_secs")]
    pub suggestions_stale_secs: u64,
    /// Idle time before query-client entries are collected (default: 300)
    #[serde(default = "default_query_gc_secs")]
    pub query_gc_secs: u64,
    /// History length (default: 10)
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Suggestions shown (default: 5)
    #[serde(default = "default_suggestion_limit")]
    pub suggestion_limit: usize,
    /// History entries blended into suggestions (default: 3)
    #[serde(default = "default_history_suggestion_limit")]
    pub history_suggestion_limit: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            min_query_len: default_min_query_len(),
            cache_capacity: default_cache_capacity(),
            cache_ttl_secs: default_cache_ttl_secs(),
            search_stale_secs: default_search_stale_secs(),
            suggestions_stale_secs: default_suggestions_stale_secs(),
            query_gc_secs: default_query_gc_secs(),
            history_limit: default_history_limit(),
            suggestion_limit: default_suggestion_limit(),
            history_suggestion_limit: default_history_suggestion_limit(),
        }
    }
}

impl SearchSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn search_stale_time(&self) -> Duration {
        Duration::from_secs(self.search_stale_secs)
    }

    pub fn suggestions_stale_time(&self) -> Duration {
        Duration::from_secs(self.suggestions_stale_secs)
    }

    pub fn query_gc_time(&self) -> Duration {
        Duration::from_secs(self.query_gc_secs)
    }
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_min_query_len() -> usize {
    2
}

fn default_cache_capacity() -> usize {
    crate::cache::DEFAULT_CAPACITY
}

fn default_cache_ttl_secs() -> u64 {
    crate::cache::DEFAULT_TTL.as_secs()
}

fn default_search_stale_secs() -> u64 {
    300
}

fn default_suggestions_stale_secs() -> u64 {
    120
}

fn default_query_gc_secs() -> u64 {
    300
}

fn default_history_limit() -> usize {
    crate::history::DEFAULT_HISTORY_LIMIT
}

fn default_suggestion_limit() -> usize {
    5
}

fn default_history_suggestion_limit() -> usize {
    3
}

/// Search API connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSettings {
    /// Base URL, e.g. `https://practice.example.com/api`
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token (optional)
    pub token: Option<String>,
    /// Per-request timeout (default: 10)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ApiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub api: ApiSettings,
}

impl Config {
    /// Load `config.toml` from `dir`, then apply environment overrides.
    ///
    /// # Errors
    /// Returns `Error::Config` if the file exists but cannot be parsed.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut config = Self::load_file(dir)?;
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Load from the default `~/.medsearch` directory.
    pub fn load_default() -> Result<Self> {
        Self::load(&medsearch_home())
    }

    fn load_file(dir: &Path) -> Result<Self> {
        let config_file = dir.join("config.toml");
        if !config_file.exists() {
            debug!("No config file at {:?}, using defaults", config_file);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_file)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", config_file.display(), e)))
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(API_URL_ENV).filter(|v| !v.is_empty()) {
            debug!("Using API URL from {}", API_URL_ENV);
            self.api.base_url = url;
        }
        if let Some(token) = lookup(API_TOKEN_ENV).filter(|v| !v.is_empty()) {
            debug!("Using API token from {}", API_TOKEN_ENV);
            self.api.token = Some(token);
        }
    }
}
