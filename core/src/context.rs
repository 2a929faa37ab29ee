//! State shared by every search session of one application session

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::cache::SearchCache;
use crate::clock::{SharedClock, SystemClock};
use crate::config::SearchSettings;
use crate::history::SearchHistory;
use crate::query::QueryClient;
use crate::types::SearchResponse;

/// Result cache, history and query clients, shared by handle.
///
/// Construct one per application session and hand clones to each
/// [`crate::SearchSession`]. A fresh context is a fresh cache.
#[derive(Clone)]
pub struct SearchContext {
    cache: Arc<Mutex<SearchCache<SearchResponse>>>,
    history: Arc<Mutex<SearchHistory>>,
    searches: Arc<QueryClient<SearchResponse>>,
    suggestions: Arc<QueryClient<Vec<String>>>,
    settings: Arc<SearchSettings>,
    clock: SharedClock,
}

impl SearchContext {
    pub fn new(settings: SearchSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: SearchSettings, clock: SharedClock) -> Self {
        let cache = SearchCache::with_clock(
            settings.cache_capacity,
            settings.cache_ttl(),
            Arc::clone(&clock),
        );
        let searches = QueryClient::with_clock(
            settings.search_stale_time(),
            settings.query_gc_time(),
            Arc::clone(&clock),
        );
        let suggestions = QueryClient::with_clock(
            settings.suggestions_stale_time(),
            settings.query_gc_time(),
            Arc::clone(&clock),
        );

        Self {
            cache: Arc::new(Mutex::new(cache)),
            history: Arc::new(Mutex::new(SearchHistory::new(settings.history_limit))),
            searches: Arc::new(searches),
            suggestions: Arc::new(suggestions),
            settings: Arc::new(settings),
            clock,
        }
    }

    pub fn cache(&self) -> MutexGuard<'_, SearchCache<SearchResponse>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn history(&self) -> MutexGuard<'_, SearchHistory> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn searches(&self) -> &QueryClient<SearchResponse> {
        &self.searches
    }

    pub fn suggestions(&self) -> &QueryClient<Vec<String>> {
        &self.suggestions
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Drop idle query-client entries. The result cache is left alone: it
    /// expires lazily on read.
    pub fn collect_garbage(&self) -> usize {
        self.searches.collect_garbage() + self.suggestions.collect_garbage()
    }
}
