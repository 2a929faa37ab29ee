//! Search session: debounced input, cached results, merged suggestions
//!
//! A [`SearchSession`] is a single-owner state machine. Callers push raw input
//! with [`SearchSession::set_input`], call [`SearchSession::poll`] whenever a
//! debounce deadline may have passed, run the returned [`FetchRequest`]s with a
//! [`Fetcher`], and feed each [`FetchOutcome`] back through
//! [`SearchSession::apply`]. Outcomes are correlated by key, so a late
//! response for a query the user has moved past is dropped.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::backend::SearchBackend;
use crate::context::SearchContext;
use crate::debounce::Debouncer;
use crate::error::FetchError;
use crate::history::merge_suggestions;
use crate::key::{normalize_filters, CacheKey};
use crate::types::{SearchFilters, SearchParams, SearchResponse, SearchResult, SearchSnapshot};

/// Network work the session wants done.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchRequest {
    Search {
        key: CacheKey,
        params: SearchParams,
        /// Skip both cache layers
        force: bool,
    },
    Suggestions {
        text: String,
    },
}

impl FetchRequest {
    /// Outcome reporting `error` for this request without running it.
    pub fn fail(self, error: FetchError) -> FetchOutcome {
        match self {
            FetchRequest::Search { key, .. } => FetchOutcome::Search {
                key,
                result: Err(error),
            },
            FetchRequest::Suggestions { text } => FetchOutcome::Suggestions {
                text,
                result: Err(error),
            },
        }
    }
}

/// Result of a [`FetchRequest`], tagged with what it was for.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Search {
        key: CacheKey,
        result: Result<SearchResponse, FetchError>,
    },
    Suggestions {
        text: String,
        result: Result<Vec<String>, FetchError>,
    },
}

/// Executes fetch requests against the backend through the shared cache
/// layers. Cheap to clone; safe to move into spawned tasks.
pub struct Fetcher<B> {
    backend: Arc<B>,
    context: SearchContext,
}

impl<B> Clone for Fetcher<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            context: self.context.clone(),
        }
    }
}

impl<B: SearchBackend> Fetcher<B> {
    pub fn new(backend: Arc<B>, context: SearchContext) -> Self {
        Self { backend, context }
    }

    pub async fn run(&self, request: FetchRequest) -> FetchOutcome {
        match request {
            FetchRequest::Search { key, params, force } => {
                let result = self.search(&key, &params, force).await;
                FetchOutcome::Search { key, result }
            }
            FetchRequest::Suggestions { text } => {
                let result = self.suggestions(&text).await;
                FetchOutcome::Suggestions { text, result }
            }
        }
    }

    async fn search(
        &self,
        key: &CacheKey,
        params: &SearchParams,
        force: bool,
    ) -> Result<SearchResponse, FetchError> {
        if force {
            self.context.searches().invalidate(key.as_str());
        } else {
            // Another session may have filled the cache since this was requested
            let cached = self.context.cache().get(key);
            if let Some(response) = cached {
                return Ok(response);
            }
        }

        let backend = &self.backend;
        let context = &self.context;
        context
            .searches()
            .fetch(key.as_str(), || async move {
                debug!("Fetching search results for {}", key);
                let response = backend.search(params).await?;
                context.cache().set(key.clone(), response.clone());
                Ok(response)
            })
            .await
    }

    async fn suggestions(&self, text: &str) -> Result<Vec<String>, FetchError> {
        let backend = &self.backend;
        self.context
            .suggestions()
            .fetch(text, || async move {
                debug!("Fetching suggestions for {:?}", text);
                backend.suggestions(text).await
            })
            .await
    }
}

pub struct SearchSession<B> {
    fetcher: Fetcher<B>,
    context: SearchContext,

    query_debounce: Debouncer<String>,
    suggestion_debounce: Debouncer<String>,

    /// Latest text as typed
    raw_text: String,
    /// Filters apply immediately, without debounce
    filters: SearchFilters,
    /// Text that survived the debounce
    debounced_text: String,
    /// Filters or debounced text changed since the last evaluation
    needs_evaluation: bool,

    /// Key and parameters of the search currently shown
    active: Option<(CacheKey, SearchParams)>,
    /// Search keys requested by this session and not yet applied
    awaiting: HashSet<CacheKey>,
    response: Option<SearchResponse>,
    error: Option<FetchError>,

    /// Text the remote suggestions belong to
    suggestion_text: String,
    awaiting_suggestions: HashSet<String>,
    remote_suggestions: Vec<String>,
}

impl<B: SearchBackend> SearchSession<B> {
    pub fn new(backend: Arc<B>, context: SearchContext) -> Self {
        let wait = context.settings().debounce();
        Self {
            fetcher: Fetcher::new(backend, context.clone()),
            context,
            query_debounce: Debouncer::new(wait),
            suggestion_debounce: Debouncer::new(wait),
            raw_text: String::new(),
            filters: SearchFilters::default(),
            debounced_text: String::new(),
            needs_evaluation: false,
            active: None,
            awaiting: HashSet::new(),
            response: None,
            error: None,
            suggestion_text: String::new(),
            awaiting_suggestions: HashSet::new(),
            remote_suggestions: Vec::new(),
        }
    }

    /// Record the caller's current input.
    ///
    /// Changed text re-arms both debouncers; clearing the text returns to the
    /// no-search state at once. Changed filters are re-evaluated on the next
    /// [`poll`](Self::poll) without waiting.
    pub fn set_input(&mut self, text: impl Into<String>, filters: SearchFilters) {
        let text = text.into();
        if text != self.raw_text {
            if text.trim().is_empty() {
                self.query_debounce.cancel();
                self.suggestion_debounce.cancel();
                self.debounced_text.clear();
                self.suggestion_text.clear();
                self.remote_suggestions.clear();
                self.needs_evaluation = true;
            } else {
                let now = self.now();
                self.query_debounce.call(text.clone(), now);
                self.suggestion_debounce.call(text.clone(), now);
            }
            self.raw_text = text;
        }

        if filters != self.filters {
            self.filters = filters;
            self.needs_evaluation = true;
        }
    }

    /// Advance debounce timers and return the fetches now needed.
    pub fn poll(&mut self) -> Vec<FetchRequest> {
        let now = self.now();
        let mut requests = Vec::new();

        if let Some(text) = self.query_debounce.poll(now) {
            if text != self.debounced_text {
                self.debounced_text = text;
                self.needs_evaluation = true;
            }
        }

        if let Some(text) = self.suggestion_debounce.poll(now) {
            requests.extend(self.update_suggestion_text(&text));
        }

        if self.needs_evaluation {
            self.needs_evaluation = false;
            requests.extend(self.evaluate());
        }

        requests
    }

    /// Apply a finished fetch. Returns false when the outcome was stale and
    /// has been dropped.
    pub fn apply(&mut self, outcome: FetchOutcome) -> bool {
        match outcome {
            FetchOutcome::Search { key, result } => {
                self.awaiting.remove(&key);
                if self.active_key() != Some(&key) {
                    debug!("Discarding stale search response for {}", key);
                    return false;
                }
                match result {
                    Ok(response) => {
                        self.response = Some(response);
                        self.error = None;
                    }
                    Err(e) => {
                        warn!("Search failed for {:?}: {}", self.debounced_text, e);
                        self.response = None;
                        self.error = Some(e);
                    }
                }
                true
            }
            FetchOutcome::Suggestions { text, result } => {
                self.awaiting_suggestions.remove(&text);
                if text != self.suggestion_text {
                    debug!("Discarding stale suggestions for {:?}", text);
                    return false;
                }
                match result {
                    Ok(suggestions) => self.remote_suggestions = suggestions,
                    Err(e) => {
                        warn!("Suggestions failed for {:?}: {}", text, e);
                        self.remote_suggestions.clear();
                    }
                }
                true
            }
        }
    }

    /// Run every pending request inline and apply the outcomes.
    ///
    /// Returns the number of requests run. Convenient for callers without an
    /// event loop; [`crate::driver`] runs requests concurrently instead.
    pub async fn step(&mut self) -> usize {
        let requests = self.poll();
        let count = requests.len();
        for request in requests {
            let outcome = self.fetcher.run(request).await;
            self.apply(outcome);
        }
        count
    }

    /// Re-run the network fetch for the current query, bypassing both cache
    /// layers. The fresh response replaces the cached one.
    pub fn refetch(&mut self) -> Option<FetchRequest> {
        let (key, params) = self.active.clone()?;
        if self.awaiting.contains(&key) {
            return None;
        }
        self.error = None;
        self.awaiting.insert(key.clone());
        Some(FetchRequest::Search {
            key,
            params,
            force: true,
        })
    }

    /// Return to the no-search state, ignoring anything in flight.
    pub fn reset(&mut self) {
        self.query_debounce.cancel();
        self.suggestion_debounce.cancel();
        self.raw_text.clear();
        self.filters = SearchFilters::default();
        self.debounced_text.clear();
        self.needs_evaluation = false;
        self.active = None;
        self.response = None;
        self.error = None;
        self.suggestion_text.clear();
        self.remote_suggestions.clear();
    }

    /// Empty the shared result cache.
    pub fn clear_cache(&self) {
        self.context.cache().clear();
        debug!("Search cache cleared");
    }

    /// Record a confirmed query. Returns false if it was too short to keep.
    pub fn add_to_history(&self, query: &str) -> bool {
        self.context.history().add(query)
    }

    pub fn history(&self) -> Vec<String> {
        self.context.history().to_vec()
    }

    pub fn results(&self) -> &[SearchResult] {
        self.response
            .as_ref()
            .map(|r| r.results.as_slice())
            .unwrap_or(&[])
    }

    pub fn response(&self) -> Option<&SearchResponse> {
        self.response.as_ref()
    }

    pub fn error(&self) -> Option<&FetchError> {
        self.error.as_ref()
    }

    /// True only while a network fetch for the current query is outstanding
    /// and no cached value is available.
    pub fn is_loading(&self) -> bool {
        match self.active_key() {
            Some(key) => self.response.is_none() && self.awaiting.contains(key),
            None => false,
        }
    }

    pub fn is_loading_suggestions(&self) -> bool {
        self.is_searchable(&self.suggestion_text)
            && self.awaiting_suggestions.contains(&self.suggestion_text)
    }

    /// Remote suggestions followed by matching history, deduplicated and capped.
    pub fn suggestions(&self) -> Vec<String> {
        let text = self.debounced_text.trim();
        if !self.is_searchable(text) {
            return Vec::new();
        }

        let settings = self.context.settings();
        let history = self.context.history();
        let matches = history.matching(text, settings.history_suggestion_limit);
        merge_suggestions(
            self.remote_suggestions.iter().map(String::as_str),
            matches,
            settings.suggestion_limit,
        )
    }

    /// Debounced query text.
    pub fn query(&self) -> &str {
        &self.debounced_text
    }

    pub fn filters(&self) -> &SearchFilters {
        &self.filters
    }

    pub fn active_key(&self) -> Option<&CacheKey> {
        self.active.as_ref().map(|(key, _)| key)
    }

    /// Earliest instant at which [`poll`](Self::poll) may have work.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (
            self.query_debounce.deadline(),
            self.suggestion_debounce.deadline(),
        ) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// No debounce pending, nothing to evaluate, nothing relevant in flight.
    pub fn is_settled(&self) -> bool {
        !self.query_debounce.is_pending()
            && !self.suggestion_debounce.is_pending()
            && !self.needs_evaluation
            && self.active_key().map_or(true, |key| !self.awaiting.contains(key))
            && !self.is_loading_suggestions()
    }

    pub fn snapshot(&self) -> SearchSnapshot {
        let (results, total, by_type) = match &self.response {
            Some(response) => (
                response.results.clone(),
                response.total,
                response.by_type.clone(),
            ),
            None => Default::default(),
        };

        SearchSnapshot {
            query: self.debounced_text.trim().to_string(),
            results,
            total,
            by_type,
            suggestions: self.suggestions(),
            is_loading: self.is_loading(),
            is_loading_suggestions: self.is_loading_suggestions(),
            error: self.error.as_ref().map(ToString::to_string),
            settled: self.is_settled(),
            revision: 0,
        }
    }

    pub fn fetcher(&self) -> Fetcher<B> {
        self.fetcher.clone()
    }

    pub fn context(&self) -> &SearchContext {
        &self.context
    }

    fn now(&self) -> Instant {
        self.context.clock().now()
    }

    fn is_searchable(&self, text: &str) -> bool {
        text.trim().chars().count() >= self.context.settings().min_query_len
    }

    /// Recompute the active search from debounced text and filters.
    fn evaluate(&mut self) -> Option<FetchRequest> {
        let text = self.debounced_text.trim().to_string();
        if !self.is_searchable(&text) {
            self.active = None;
            self.response = None;
            self.error = None;
            return None;
        }

        let key = CacheKey::new(&text, &self.filters);
        if self.active_key() == Some(&key)
            && (self.response.is_some() || self.error.is_some() || self.awaiting.contains(&key))
        {
            return None;
        }

        let params = SearchParams::new(text, normalize_filters(&self.filters));
        self.active = Some((key.clone(), params.clone()));
        self.error = None;

        let cached = self.context.cache().get(&key);
        if let Some(response) = cached {
            debug!("Cache hit for {}", key);
            self.response = Some(response);
            return None;
        }

        self.response = None;
        if self.awaiting.contains(&key) {
            debug!("Already waiting on {}", key);
            return None;
        }

        debug!("Cache miss for {}", key);
        self.awaiting.insert(key.clone());
        Some(FetchRequest::Search {
            key,
            params,
            force: false,
        })
    }

    fn update_suggestion_text(&mut self, text: &str) -> Option<FetchRequest> {
        let text = text.trim();
        if text == self.suggestion_text {
            return None;
        }

        self.suggestion_text = text.to_string();
        self.remote_suggestions.clear();

        if !self.is_searchable(text) || self.awaiting_suggestions.contains(text) {
            return None;
        }

        self.awaiting_suggestions.insert(text.to_string());
        Some(FetchRequest::Suggestions {
            text: text.to_string(),
        })
    }
}
