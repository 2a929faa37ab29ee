//! Shared test helpers: a scripted backend that counts calls

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use medsearch_core::config::SearchSettings;
use medsearch_core::{
    FetchError, ManualClock, ResultType, SearchBackend, SearchContext, SearchParams,
    SearchResponse, SearchResult, SearchSession,
};

#[derive(Default)]
pub struct MockBackend {
    pub search_calls: AtomicUsize,
    pub suggestion_calls: AtomicUsize,
    pub searched: Mutex<Vec<String>>,
    pub suggestions: Mutex<HashMap<String, Vec<String>>>,
    pub failing: Mutex<Option<FetchError>>,
    /// Searches left that panic instead of answering
    pub panics: AtomicUsize,
    /// Simulated network latency
    pub latency: Option<Duration>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Default::default()
        }
    }

    pub fn with_suggestions(self, text: &str, suggestions: &[&str]) -> Self {
        self.suggestions.lock().unwrap().insert(
            text.to_string(),
            suggestions.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    pub fn fail_with(&self, error: Option<FetchError>) {
        *self.failing.lock().unwrap() = error;
    }

    pub fn panic_next(&self, searches: usize) {
        self.panics.store(searches, Ordering::SeqCst);
    }

    pub fn search_count(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn suggestion_count(&self) -> usize {
        self.suggestion_calls.load(Ordering::SeqCst)
    }

    pub fn searched(&self) -> Vec<String> {
        self.searched.lock().unwrap().clone()
    }
}

pub fn response_for(query: &str) -> SearchResponse {
    let mut response = SearchResponse {
        results: vec![SearchResult {
            id: format!("p-{query}"),
            result_type: ResultType::Patient,
            title: format!("Patient {query}"),
            subtitle: None,
            description: None,
            url: None,
            score: Some(1.0),
            date: None,
            metadata: Default::default(),
        }],
        total: 1,
        ..Default::default()
    };
    response.by_type.insert(ResultType::Patient, 1);
    response
}

impl SearchBackend for MockBackend {
    async fn search(&self, params: &SearchParams) -> Result<SearchResponse, FetchError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.searched.lock().unwrap().push(params.query.clone());
        if self
            .panics
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            panic!("backend crashed searching {:?}", params.query);
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let failing = self.failing.lock().unwrap().clone();
        match failing {
            Some(error) => Err(error),
            None => Ok(response_for(&params.query)),
        }
    }

    async fn suggestions(&self, text: &str) -> Result<Vec<String>, FetchError> {
        self.suggestion_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let suggestions = self.suggestions.lock().unwrap().get(text).cloned();
        Ok(suggestions.unwrap_or_default())
    }
}

/// Context over a manual clock with default settings.
pub fn manual_context() -> (SearchContext, ManualClock) {
    let clock = ManualClock::new();
    let context = SearchContext::with_clock(SearchSettings::default(), Arc::new(clock.clone()));
    (context, clock)
}

pub fn session(backend: &Arc<MockBackend>, context: &SearchContext) -> SearchSession<MockBackend> {
    SearchSession::new(Arc::clone(backend), context.clone())
}
