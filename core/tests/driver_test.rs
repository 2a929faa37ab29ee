//! Session event loop under tokio's paused clock

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::MockBackend;
use medsearch_core::config::SearchSettings;
use medsearch_core::{
    spawn_session, CacheKey, SearchContext, SearchFilters, SearchSession, SessionCommand, TokioClock,
};

const SETTLE: Duration = Duration::from_secs(5);

fn tokio_context() -> SearchContext {
    SearchContext::with_clock(SearchSettings::default(), Arc::new(TokioClock))
}

fn spawn(
    backend: &Arc<MockBackend>,
    context: &SearchContext,
) -> (medsearch_core::SessionHandle, tokio::task::JoinHandle<()>) {
    spawn_session(SearchSession::new(Arc::clone(backend), context.clone()))
}

#[tokio::test(start_paused = true)]
async fn test_typing_burst_settles_on_last_query() {
    let backend = Arc::new(MockBackend::with_latency(Duration::from_millis(50)));
    let context = tokio_context();
    let (mut handle, _task) = spawn(&backend, &context);

    handle.input("t", SearchFilters::default()).unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;
    handle.input("te", SearchFilters::default()).unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;
    handle.input("test", SearchFilters::default()).unwrap();

    let snapshot = handle.settled(SETTLE).await.unwrap();
    assert!(snapshot.settled);
    assert_eq!(snapshot.query, "test");
    assert_eq!(snapshot.results.len(), 1);
    assert_eq!(snapshot.total, 1);
    assert!(!snapshot.is_loading);
    assert_eq!(backend.searched(), vec!["test".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_reflects_sent_commands() {
    let backend = Arc::new(MockBackend::new());
    let context = tokio_context();
    let (mut handle, _task) = spawn(&backend, &context);

    handle.input("martin", SearchFilters::default()).unwrap();
    let snapshot = handle.snapshot().await.unwrap();

    // Accepted but still waiting out the debounce
    assert!(snapshot.revision >= 1);
    assert!(!snapshot.settled);
    assert_eq!(snapshot.query, "");
    assert_eq!(backend.search_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_late_response_for_previous_query_is_dropped() {
    let backend = Arc::new(MockBackend::with_latency(Duration::from_millis(500)));
    let context = tokio_context();
    let (mut handle, _task) = spawn(&backend, &context);

    handle.input("alpha", SearchFilters::default()).unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    handle.input("beta", SearchFilters::default()).unwrap();

    let snapshot = handle.settled(SETTLE).await.unwrap();
    assert_eq!(snapshot.query, "beta");
    assert_eq!(snapshot.results[0].title, "Patient beta");
    assert_eq!(backend.searched(), vec!["alpha".to_string(), "beta".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_refetch_and_clear_cache_commands() {
    let backend = Arc::new(MockBackend::new());
    let context = tokio_context();
    let (mut handle, _task) = spawn(&backend, &context);

    handle.input("martin", SearchFilters::default()).unwrap();
    handle.settled(SETTLE).await.unwrap();
    assert_eq!(backend.search_count(), 1);

    handle.send(SessionCommand::Refetch).unwrap();
    let snapshot = handle.settled(SETTLE).await.unwrap();
    assert_eq!(backend.search_count(), 2);
    assert_eq!(snapshot.results.len(), 1);

    handle.send(SessionCommand::ClearCache).unwrap();
    handle.snapshot().await.unwrap();
    assert!(context.cache().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_history_and_reset_commands() {
    let backend = Arc::new(MockBackend::new());
    let context = tokio_context();
    let (mut handle, _task) = spawn(&backend, &context);

    handle.input("martin", SearchFilters::default()).unwrap();
    handle.settled(SETTLE).await.unwrap();
    handle
        .send(SessionCommand::AddToHistory("martin".to_string()))
        .unwrap();
    handle.send(SessionCommand::Reset).unwrap();

    let snapshot = handle.settled(SETTLE).await.unwrap();
    assert_eq!(snapshot.query, "");
    assert!(snapshot.results.is_empty());
    assert!(snapshot.suggestions.is_empty());
    assert_eq!(context.history().to_vec(), vec!["martin".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_settle_timeout_returns_loading_state() {
    let backend = Arc::new(MockBackend::with_latency(Duration::from_secs(30)));
    let context = tokio_context();
    let (mut handle, _task) = spawn(&backend, &context);

    handle.input("martin", SearchFilters::default()).unwrap();
    let snapshot = handle.settled(Duration::from_secs(1)).await.unwrap();

    assert!(!snapshot.settled);
    assert!(snapshot.is_loading);
    assert!(snapshot.results.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handle_stops_session() {
    let backend = Arc::new(MockBackend::with_latency(Duration::from_secs(30)));
    let context = tokio_context();
    let (mut handle, task) = spawn(&backend, &context);

    handle.input("martin", SearchFilters::default()).unwrap();
    drop(handle);

    assert!(task.await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_crashed_fetch_surfaces_error_and_recovers() {
    let backend = Arc::new(MockBackend::new());
    backend.panic_next(1);
    let context = tokio_context();
    let (mut handle, _task) = spawn(&backend, &context);

    handle.input("martin", SearchFilters::default()).unwrap();
    let snapshot = handle.settled(SETTLE).await.unwrap();
    assert!(snapshot.settled);
    assert!(!snapshot.is_loading);
    assert!(snapshot.error.is_some());
    assert!(snapshot.results.is_empty());

    // Moving away and back fetches the key again
    handle.input("ma", SearchFilters::default()).unwrap();
    handle.settled(SETTLE).await.unwrap();
    handle.input("martin", SearchFilters::default()).unwrap();
    let snapshot = handle.settled(SETTLE).await.unwrap();

    assert!(snapshot.settled);
    assert!(snapshot.error.is_none());
    assert_eq!(snapshot.results.len(), 1);
    assert_eq!(
        backend.searched(),
        vec!["martin".to_string(), "ma".to_string(), "martin".to_string()]
    );
    assert!(!context.searches().is_fetching(
        CacheKey::new("martin", &SearchFilters::default()).as_str()
    ));
}

#[tokio::test(start_paused = true)]
async fn test_crashed_fetch_can_be_refetched() {
    let backend = Arc::new(MockBackend::new());
    backend.panic_next(1);
    let context = tokio_context();
    let (mut handle, _task) = spawn(&backend, &context);

    handle.input("martin", SearchFilters::default()).unwrap();
    let snapshot = handle.settled(SETTLE).await.unwrap();
    assert!(snapshot.error.is_some());

    handle.send(SessionCommand::Refetch).unwrap();
    let snapshot = handle.settled(SETTLE).await.unwrap();
    assert!(snapshot.error.is_none());
    assert_eq!(snapshot.results.len(), 1);
    assert_eq!(backend.search_count(), 2);
}
