//! Search session behaviour driven by a manual clock

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{manual_context, response_for, session, MockBackend};
use medsearch_core::{
    CacheKey, FetchError, FetchOutcome, FetchRequest, ResultType, SearchFilters,
};

const DEBOUNCE: Duration = Duration::from_millis(300);

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[tokio::test]
async fn test_short_queries_never_fetch() {
    let backend = Arc::new(MockBackend::new());
    let (context, clock) = manual_context();
    let mut search = session(&backend, &context);

    for text in ["", "t", " t ", ""] {
        search.set_input(text, SearchFilters::default());
        clock.advance(DEBOUNCE);
        assert_eq!(search.step().await, 0);
        assert!(search.results().is_empty());
        assert!(!search.is_loading());
        assert!(search.error().is_none());
    }

    assert_eq!(backend.search_count(), 0);
    assert_eq!(backend.suggestion_count(), 0);
}

#[tokio::test]
async fn test_typing_burst_fetches_once_and_second_session_hits_cache() {
    let backend = Arc::new(MockBackend::new());
    let (context, clock) = manual_context();
    let mut first = session(&backend, &context);

    first.set_input("t", SearchFilters::default());
    clock.advance(ms(40));
    first.step().await;
    first.set_input("te", SearchFilters::default());
    clock.advance(ms(40));
    first.step().await;
    first.set_input("test", SearchFilters::default());

    clock.advance(DEBOUNCE - ms(1));
    first.step().await;
    assert_eq!(backend.search_count(), 0);

    clock.advance(ms(1));
    first.step().await;
    assert_eq!(backend.search_count(), 1);
    assert_eq!(backend.searched(), vec!["test".to_string()]);
    assert_eq!(first.results().len(), 1);

    // A second session over the same context is served from the cache
    let mut second = session(&backend, &context);
    second.set_input("test", SearchFilters::default());
    clock.advance(DEBOUNCE);
    second.step().await;

    assert_eq!(second.results(), first.results());
    assert!(!second.is_loading());
    assert_eq!(backend.search_count(), 1);
}

#[tokio::test]
async fn test_loading_only_while_network_outstanding() {
    let backend = Arc::new(MockBackend::new());
    let (context, clock) = manual_context();
    let mut search = session(&backend, &context);

    search.set_input("martin", SearchFilters::default());
    assert!(!search.is_loading());

    clock.advance(DEBOUNCE);
    let requests = search.poll();
    let request = requests
        .into_iter()
        .find(|r| matches!(r, FetchRequest::Search { .. }))
        .expect("search request");
    assert!(search.is_loading());
    assert!(!search.is_settled());

    let outcome = search.fetcher().run(request).await;
    assert!(search.apply(outcome));
    assert!(!search.is_loading());
    assert_eq!(search.results().len(), 1);
}

#[tokio::test]
async fn test_stale_response_is_discarded() {
    let backend = Arc::new(MockBackend::new());
    let (context, clock) = manual_context();
    let mut search = session(&backend, &context);
    let filters = SearchFilters::default();

    search.set_input("alpha", filters.clone());
    clock.advance(DEBOUNCE);
    search.poll();
    let alpha = CacheKey::new("alpha", &filters);
    assert_eq!(search.active_key(), Some(&alpha));

    search.set_input("beta", filters.clone());
    clock.advance(DEBOUNCE);
    search.poll();
    let beta = CacheKey::new("beta", &filters);

    // beta answers first, then the late alpha response arrives
    assert!(search.apply(FetchOutcome::Search {
        key: beta.clone(),
        result: Ok(response_for("beta")),
    }));
    assert!(!search.apply(FetchOutcome::Search {
        key: alpha,
        result: Ok(response_for("alpha")),
    }));

    assert_eq!(search.active_key(), Some(&beta));
    assert_eq!(search.results()[0].title, "Patient beta");
}

#[tokio::test]
async fn test_late_response_after_reset_is_ignored() {
    let backend = Arc::new(MockBackend::new());
    let (context, clock) = manual_context();
    let mut search = session(&backend, &context);

    search.set_input("alpha", SearchFilters::default());
    clock.advance(DEBOUNCE);
    search.poll();
    search.reset();

    assert!(!search.apply(FetchOutcome::Search {
        key: CacheKey::new("alpha", &SearchFilters::default()),
        result: Ok(response_for("alpha")),
    }));
    assert!(search.results().is_empty());
    assert!(!search.is_loading());
}

#[tokio::test]
async fn test_clearing_text_resets_immediately() {
    let backend = Arc::new(MockBackend::new());
    let (context, clock) = manual_context();
    let mut search = session(&backend, &context);

    search.set_input("martin", SearchFilters::default());
    clock.advance(DEBOUNCE);
    search.step().await;
    assert_eq!(search.results().len(), 1);

    // No debounce wait for an emptied box
    search.set_input("", SearchFilters::default());
    assert_eq!(search.step().await, 0);
    assert!(search.results().is_empty());
    assert_eq!(search.query(), "");
    assert!(search.is_settled());
}

#[tokio::test]
async fn test_filter_change_applies_without_debounce() {
    let backend = Arc::new(MockBackend::new());
    let (context, clock) = manual_context();
    let mut search = session(&backend, &context);

    search.set_input("martin", SearchFilters::default());
    clock.advance(DEBOUNCE);
    search.step().await;
    assert_eq!(backend.search_count(), 1);

    let filters = SearchFilters {
        types: vec![ResultType::Appointment, ResultType::Patient],
        ..Default::default()
    };
    search.set_input("martin", filters);
    assert_eq!(search.step().await, 1);
    assert_eq!(backend.search_count(), 2);

    // Same filters in another order hit the cache
    let reordered = SearchFilters {
        types: vec![ResultType::Patient, ResultType::Appointment],
        ..Default::default()
    };
    search.set_input("martin", reordered);
    assert_eq!(search.step().await, 0);
    assert_eq!(backend.search_count(), 2);
}

#[tokio::test]
async fn test_fetch_error_is_surfaced_without_retry() {
    let backend = Arc::new(MockBackend::new());
    backend.fail_with(Some(FetchError::Status {
        status: 503,
        message: "unavailable".to_string(),
    }));
    let (context, clock) = manual_context();
    let mut search = session(&backend, &context);

    search.set_input("martin", SearchFilters::default());
    clock.advance(DEBOUNCE);
    search.step().await;

    assert!(matches!(
        search.error(),
        Some(FetchError::Status { status: 503, .. })
    ));
    assert!(search.results().is_empty());
    assert!(!search.is_loading());
    let snapshot = search.snapshot();
    assert!(snapshot.error.is_some());

    // Nothing retries on its own
    clock.advance(DEBOUNCE);
    assert_eq!(search.step().await, 0);
    assert_eq!(backend.search_count(), 1);

    // An explicit refetch does
    backend.fail_with(None);
    let request = search.refetch().expect("refetch request");
    let outcome = search.fetcher().run(request).await;
    search.apply(outcome);
    assert!(search.error().is_none());
    assert_eq!(search.results().len(), 1);
    assert_eq!(backend.search_count(), 2);
}

#[tokio::test]
async fn test_empty_result_is_not_an_error() {
    let backend = Arc::new(MockBackend::new());
    let (context, clock) = manual_context();
    let mut search = session(&backend, &context);

    search.set_input("zz", SearchFilters::default());
    clock.advance(DEBOUNCE);
    let request = search
        .poll()
        .into_iter()
        .find(|r| matches!(r, FetchRequest::Search { .. }))
        .expect("search request");
    let key = match request {
        FetchRequest::Search { key, .. } => key,
        FetchRequest::Suggestions { .. } => unreachable!(),
    };
    search.apply(FetchOutcome::Search {
        key,
        result: Ok(Default::default()),
    });

    let snapshot = search.snapshot();
    assert_eq!(snapshot.total, 0);
    assert!(snapshot.error.is_none());
}

#[tokio::test]
async fn test_suggestions_merge_remote_and_history() {
    let backend = Arc::new(
        MockBackend::new().with_suggestions("test", &["Marie Martin", "Patient test"]),
    );
    let (context, clock) = manual_context();
    let mut search = session(&backend, &context);

    assert!(search.add_to_history("test123"));
    assert!(search.add_to_history("unrelated"));

    search.set_input("test", SearchFilters::default());
    clock.advance(DEBOUNCE);
    search.step().await;

    assert_eq!(
        search.suggestions(),
        vec!["Marie Martin", "Patient test", "test123"]
    );
    assert!(!search.is_loading_suggestions());
    assert_eq!(backend.suggestion_count(), 1);
}

#[tokio::test]
async fn test_suggestions_capped_and_deduplicated() {
    let backend = Arc::new(MockBackend::new().with_suggestions(
        "mar",
        &["Marie Martin", "Marc Dupont", "Marie Martin", "Martine Roy"],
    ));
    let (context, clock) = manual_context();
    let mut search = session(&backend, &context);

    for query in ["marc dupont", "Marseille", "Marie Martin", "omar"] {
        search.add_to_history(query);
    }

    search.set_input("mar", SearchFilters::default());
    clock.advance(DEBOUNCE);
    search.step().await;

    // History order is most recent first: omar, Marie Martin, Marseille
    assert_eq!(
        search.suggestions(),
        vec!["Marie Martin", "Marc Dupont", "Martine Roy", "omar", "Marseille"]
    );
}

#[tokio::test]
async fn test_clear_cache_keeps_query_layer() {
    let backend = Arc::new(MockBackend::new());
    let (context, clock) = manual_context();
    let mut search = session(&backend, &context);

    search.set_input("martin", SearchFilters::default());
    clock.advance(DEBOUNCE);
    search.step().await;
    search.clear_cache();
    assert!(context.cache().is_empty());

    // A new session misses the result cache but the query layer is still fresh
    let mut other = session(&backend, &context);
    other.set_input("martin", SearchFilters::default());
    clock.advance(DEBOUNCE);
    other.step().await;
    assert_eq!(other.results().len(), 1);
    assert_eq!(backend.search_count(), 1);

    // Forcing goes to the network and repopulates the cache
    let request = other.refetch().expect("refetch request");
    let outcome = other.fetcher().run(request).await;
    other.apply(outcome);
    assert_eq!(backend.search_count(), 2);
    assert_eq!(context.cache().len(), 1);
}

#[tokio::test]
async fn test_expired_cache_goes_back_to_network() {
    let backend = Arc::new(MockBackend::new());
    let (context, clock) = manual_context();
    let mut search = session(&backend, &context);

    search.set_input("martin", SearchFilters::default());
    clock.advance(DEBOUNCE);
    search.step().await;

    clock.advance(Duration::from_secs(5 * 60));

    let mut later = session(&backend, &context);
    later.set_input("martin", SearchFilters::default());
    clock.advance(DEBOUNCE);
    later.step().await;

    assert_eq!(backend.search_count(), 2);
    assert_eq!(later.results().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_sessions_share_in_flight_request() {
    let backend = Arc::new(MockBackend::with_latency(ms(200)));
    let (context, clock) = manual_context();
    let mut first = session(&backend, &context);
    let mut second = session(&backend, &context);

    first.set_input("martin", SearchFilters::default());
    second.set_input("martin", SearchFilters::default());
    clock.advance(DEBOUNCE);

    // Both miss the result cache before either response lands
    let (a, b) = tokio::join!(first.step(), second.step());
    assert_eq!(a, 2);
    assert_eq!(b, 2);

    assert_eq!(backend.search_count(), 1);
    assert_eq!(backend.suggestion_count(), 1);
    assert_eq!(first.results(), second.results());
}

#[tokio::test]
async fn test_history_through_session() {
    let backend = Arc::new(MockBackend::new());
    let (context, _clock) = manual_context();
    let search = session(&backend, &context);

    for i in 0..11 {
        search.add_to_history(&format!("query {i}"));
    }
    search.add_to_history("query 5");

    let history = search.history();
    assert_eq!(history.len(), 10);
    assert_eq!(history[0], "query 5");
    assert_eq!(history.iter().filter(|q| *q == "query 5").count(), 1);
    assert!(!history.contains(&"query 0".to_string()));
}
