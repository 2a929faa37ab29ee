//! Query execution layer
//!
//! Sits between sessions and the backend. Concurrent fetches for the same key
//! share one in-flight request; a settled result is reused while it is
//! younger than `stale_time`. Failed results are never reused, so the next
//! fetch for that key goes back to the network. Idle entries are dropped by
//! [`QueryClient::collect_garbage`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::OnceCell;
use tracing::debug;

use crate::clock::{SharedClock, SystemClock};
use crate::error::FetchError;

type Slot<T> = Arc<OnceCell<Result<T, FetchError>>>;

struct QueryEntry<T> {
    slot: Slot<T>,
    settled_at: Option<Instant>,
    last_used: Instant,
}

impl<T> QueryEntry<T> {
    /// Unsettled and still awaited. Every waiter holds a clone of the slot,
    /// so a count of one means only the map is left.
    fn is_in_flight(&self) -> bool {
        !self.slot.initialized() && Arc::strong_count(&self.slot) > 1
    }
}

pub struct QueryClient<T> {
    stale_time: Duration,
    gc_time: Duration,
    entries: Mutex<HashMap<String, QueryEntry<T>>>,
    clock: SharedClock,
}

impl<T> QueryClient<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(stale_time: Duration, gc_time: Duration) -> Self {
        Self::with_clock(stale_time, gc_time, Arc::new(SystemClock))
    }

    pub fn with_clock(stale_time: Duration, gc_time: Duration, clock: SharedClock) -> Self {
        Self {
            stale_time,
            gc_time,
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Resolve `key`, running `fetcher` only when no fresh or in-flight result exists.
    ///
    /// Every caller that arrives while a fetch for `key` is outstanding waits
    /// on that same fetch and receives a clone of its result.
    pub async fn fetch<F, Fut>(&self, key: &str, fetcher: F) -> Result<T, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let slot = self.slot_for(key);
        let result = slot.get_or_init(fetcher).await.clone();

        let now = self.clock.now();
        let mut entries = self.lock();
        if let Some(entry) = entries.get_mut(key) {
            if Arc::ptr_eq(&entry.slot, &slot) && entry.settled_at.is_none() {
                entry.settled_at = Some(now);
            }
        }

        result
    }

    /// Drop the entry for `key` so the next fetch hits the network.
    ///
    /// Callers already waiting on an in-flight fetch still receive its result.
    pub fn invalidate(&self, key: &str) {
        self.lock().remove(key);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// True while a fetch for `key` is outstanding.
    pub fn is_fetching(&self, key: &str) -> bool {
        self.lock()
            .get(key)
            .map(QueryEntry::is_in_flight)
            .unwrap_or(false)
    }

    /// Remove settled entries nobody has asked for within `gc_time`, and
    /// unsettled entries whose every caller has gone away.
    ///
    /// Returns the number of entries removed. Entries still awaited are kept.
    pub fn collect_garbage(&self) -> usize {
        let now = self.clock.now();
        let gc_time = self.gc_time;
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|key, entry| {
            if entry.slot.initialized() {
                now.duration_since(entry.last_used) < gc_time
            } else if entry.is_in_flight() {
                true
            } else {
                debug!("Dropping abandoned query: {}", key);
                false
            }
        });
        before - entries.len()
    }

    /// Number of keys tracked (fresh, stale or in flight).
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn stale_time(&self) -> Duration {
        self.stale_time
    }

    /// Pick the slot a fetch for `key` should await, replacing failed or
    /// stale results with a fresh, uninitialized slot.
    fn slot_for(&self, key: &str) -> Slot<T> {
        let now = self.clock.now();
        let stale_time = self.stale_time;
        let mut entries = self.lock();

        if let Some(entry) = entries.get_mut(key) {
            entry.last_used = now;
            let reusable = match entry.slot.get() {
                None if entry.is_in_flight() => {
                    debug!("Joining in-flight query: {}", key);
                    true
                }
                None => false,
                Some(Ok(_)) => entry
                    .settled_at
                    .map(|at| now.duration_since(at) < stale_time)
                    .unwrap_or(true),
                Some(Err(_)) => false,
            };
            if reusable {
                return Arc::clone(&entry.slot);
            }
        }

        let slot: Slot<T> = Arc::new(OnceCell::new());
        entries.insert(
            key.to_string(),
            QueryEntry {
                slot: Arc::clone(&slot),
                settled_at: None,
                last_used: now,
            },
        );
        slot
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, QueryEntry<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
