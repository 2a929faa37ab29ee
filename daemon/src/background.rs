//! Background maintenance for the daemon
//!
//! Drops query-client entries nobody has asked for within the gc window.
//! The result cache is not swept; expired entries go on their next read.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{debug, info};

use crate::DaemonState;

/// Floor for the sweep interval
const MIN_GC_INTERVAL: Duration = Duration::from_secs(10);

pub async fn garbage_collection_task(state: Arc<DaemonState>) {
    let period = gc_interval(state.context.settings().query_gc_time());
    let mut ticker = interval(period);

    info!("Query garbage collection started (interval: {:?})", period);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = state.shutdown_requested() => break,
        }
        if state.should_shutdown() {
            break;
        }

        let removed = state.context.collect_garbage();
        if removed > 0 {
            debug!("Collected {} idle query entries", removed);
        }
    }

    info!("Query garbage collection stopped");
}

/// Sweep at half the gc window so entries never outlive it by much.
fn gc_interval(gc_time: Duration) -> Duration {
    (gc_time / 2).max(MIN_GC_INTERVAL)
}
