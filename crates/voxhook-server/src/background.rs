//! Background tasks for the voxhook server.
//!
//! Includes:
//! - Age-based purging of every application's function caches.

use crate::ServerContext;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use voxhook_cache::panic_message;

/// Starts the cache purge task.
///
/// This task runs indefinitely: every `interval` it evicts cache entries
/// older than `max_age` from every application. A failed sweep is logged
/// and the next one runs on schedule.
pub async fn start_purge_task(context: Arc<ServerContext>, interval: Duration, max_age: Duration) {
    if interval.is_zero() {
        tracing::warn!("cache purge task disabled (interval=0)");
        return;
    }

    tracing::info!(
        interval_seconds = interval.as_secs(),
        max_age_seconds = max_age.as_secs(),
        "starting cache purge task"
    );

    run_purge_loop(interval, || purge_all(&context, max_age)).await;
}

/// Calls `sweep` every `interval`, forever. A panicking sweep is logged and
/// the loop carries on.
pub async fn run_purge_loop<F>(interval: Duration, sweep: F)
where
    F: Fn() -> usize,
{
    loop {
        sleep(interval).await;

        match catch_unwind(AssertUnwindSafe(&sweep)) {
            Ok(0) => {
                tracing::debug!(count = 0, "purged expired cache entries");
            }
            Ok(count) => {
                tracing::info!(count, "purged expired cache entries");
            }
            Err(payload) => {
                tracing::error!("cache purge sweep panicked: {}", panic_message(&*payload));
            }
        }
    }
}

/// Runs one sweep over every cache of every application. Returns the number
/// of entries evicted.
pub fn purge_all(context: &ServerContext, max_age: Duration) -> usize {
    let mut total = 0;
    for app in &context.applications {
        for cache in app.caches() {
            let count = cache.purge(max_age);
            if count > 0 {
                tracing::debug!(
                    path = app.server_path(),
                    kind = %cache.kind(),
                    count,
                    "purged cache"
                );
            }
            total += count;
        }
    }
    context.metrics.observe_purge(total);
    total
}
